//! Main test module for dvpl
//!
//! This module includes all test suites:
//! - Integration tests for whole batch runs
//! - Property-based tests for codec invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::dvpl::filter::SelfExclusions;
    use ::dvpl::*;
    use std::fs;
    use tempfile::TempDir;

    fn pack_config(input: &std::path::Path) -> BatchConfigBuilder {
        BatchConfigBuilder::new(Mode::Pack, input).self_exclusions(SelfExclusions::default())
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let config = pack_config(temp_dir.path()).build().unwrap();
        let result = BatchScheduler::new(config).run().unwrap();

        assert_eq!(result.succeeded, 0);
        assert_eq!(result.skipped, 0);
        assert!(result.is_success());
        assert_eq!(result.peak_in_flight, 0);
    }

    #[test]
    fn test_empty_file_packs_as_none() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("empty.txt"), b"").unwrap();

        let config = pack_config(temp_dir.path()).build().unwrap();
        let result = BatchScheduler::new(config).run().unwrap();
        assert_eq!(result.count_for(PayloadType::None), 1);

        let container = fs::read(temp_dir.path().join("empty.txt.dvpl")).unwrap();
        assert_eq!(container.len(), codec::FOOTER_SIZE);
        let footer = codec::inspect(&container).unwrap();
        assert_eq!(footer.uncompressed_size, 0);
        assert_eq!(footer.stored_size, 0);
        assert_eq!(footer.payload_type, 0);
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file(with)parens.txt",
            "file[with]brackets.txt",
            "файл.txt",
            "文件.txt",
            "🚀🌟💾.txt",
        ];

        let mut written = Vec::new();
        for name in &special_names {
            let path = temp_dir.path().join(name);
            if fs::write(&path, format!("Content of {}", name).repeat(20)).is_ok() {
                written.push(*name);
            }
        }

        let config = pack_config(temp_dir.path()).build().unwrap();
        let result = BatchScheduler::new(config).run().unwrap();
        assert_eq!(result.succeeded, written.len());

        let config = BatchConfigBuilder::new(Mode::Unpack, temp_dir.path())
            .build()
            .unwrap();
        let result = BatchScheduler::new(config).run().unwrap();
        assert_eq!(result.succeeded, written.len());

        for name in written {
            let content = fs::read_to_string(temp_dir.path().join(name)).unwrap();
            assert_eq!(content, format!("Content of {}", name).repeat(20));
        }
    }

    #[test]
    fn test_reserved_config_file_is_never_packed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "compress: true\n").unwrap();
        fs::write(temp_dir.path().join(LEGACY_CONFIG_FILE_NAME), "compressFlag: true\n").unwrap();
        fs::write(temp_dir.path().join("data.bin"), vec![7u8; 256]).unwrap();

        let config = pack_config(temp_dir.path()).build().unwrap();
        let result = BatchScheduler::new(config).run().unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.skipped, 2);
        assert!(temp_dir.path().join(LEGACY_CONFIG_FILE_NAME).exists());
        assert!(temp_dir.path().join(CONFIG_FILE_NAME).exists());
        assert!(!temp_dir
            .path()
            .join(format!("{}{}", CONFIG_FILE_NAME, DVPL_SUFFIX))
            .exists());
    }

    #[test]
    fn test_single_file_into_output_directory() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("tank.xml");
        fs::write(&source, "<tank/>".repeat(100)).unwrap();

        let config = pack_config(&source)
            .output(out_dir.path())
            .keep_original(true)
            .build()
            .unwrap();
        let result = BatchScheduler::new(config).run().unwrap();

        assert_eq!(result.succeeded, 1);
        assert!(source.exists());
        assert!(out_dir.path().join("tank.xml.dvpl").exists());
    }

    #[test]
    fn test_single_packed_file_is_skipped_when_packing() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("already.txt.dvpl");
        fs::write(&source, b"whatever").unwrap();

        let config = pack_config(&source).build().unwrap();
        let result = BatchScheduler::new(config).run().unwrap();

        assert_eq!(result.succeeded, 0);
        assert_eq!(result.skipped, 1);
        assert_eq!(fs::read(&source).unwrap(), b"whatever");
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let config = pack_config(&temp_dir.path().join("nope")).build().unwrap();
        let err = BatchScheduler::new(config).run().unwrap_err();
        assert!(matches!(err, DvplError::Fs { .. }));
    }
}
