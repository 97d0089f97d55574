//! Integration tests for dvpl
//!
//! Whole-batch scenarios run against real temporary directory trees.

use ::dvpl::filter::SelfExclusions;
use ::dvpl::*;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Test helper to build a tree and drive batches over it
struct TestTree {
    dir: TempDir,
}

impl TestTree {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    fn read(&self, relative: &str) -> Vec<u8> {
        fs::read(self.root().join(relative)).unwrap()
    }

    fn builder(&self, mode: Mode) -> BatchConfigBuilder {
        BatchConfigBuilder::new(mode, self.root()).self_exclusions(SelfExclusions::default())
    }

    fn run(&self, builder: BatchConfigBuilder) -> BatchResult {
        BatchScheduler::new(builder.build().unwrap()).run().unwrap()
    }
}

fn compressible(n: usize) -> Vec<u8> {
    b"the quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(n)
        .collect()
}

#[test]
fn test_filter_composition() {
    let tree = TestTree::new();
    tree.write("a.txt", compressible(500));
    tree.write("b.exe", compressible(500));
    let packed = codec::pack(&compressible(500), CompressionChoice::default()).unwrap();
    tree.write("c.txt.dvpl", &packed.bytes);

    let result = tree.run(
        tree.builder(Mode::Pack)
            .ignore_patterns(vec!["*.exe".to_string()])
            .keep_original(true),
    );
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.skipped, 2);
    assert!(tree.exists("a.txt.dvpl"));
    assert!(!tree.exists("b.exe.dvpl"));
    assert!(!tree.exists("c.txt.dvpl.dvpl"));

    fs::remove_file(tree.root().join("a.txt.dvpl")).unwrap();

    let result = tree.run(tree.builder(Mode::Unpack).keep_original(true));
    assert_eq!(result.succeeded, 1);
    assert_eq!(tree.read("c.txt"), compressible(500));
}

#[test]
fn test_unpack_ignore_matches_stripped_name() {
    let tree = TestTree::new();
    tree.write("keep.txt", compressible(300));
    tree.write("skip.log", compressible(300));
    tree.run(tree.builder(Mode::Pack));

    let result = tree.run(
        tree.builder(Mode::Unpack)
            .ignore_patterns(vec!["*.log".to_string()]),
    );
    assert_eq!(result.succeeded, 1);
    assert!(tree.exists("keep.txt"));
    assert!(tree.exists("skip.log.dvpl"));
    assert!(!tree.exists("skip.log"));
}

#[test]
fn test_filter_patterns_restrict_batch() {
    let tree = TestTree::new();
    tree.write("maps/a.xml", compressible(200));
    tree.write("maps/b.png", compressible(200));
    tree.write("c.xml", compressible(200));

    let result = tree.run(
        tree.builder(Mode::Pack)
            .filter_patterns(vec!["*.xml".to_string()]),
    );
    assert_eq!(result.succeeded, 2);
    assert!(tree.exists("maps/a.xml.dvpl"));
    assert!(tree.exists("c.xml.dvpl"));
    assert!(tree.exists("maps/b.png"));
}

#[test]
fn test_no_compress_stores_raw() {
    let tree = TestTree::new();
    tree.write("img.webp", compressible(4096));
    tree.write("text.txt", compressible(4096));

    let result = tree.run(
        tree.builder(Mode::Pack)
            .no_compress_patterns(vec!["*.webp".to_string()]),
    );
    assert_eq!(result.count_for(PayloadType::None), 1);
    assert_eq!(result.count_for(PayloadType::Lz4Hc), 1);

    let footer = codec::inspect(&tree.read("img.webp.dvpl")).unwrap();
    assert_eq!(footer.payload_type, PayloadType::None.as_u32());
    assert_eq!(footer.stored_size, 4096);

    let footer = codec::inspect(&tree.read("text.txt.dvpl")).unwrap();
    assert_eq!(footer.payload_type, PayloadType::Lz4Hc.as_u32());
    assert!(footer.stored_size < 4096);
}

#[test]
fn test_corrupt_file_does_not_stop_batch() {
    let tree = TestTree::new();
    for i in 0..10 {
        tree.write(&format!("good{}.txt", i), compressible(1000 + i));
    }
    tree.run(tree.builder(Mode::Pack));

    // Flip one payload byte so the CRC no longer matches
    let mut bad = tree.read("good3.txt.dvpl");
    bad[0] ^= 0xFF;
    tree.write("good3.txt.dvpl", &bad);
    tree.write("short.dvpl", b"tiny");

    let result = tree.run(tree.builder(Mode::Unpack));
    assert_eq!(result.succeeded, 9);
    assert_eq!(result.failed(), 2);

    let corrupt: Vec<_> = result
        .failures
        .iter()
        .filter(|f| f.error.is_corruption())
        .collect();
    assert_eq!(corrupt.len(), 2);

    // Failed sources stay, no partial outputs
    assert!(tree.exists("good3.txt.dvpl"));
    assert!(!tree.exists("good3.txt"));
    assert!(tree.exists("short.dvpl"));
    assert_eq!(tree.read("good4.txt"), compressible(1004));
}

#[test]
fn test_skip_crc_decodes_mismatched_container() {
    let tree = TestTree::new();
    let payload = compressible(300);
    let mut container = codec::pack(&payload, CompressionChoice::none()).unwrap().bytes;
    // Corrupt the stored CRC only
    let crc_at = container.len() - 12;
    container[crc_at] ^= 0x01;
    tree.write("x.bin.dvpl", &container);

    let result = tree.run(tree.builder(Mode::Unpack).keep_original(true));
    assert_eq!(result.failed(), 1);
    assert!(matches!(
        result.failures[0].error,
        DvplError::ChecksumMismatch { .. }
    ));

    let result = tree.run(tree.builder(Mode::Unpack).skip_integrity_check(true));
    assert!(result.is_success());
    assert_eq!(tree.read("x.bin"), payload);
}

#[test]
fn test_separate_output_mirrors_tree() {
    let tree = TestTree::new();
    let out = TempDir::new().unwrap();
    tree.write("a/b/c.txt", compressible(700));
    tree.write("d.txt", compressible(50));

    let result = tree.run(
        tree.builder(Mode::Pack)
            .output(out.path())
            .keep_original(true),
    );
    assert_eq!(result.succeeded, 2);
    assert!(out.path().join("a/b/c.txt.dvpl").exists());
    assert!(out.path().join("d.txt.dvpl").exists());
    assert!(tree.exists("a/b/c.txt"));
    assert!(!tree.exists("a/b/c.txt.dvpl"));

    let restored = TempDir::new().unwrap();
    let unpack = BatchConfigBuilder::new(Mode::Unpack, out.path())
        .output(restored.path())
        .keep_original(true)
        .build()
        .unwrap();
    let result = BatchScheduler::new(unpack).run().unwrap();
    assert_eq!(result.succeeded, 2);
    assert_eq!(
        fs::read(restored.path().join("a/b/c.txt")).unwrap(),
        compressible(700)
    );
}

#[test]
fn test_keep_original_leaves_sources() {
    let tree = TestTree::new();
    tree.write("one.txt", compressible(100));

    let result = tree.run(tree.builder(Mode::Pack).keep_original(true));
    assert_eq!(result.succeeded, 1);
    assert!(tree.exists("one.txt"));
    assert!(tree.exists("one.txt.dvpl"));
}

#[test]
fn test_concurrency_bounds() {
    let tree = TestTree::new();
    for i in 0..64 {
        tree.write(&format!("dir{}/file{}.txt", i % 4, i), compressible(2000 + i * 7));
    }

    let config = tree.builder(Mode::Pack).workers(2).build().unwrap();
    let workers = config.workers();
    let capacity = config.queue_capacity();
    let result = BatchScheduler::new(config).run().unwrap();

    assert_eq!(result.succeeded, 64);
    assert!(result.peak_in_flight >= 1);
    assert!(result.peak_in_flight <= workers);
    assert!(result.peak_queued <= capacity);
    assert_eq!(capacity, workers * 2);
}

#[test]
fn test_events_match_result() {
    let tree = TestTree::new();
    for i in 0..20 {
        tree.write(&format!("f{}.txt", i), compressible(100 + i));
    }
    tree.write("skip.exe", compressible(100));

    let seen = Arc::new(Mutex::new((0usize, 0usize)));
    let sink = Arc::clone(&seen);
    let config = tree
        .builder(Mode::Pack)
        .ignore_patterns(vec!["*.exe".to_string()])
        .build()
        .unwrap();
    let result = BatchScheduler::new(config)
        .run_with_progress(move |event| {
            let mut seen = sink.lock().unwrap();
            match event {
                BatchEvent::Completed(_) => seen.0 += 1,
                BatchEvent::Skipped { .. } => seen.1 += 1,
                BatchEvent::Failed(_) => panic!("unexpected failure"),
            }
        })
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.0, result.succeeded);
    assert_eq!(seen.1, result.skipped);
    assert_eq!(result.succeeded, 20);
    assert_eq!(result.skipped, 1);
}

#[test]
fn test_invalid_pattern_is_warning_only() {
    let tree = TestTree::new();
    tree.write("a.txt", compressible(100));

    let config = tree
        .builder(Mode::Pack)
        .ignore_patterns(vec!["[unclosed".to_string()])
        .build()
        .unwrap();
    let scheduler = BatchScheduler::new(config);
    assert_eq!(scheduler.pattern_warnings().count(), 1);

    let result = scheduler.run().unwrap();
    assert_eq!(result.succeeded, 1);
}

#[test]
fn test_invalid_filter_pattern_excludes_everything() {
    let tree = TestTree::new();
    tree.write("a.txt", compressible(100));
    tree.write("b.bin", compressible(100));
    tree.write("c.xml", compressible(100));

    let config = tree
        .builder(Mode::Pack)
        .filter_patterns(vec!["[bad".to_string()])
        .build()
        .unwrap();
    let scheduler = BatchScheduler::new(config);
    assert_eq!(scheduler.pattern_warnings().count(), 1);

    let result = scheduler.run().unwrap();
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.skipped, 3);
    for name in ["a.txt", "b.bin", "c.xml"] {
        assert!(tree.exists(name));
        assert!(!tree.exists(&format!("{}.dvpl", name)));
    }
}

#[test]
fn test_filesystem_failure_does_not_stop_batch() {
    let tree = TestTree::new();
    let out = TempDir::new().unwrap();
    tree.write("ok1.txt", compressible(400));
    tree.write("ok2.txt", compressible(400));
    tree.write("blocked/inner.txt", compressible(400));
    // A regular file where the destination directory should go
    fs::write(out.path().join("blocked"), b"in the way").unwrap();

    let result = tree.run(tree.builder(Mode::Pack).output(out.path()));

    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed(), 1);
    let failure = &result.failures[0];
    assert_eq!(failure.path, tree.root().join("blocked/inner.txt"));
    assert!(matches!(
        failure.error,
        DvplError::Fs {
            op: error::FsOp::CreateDir,
            ..
        }
    ));

    assert_eq!(tree.read("blocked/inner.txt"), compressible(400));
    assert!(out.path().join("ok1.txt.dvpl").exists());
    assert!(out.path().join("ok2.txt.dvpl").exists());
    assert!(!tree.exists("ok1.txt"));
}

#[test]
fn test_cancelled_batch_does_nothing() {
    let tree = TestTree::new();
    for i in 0..8 {
        tree.write(&format!("f{}.txt", i), compressible(100));
    }

    let scheduler = BatchScheduler::new(tree.builder(Mode::Pack).build().unwrap());
    scheduler.cancel_handle().cancel();
    let result = scheduler.run().unwrap();

    assert!(result.cancelled);
    assert_eq!(result.succeeded, 0);
    assert!(tree.exists("f0.txt"));
}

#[test]
fn test_drag_and_drop_detects_mode() {
    let tree = TestTree::new();
    tree.write("raw/a.txt", compressible(300));
    tree.write("raw/b.txt", compressible(300));

    let template = tree.builder(Mode::Pack).build().unwrap();

    let scheduler = BatchScheduler::for_path(&template, tree.root().join("raw")).unwrap();
    assert_eq!(scheduler.config().mode(), Mode::Pack);
    assert_eq!(scheduler.run().unwrap().succeeded, 2);

    let scheduler = BatchScheduler::for_path(&template, tree.root().join("raw")).unwrap();
    assert_eq!(scheduler.config().mode(), Mode::Unpack);
    assert_eq!(scheduler.run().unwrap().succeeded, 2);
    assert_eq!(tree.read("raw/a.txt"), compressible(300));
}

#[test]
fn test_config_file_overlay() {
    let tree = TestTree::new();
    tree.write("a.txt", compressible(300));
    tree.write("b.exe", compressible(300));

    let file = ConfigFile::parse(
        "compress: true\nignore: [\"*.exe\"]\nkeepOriginal: true\ncompressType: 2\n",
    )
    .unwrap();
    assert_eq!(file.mode(), Some(Mode::Pack));

    let result = tree.run(tree.builder(Mode::Pack).overlay(&file));
    assert_eq!(result.count_for(PayloadType::Lz4), 1);
    assert!(tree.exists("a.txt"));
    assert!(!tree.exists("b.exe.dvpl"));
}

#[cfg(test)]
mod tracing_tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_batch_logs_summary() {
        let tree = TestTree::new();
        tree.write("a.txt", compressible(100));
        tree.run(tree.builder(Mode::Pack));
        assert!(logs_contain("Finished pack"));
    }
}
