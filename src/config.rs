//! Batch configuration
//!
//! A [`BatchConfig`] is built once at startup and handed to the scheduler by
//! reference; nothing in the core reads process-wide state. Construction goes
//! through [`BatchConfigBuilder`], which validates and clamps values.
//!
//! An optional YAML [`ConfigFile`] can be overlaid on the builder. Values the
//! caller set explicitly win, the file fills the rest, and pattern lists are
//! concatenated.
//!
//! ```rust
//! use dvpl::config::BatchConfigBuilder;
//! use dvpl::types::{Mode, PayloadType};
//!
//! let config = BatchConfigBuilder::new(Mode::Pack, "./assets")
//!     .payload_type(PayloadType::Lz4)
//!     .ignore_patterns(vec!["*.exe".to_string()])
//!     .workers(4)
//!     .keep_original(true)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.output(), config.input());
//! assert!(config.workers() >= 1);
//! ```

use crate::codec::{CodecOptions, FallbackPolicy};
use crate::error::{DvplError, FsOp, Result};
use crate::filter::SelfExclusions;
use crate::types::{CompressionChoice, Mode, PayloadType, CONFIG_FILE_NAME, LEGACY_CONFIG_FILE_NAME};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validated parameters for one batch invocation
#[derive(Debug, Clone)]
pub struct BatchConfig {
    input: PathBuf,
    output: PathBuf,
    mode: Mode,
    compression: CompressionChoice,
    ignore_patterns: Vec<String>,
    filter_patterns: Vec<String>,
    no_compress_patterns: Vec<String>,
    workers: usize,
    keep_original: bool,
    skip_integrity_check: bool,
    codec: CodecOptions,
    self_exclusions: SelfExclusions,
}

impl BatchConfig {
    /// File or directory to process
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Destination file or directory root
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Pack or unpack
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Requested compression before per-file overrides
    pub fn compression(&self) -> CompressionChoice {
        self.compression
    }

    /// Glob patterns excluding files
    pub fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }

    /// Glob patterns a file must match, when non-empty
    pub fn filter_patterns(&self) -> &[String] {
        &self.filter_patterns
    }

    /// Glob patterns whose files are stored uncompressed
    pub fn no_compress_patterns(&self) -> &[String] {
        &self.no_compress_patterns
    }

    /// Executor count, already clamped
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Task queue capacity, twice the worker count
    pub fn queue_capacity(&self) -> usize {
        self.workers * 2
    }

    /// Leave sources in place
    pub fn keep_original(&self) -> bool {
        self.keep_original
    }

    /// Decode even on CRC mismatch
    pub fn skip_integrity_check(&self) -> bool {
        self.skip_integrity_check
    }

    /// Codec tunables
    pub fn codec_options(&self) -> CodecOptions {
        self.codec
    }

    /// Names never packed
    pub fn self_exclusions(&self) -> &SelfExclusions {
        &self.self_exclusions
    }

    /// Copy of this config with a different mode and input, output following input
    ///
    /// Used by drag-and-drop dispatch, which decides the mode per path.
    pub fn for_input(&self, mode: Mode, input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        Self {
            output: input.clone(),
            input,
            mode,
            ..self.clone()
        }
    }
}

/// Clamp a requested worker count to `[1, available parallelism]`
pub fn clamp_workers(requested: usize) -> usize {
    requested.clamp(1, num_cpus::get().max(1))
}

/// Builder for [`BatchConfig`]
#[derive(Debug, Clone)]
pub struct BatchConfigBuilder {
    input: PathBuf,
    output: Option<PathBuf>,
    mode: Mode,
    payload_type: Option<PayloadType>,
    forced: bool,
    ignore_patterns: Vec<String>,
    filter_patterns: Vec<String>,
    no_compress_patterns: Vec<String>,
    workers: Option<usize>,
    keep_original: bool,
    skip_integrity_check: bool,
    codec: CodecOptions,
    self_exclusions: Option<SelfExclusions>,
}

impl BatchConfigBuilder {
    /// Start a builder for `mode` over `input`
    pub fn new(mode: Mode, input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            mode,
            payload_type: None,
            forced: false,
            ignore_patterns: Vec::new(),
            filter_patterns: Vec::new(),
            no_compress_patterns: Vec::new(),
            workers: None,
            keep_original: false,
            skip_integrity_check: false,
            codec: CodecOptions::default(),
            self_exclusions: None,
        }
    }

    /// Destination; defaults to the input path
    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Requested payload type; defaults to LZ4HC
    pub fn payload_type(mut self, payload_type: PayloadType) -> Self {
        self.payload_type = Some(payload_type);
        self
    }

    /// Keep compressed output even when it grew
    pub fn forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    /// Patterns excluding files
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Patterns a file must match
    pub fn filter_patterns(mut self, patterns: Vec<String>) -> Self {
        self.filter_patterns = patterns;
        self
    }

    /// Patterns stored without compression
    pub fn no_compress_patterns(mut self, patterns: Vec<String>) -> Self {
        self.no_compress_patterns = patterns;
        self
    }

    /// Executor count; defaults to the number of CPUs
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Leave sources in place after success
    pub fn keep_original(mut self, keep: bool) -> Self {
        self.keep_original = keep;
        self
    }

    /// Decode even on CRC mismatch
    pub fn skip_integrity_check(mut self, skip: bool) -> Self {
        self.skip_integrity_check = skip;
        self
    }

    /// Boundary for discarding compressed output
    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.codec.fallback = policy;
        self
    }

    /// LZ4HC level (1..=12)
    pub fn hc_level(mut self, level: i32) -> Self {
        self.codec.hc_level = level;
        self
    }

    /// Names never packed; defaults to the current executable and config file
    pub fn self_exclusions(mut self, exclusions: SelfExclusions) -> Self {
        self.self_exclusions = Some(exclusions);
        self
    }

    /// Fill unset values from a config file
    pub fn overlay(mut self, file: &ConfigFile) -> Self {
        if self.output.is_none() {
            self.output = file.output.clone();
        }
        if self.payload_type.is_none() {
            self.payload_type = file.compress_type;
        }
        if self.workers.is_none() {
            self.workers = file.workers;
        }
        self.forced |= file.force;
        self.keep_original |= file.keep_original;
        self.skip_integrity_check |= file.skip_crc;
        self.ignore_patterns.extend(file.ignore.iter().cloned());
        self.filter_patterns.extend(file.filter.iter().cloned());
        self.no_compress_patterns.extend(file.no_compress.iter().cloned());
        self
    }

    /// Validate and produce the config
    ///
    /// # Errors
    ///
    /// [`DvplError::InvalidConfiguration`] for an empty input path, a
    /// non-writable payload type, or an HC level outside 1..=12.
    pub fn build(self) -> Result<BatchConfig> {
        if self.input.as_os_str().is_empty() {
            return Err(DvplError::invalid_config("input path is empty"));
        }

        let algorithm = self.payload_type.unwrap_or_default();
        if !algorithm.is_writable() {
            return Err(DvplError::invalid_config(format!(
                "payload type {} ({}) cannot be written",
                algorithm.as_u32(),
                algorithm
            )));
        }
        if !(1..=12).contains(&self.codec.hc_level) {
            return Err(DvplError::invalid_config(format!(
                "LZ4HC level {} is outside 1..=12",
                self.codec.hc_level
            )));
        }

        let requested = self.workers.unwrap_or_else(num_cpus::get);
        let workers = clamp_workers(requested);
        if workers != requested {
            debug!("Clamped workers from {} to {}", requested, workers);
        }

        Ok(BatchConfig {
            output: self.output.unwrap_or_else(|| self.input.clone()),
            input: self.input,
            mode: self.mode,
            compression: CompressionChoice {
                algorithm,
                forced: self.forced,
            },
            ignore_patterns: self.ignore_patterns,
            filter_patterns: self.filter_patterns,
            no_compress_patterns: self.no_compress_patterns,
            workers,
            keep_original: self.keep_original,
            skip_integrity_check: self.skip_integrity_check,
            codec: self.codec,
            self_exclusions: self
                .self_exclusions
                .unwrap_or_else(SelfExclusions::from_current_exe),
        })
    }
}

/// YAML overlay file
///
/// ```yaml
/// compress: true
/// input: ./Data
/// compressType: 1
/// ignore: ["*.exe", "*.dll"]
/// noCompress: ["*.webp"]
/// workers: 8
/// keepOriginal: true
/// ```
///
/// Files written for the older `.dvpl_go.yml` layout are read too:
/// `compressFlag`, `decompressFlag`, `inputPath`, `outputPath` and
/// `ignorePatterns` are accepted as aliases, and an integer `compress`
/// selects the payload type (`0` there means "not set").
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawConfigFile")]
pub struct ConfigFile {
    /// Select pack mode
    pub compress: bool,
    /// Select unpack mode
    pub decompress: bool,
    /// Input path
    pub input: Option<PathBuf>,
    /// Output path
    pub output: Option<PathBuf>,
    /// Leave sources in place
    pub keep_original: bool,
    /// Payload type
    pub compress_type: Option<PayloadType>,
    /// Ignore patterns
    pub ignore: Vec<String>,
    /// Filter patterns
    pub filter: Vec<String>,
    /// No-compress patterns
    pub no_compress: Vec<String>,
    /// Worker count
    pub workers: Option<usize>,
    /// Keep compressed output even when it grew
    pub force: bool,
    /// Skip CRC verification when unpacking
    pub skip_crc: bool,
}

/// `compress` is a mode flag in current files and a payload type in old ones
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CompressKey {
    Flag(bool),
    Type(u32),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawConfigFile {
    compress: Option<CompressKey>,
    compress_flag: bool,
    #[serde(alias = "decompressFlag")]
    decompress: bool,
    #[serde(alias = "inputPath")]
    input: Option<PathBuf>,
    #[serde(alias = "outputPath")]
    output: Option<PathBuf>,
    keep_original: bool,
    compress_type: Option<u32>,
    #[serde(alias = "ignorePatterns")]
    ignore: Vec<String>,
    filter: Vec<String>,
    no_compress: Vec<String>,
    workers: Option<usize>,
    force: bool,
    skip_crc: bool,
}

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DvplError;

    fn try_from(raw: RawConfigFile) -> Result<Self> {
        let (flag, legacy_type) = match raw.compress {
            Some(CompressKey::Flag(flag)) => (flag, None),
            Some(CompressKey::Type(0)) | None => (false, None),
            Some(CompressKey::Type(n)) => (false, Some(n)),
        };
        let compress_type = raw
            .compress_type
            .or(legacy_type)
            .map(PayloadType::try_from)
            .transpose()?;

        Ok(ConfigFile {
            compress: flag || raw.compress_flag,
            decompress: raw.decompress,
            input: raw.input,
            output: raw.output,
            keep_original: raw.keep_original,
            compress_type,
            ignore: raw.ignore,
            filter: raw.filter,
            no_compress: raw.no_compress,
            workers: raw.workers,
            force: raw.force,
            skip_crc: raw.skip_crc,
        })
    }
}

impl ConfigFile {
    /// Parse YAML text
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DvplError::fs(FsOp::Read, path, e))?;
        Self::parse(&text)
    }

    /// Config file next to the executable, if present
    ///
    /// [`CONFIG_FILE_NAME`] is preferred over [`LEGACY_CONFIG_FILE_NAME`].
    pub fn discover() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        let dir = exe.parent()?;
        [CONFIG_FILE_NAME, LEGACY_CONFIG_FILE_NAME]
            .into_iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Mode selected by the file, if exactly one was chosen
    pub fn mode(&self) -> Option<Mode> {
        match (self.compress, self.decompress) {
            (true, false) => Some(Mode::Pack),
            (false, true) => Some(Mode::Unpack),
            _ => None,
        }
    }
}
