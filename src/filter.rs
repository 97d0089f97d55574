//! Per-file admission rules for a batch
//!
//! The filter engine decides, from a file name alone, whether a walked file
//! becomes a task and which compression it gets. It does no I/O.
//!
//! ## Rules
//!
//! Evaluated in order, first match decides:
//!
//! 1. Packing: the running executable and the reserved config file are excluded
//! 2. Packing: names already ending in `.dvpl` are excluded
//! 3. Unpacking: names not ending in `.dvpl` are excluded
//! 4. Names matching an ignore pattern are excluded
//! 5. With filter patterns present, names matching none of them are excluded
//!
//! When unpacking, rules 4 and 5 see the name with the suffix stripped, so
//! `*.txt` selects `notes.txt.dvpl`.
//!
//! Patterns use shell glob syntax (`*`, `?`, `[...]`). A pattern that fails to
//! compile is logged, recorded in [`FilterEngine::warnings`], and never matches.
//! A filter list made only of such patterns still counts as present, so it
//! excludes every file.

use crate::error::DvplError;
use crate::types::{
    CompressionChoice, Mode, PayloadType, SkipReason, CONFIG_FILE_NAME, DVPL_SUFFIX,
    LEGACY_CONFIG_FILE_NAME,
};
use crate::utils::strip_dvpl_suffix;
use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

/// A compiled list of glob patterns
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    matchers: Vec<GlobMatcher>,
    /// `(pattern, reason)` for every pattern that failed to compile
    invalid: Vec<(String, String)>,
}

impl PatternList {
    /// Compile `patterns`, keeping the valid ones
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = PatternList::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => list.matchers.push(glob.compile_matcher()),
                Err(e) => {
                    warn!("Invalid pattern '{}': {}", pattern, e);
                    list.invalid.push((pattern.to_string(), e.kind().to_string()));
                }
            }
        }
        list
    }

    /// True if no pattern was supplied, valid or not
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty() && self.invalid.is_empty()
    }

    /// True if any pattern matches `name`
    pub fn matches(&self, name: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(name))
    }

    /// Patterns that failed to compile
    pub fn invalid(&self) -> impl Iterator<Item = DvplError> + '_ {
        self.invalid
            .iter()
            .map(|(pattern, reason)| DvplError::InvalidPattern {
                pattern: pattern.clone(),
                reason: reason.clone(),
            })
    }
}

/// Names never packed: the running executable and the reserved config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfExclusions {
    names: Vec<String>,
}

impl SelfExclusions {
    /// Exclude exactly `names`
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// The current executable's file name plus both config file names
    pub fn from_current_exe() -> Self {
        let mut names = Self::default().names;
        if let Some(exe) = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        {
            names.push(exe);
        }
        Self { names }
    }

    /// True if `name` is excluded
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

impl Default for SelfExclusions {
    fn default() -> Self {
        Self::new(vec![
            CONFIG_FILE_NAME.to_string(),
            LEGACY_CONFIG_FILE_NAME.to_string(),
        ])
    }
}

/// Outcome of running the rules on one name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Becomes a task
    Accept,
    /// Dropped, with the rule that dropped it
    Skip(SkipReason),
}

impl FilterDecision {
    /// True for [`FilterDecision::Accept`]
    pub fn is_accept(self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// Admission and compression rules for one batch
#[derive(Debug, Clone)]
pub struct FilterEngine {
    mode: Mode,
    ignore: PatternList,
    filter: PatternList,
    no_compress: PatternList,
    self_exclusions: SelfExclusions,
}

impl FilterEngine {
    /// Build an engine, compiling all pattern lists
    pub fn new<S: AsRef<str>>(
        mode: Mode,
        ignore: &[S],
        filter: &[S],
        no_compress: &[S],
        self_exclusions: SelfExclusions,
    ) -> Self {
        Self {
            mode,
            ignore: PatternList::new(ignore),
            filter: PatternList::new(filter),
            no_compress: PatternList::new(no_compress),
            self_exclusions,
        }
    }

    /// Direction the rules are evaluated for
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Run the admission rules on a file name
    pub fn decide(&self, name: &str) -> FilterDecision {
        let has_suffix = name.ends_with(DVPL_SUFFIX);
        let subject = match self.mode {
            Mode::Pack => {
                if self.self_exclusions.contains(name) {
                    return FilterDecision::Skip(SkipReason::SelfExcluded);
                }
                if has_suffix {
                    return FilterDecision::Skip(SkipReason::AlreadyPacked);
                }
                name
            }
            Mode::Unpack => {
                if !has_suffix {
                    return FilterDecision::Skip(SkipReason::NotPacked);
                }
                strip_dvpl_suffix(name)
            }
        };

        if self.ignore.matches(subject) {
            return FilterDecision::Skip(SkipReason::Ignored);
        }
        if !self.filter.is_empty() && !self.filter.matches(subject) {
            return FilterDecision::Skip(SkipReason::Filtered);
        }
        FilterDecision::Accept
    }

    /// Suffix rules only, for a file the user named explicitly
    pub fn decide_explicit(&self, name: &str) -> FilterDecision {
        let has_suffix = name.ends_with(DVPL_SUFFIX);
        match self.mode {
            Mode::Pack if has_suffix => FilterDecision::Skip(SkipReason::AlreadyPacked),
            Mode::Unpack if !has_suffix => FilterDecision::Skip(SkipReason::NotPacked),
            _ => FilterDecision::Accept,
        }
    }

    /// Whether `name` takes part in the batch
    pub fn should_process(&self, name: &str) -> bool {
        self.decide(name).is_accept()
    }

    /// `requested`, or no compression if `name` matches a no-compress pattern
    pub fn effective_compression(&self, name: &str, requested: CompressionChoice) -> CompressionChoice {
        if self.no_compress.matches(name) {
            CompressionChoice {
                algorithm: PayloadType::None,
                ..requested
            }
        } else {
            requested
        }
    }

    /// Every pattern that failed to compile, across all lists
    pub fn warnings(&self) -> impl Iterator<Item = DvplError> + '_ {
        self.ignore
            .invalid()
            .chain(self.filter.invalid())
            .chain(self.no_compress.invalid())
    }
}
