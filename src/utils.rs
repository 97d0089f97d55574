//! Utility functions for dvpl
//!
//! Path helpers shared by the filter engine and the scheduler, plus byte
//! formatting for summaries.
//!
//! ### Suffix handling
//! - Appending `.dvpl` to a destination when packing
//! - Stripping exactly one `.dvpl` when unpacking
//!
//! ### Destination mapping
//! - `output_root + relative_path (+ suffix)` for walked files
//! - Directory-aware mapping for a single explicit file
//!
//! All functions are thread-safe and free of global state.

use crate::error::{DvplError, Result};
use crate::types::{Mode, DVPL_SUFFIX};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Strip one trailing `.dvpl` from a file name, if present
///
/// ```rust
/// use dvpl::utils::strip_dvpl_suffix;
///
/// assert_eq!(strip_dvpl_suffix("a.txt.dvpl"), "a.txt");
/// assert_eq!(strip_dvpl_suffix("a.dvpl.dvpl"), "a.dvpl");
/// assert_eq!(strip_dvpl_suffix("a.txt"), "a.txt");
/// ```
pub fn strip_dvpl_suffix(name: &str) -> &str {
    name.strip_suffix(DVPL_SUFFIX).unwrap_or(name)
}

/// `path` with `.dvpl` appended to its final component
pub fn with_dvpl_suffix(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(DVPL_SUFFIX);
    PathBuf::from(raw)
}

/// `path` with one trailing `.dvpl` removed from its final component
///
/// Paths whose name does not end in the suffix are returned unchanged.
pub fn without_dvpl_suffix(path: &Path) -> PathBuf {
    match path.file_name().map(|n| n.to_string_lossy()) {
        Some(name) if name.ends_with(DVPL_SUFFIX) && name.len() > DVPL_SUFFIX.len() => {
            path.with_file_name(strip_dvpl_suffix(&name))
        }
        _ => path.to_path_buf(),
    }
}

/// Whether a path's final component carries the container suffix
pub fn has_dvpl_suffix(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(DVPL_SUFFIX))
        .unwrap_or(false)
}

/// Map a walked file to its destination under `output_root`
pub fn destination_for(output_root: &Path, relative: &Path, mode: Mode) -> PathBuf {
    let joined = output_root.join(relative);
    match mode {
        Mode::Pack => with_dvpl_suffix(&joined),
        Mode::Unpack => without_dvpl_suffix(&joined),
    }
}

/// Map an explicitly named file to its destination
///
/// If `output` is an existing directory the file keeps its name inside it,
/// otherwise `output` names the destination file. The suffix is then
/// appended (pack) or stripped once (unpack).
pub fn single_file_destination(source: &Path, output: &Path, mode: Mode) -> PathBuf {
    let base = if output.is_dir() {
        match source.file_name() {
            Some(name) => output.join(name),
            None => output.to_path_buf(),
        }
    } else {
        output.to_path_buf()
    };
    match mode {
        Mode::Pack => with_dvpl_suffix(&base),
        Mode::Unpack => without_dvpl_suffix(&base),
    }
}

/// Make a path relative to a base directory
///
/// Tries a lexical strip first so symlinked paths are preserved, falling back
/// to canonical forms when the lexical strip fails.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            DvplError::invalid_config(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Format bytes in human-readable form
///
/// Uses 1024 as the conversion factor.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
