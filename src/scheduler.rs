//! Concurrent batch processing
//!
//! The scheduler turns an input path into pack or unpack tasks and runs them
//! on a fixed pool of worker threads.
//!
//! ## Pipeline
//!
//! ```text
//!   walker (caller thread)
//!      │  FileTask             bounded(2 × workers)
//!      ▼
//!   ┌──────────┐  ┌──────────┐       ┌──────────┐
//!   │ worker 1 │  │ worker 2 │  ...  │ worker N │   read → pack/unpack → write → remove
//!   └────┬─────┘  └────┬─────┘       └────┬─────┘
//!        └─────────────┴───── Report ─────┘       bounded(2 × workers)
//!                      ▼
//!                  collector  →  BatchEvent callback, BatchResult
//! ```
//!
//! The walker blocks when the task queue is full, so at most
//! `workers + 2 × workers` files are held in memory at once. Each task owns
//! its buffers; a failing task is reported and never affects another.
//!
//! The collector is the only place events are delivered from, so callers can
//! print progress lines without interleaving.
//!
//! ## Cancellation
//!
//! [`CancelHandle::cancel`] stops the walk before the next file. Tasks
//! already queued are drained and reported as cancelled skips, while tasks
//! mid-execution finish, so no destination is left half written.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use dvpl::config::BatchConfigBuilder;
//! use dvpl::scheduler::BatchScheduler;
//! use dvpl::types::{BatchEvent, Mode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatchConfigBuilder::new(Mode::Pack, "./Data").workers(4).build()?;
//! let scheduler = BatchScheduler::new(config);
//!
//! let result = scheduler.run_with_progress(|event| {
//!     if let BatchEvent::Failed(failure) = event {
//!         eprintln!("{:?}: {}", failure.path, failure.error);
//!     }
//! })?;
//! println!("{}", result.summary_line());
//! # Ok(())
//! # }
//! ```

use crate::codec::ContainerCodec;
use crate::config::BatchConfig;
use crate::error::{DvplError, FsOp, Result};
use crate::filter::{FilterDecision, FilterEngine};
use crate::types::{
    BatchEvent, BatchFailure, BatchResult, FileTask, Mode, SkipReason, TaskOutcome,
};
use crate::utils::{destination_for, has_dvpl_suffix, make_relative, single_file_destination};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Message from the walker or a worker to the collector
#[derive(Debug)]
enum Report {
    Done(TaskOutcome),
    Failed(BatchFailure),
    Skipped(PathBuf, SkipReason),
}

/// Requests that a running batch stop taking new work
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Stop walking and drop queued tasks; in-flight tasks finish
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counters shared by the workers
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs one batch of pack or unpack tasks
#[derive(Debug)]
pub struct BatchScheduler {
    config: BatchConfig,
    filter: FilterEngine,
    codec: ContainerCodec,
    cancel: CancelHandle,
}

impl BatchScheduler {
    /// Create a scheduler, compiling the config's pattern lists
    ///
    /// Invalid patterns are logged and exposed through
    /// [`pattern_warnings`](Self::pattern_warnings); they never fail here.
    pub fn new(config: BatchConfig) -> Self {
        let filter = FilterEngine::new(
            config.mode(),
            config.ignore_patterns(),
            config.filter_patterns(),
            config.no_compress_patterns(),
            config.self_exclusions().clone(),
        );
        let codec = ContainerCodec::new(config.codec_options());
        Self {
            config,
            filter,
            codec,
            cancel: CancelHandle::default(),
        }
    }

    /// Build a scheduler for `path`, choosing the mode with [`detect_mode`]
    ///
    /// Everything except mode, input and output is taken from `template`;
    /// output follows the input so results land next to their sources.
    pub fn for_path(template: &BatchConfig, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mode = detect_mode(&path)?;
        Ok(Self::new(template.for_input(mode, path)))
    }

    /// Configuration in effect
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Patterns that failed to compile
    pub fn pattern_warnings(&self) -> impl Iterator<Item = DvplError> + '_ {
        self.filter.warnings()
    }

    /// Handle that cancels this scheduler's batch
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run the batch without progress events
    pub fn run(&self) -> Result<BatchResult> {
        self.run_with_progress(|_| {})
    }

    /// Run the batch, delivering an event per file from the collector thread
    ///
    /// # Errors
    ///
    /// Only setup failures are returned: the input cannot be stat'ed or the
    /// root directory cannot be read. Per-file failures are collected into
    /// [`BatchResult::failures`].
    pub fn run_with_progress<F>(&self, on_event: F) -> Result<BatchResult>
    where
        F: FnMut(BatchEvent<'_>) + Send,
    {
        let start = Instant::now();
        let input = self.config.input();
        let metadata = fs::metadata(input).map_err(|e| DvplError::fs(FsOp::Stat, input, e))?;

        let workers = self.config.workers();
        let capacity = self.config.queue_capacity();
        info!(
            "Starting {} of {:?} with {} workers",
            self.config.mode(),
            input,
            workers
        );
        let options = self.codec.options();
        debug!(
            "Fallback when compressed {} original, LZ4HC level {}",
            options.fallback.comparison(),
            options.hc_level
        );

        let in_flight = InFlight::default();
        let (task_tx, task_rx) = bounded::<FileTask>(capacity);
        let (report_tx, report_rx) = bounded::<Report>(capacity);

        let (walked, mut result) = thread::scope(|scope| {
            let collector = scope.spawn(move || collect(report_rx, on_event));

            for id in 0..workers {
                let tasks = task_rx.clone();
                let reports = report_tx.clone();
                let in_flight = &in_flight;
                scope.spawn(move || self.worker_loop(id, tasks, reports, in_flight));
            }
            drop(task_rx);

            let walked = if metadata.is_dir() {
                self.walk_directory(input, &task_tx, &report_tx)
            } else {
                self.plan_single_file(input, &task_tx, &report_tx)
            };

            // Closing both senders lets workers and then the collector finish.
            drop(task_tx);
            drop(report_tx);

            match collector.join() {
                Ok(result) => (walked, result),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        });

        let peak_queued = walked?;
        result.peak_queued = peak_queued;
        result.peak_in_flight = in_flight.peak.load(Ordering::SeqCst);
        result.cancelled = self.cancel.is_cancelled();
        result.duration = start.elapsed();

        info!(
            "Finished {} of {:?}: {} in {:?}",
            self.config.mode(),
            input,
            result.summary_line(),
            result.duration
        );
        Ok(result)
    }

    /// Walk `root`, queueing accepted files; returns the peak queue length
    fn walk_directory(
        &self,
        root: &Path,
        tasks: &Sender<FileTask>,
        reports: &Sender<Report>,
    ) -> Result<usize> {
        let mut peak_queued = 0;

        // Sorting makes walkdir read each directory fully before yielding it,
        // so files written by the batch itself are never walked.
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            if self.cancel.is_cancelled() {
                debug!("Walk of {:?} stopped by cancellation", root);
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!("Walk error: {}", e);
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    let _ = reports.send(Report::Failed(BatchFailure {
                        path,
                        error: e.into(),
                    }));
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() || (file_type.is_symlink() && !entry.path().is_file()) {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if let FilterDecision::Skip(reason) = self.filter.decide(&name) {
                trace!("Skip {:?}: {}", entry.path(), reason);
                let _ = reports.send(Report::Skipped(entry.path().to_path_buf(), reason));
                continue;
            }

            let relative = match make_relative(entry.path(), root) {
                Ok(relative) => relative,
                Err(error) => {
                    let _ = reports.send(Report::Failed(BatchFailure {
                        path: entry.path().to_path_buf(),
                        error,
                    }));
                    continue;
                }
            };
            let destination = destination_for(self.config.output(), &relative, self.config.mode());
            let task = self.task_for(entry.path().to_path_buf(), destination, &name);

            // Blocks while the queue is full.
            if tasks.send(task).is_err() {
                break;
            }
            peak_queued = peak_queued.max(tasks.len());
        }

        Ok(peak_queued)
    }

    /// Queue the one task for an explicitly named file
    fn plan_single_file(
        &self,
        input: &Path,
        tasks: &Sender<FileTask>,
        reports: &Sender<Report>,
    ) -> Result<usize> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let FilterDecision::Skip(reason) = self.filter.decide_explicit(&name) {
            debug!("Skip {:?}: {}", input, reason);
            let _ = reports.send(Report::Skipped(input.to_path_buf(), reason));
            return Ok(0);
        }

        let destination = single_file_destination(input, self.config.output(), self.config.mode());
        let task = self.task_for(input.to_path_buf(), destination, &name);
        let _ = tasks.send(task);
        Ok(tasks.len())
    }

    fn task_for(&self, source: PathBuf, destination: PathBuf, name: &str) -> FileTask {
        let compression = match self.config.mode() {
            Mode::Pack => Some(
                self.filter
                    .effective_compression(name, self.config.compression()),
            ),
            Mode::Unpack => None,
        };
        FileTask {
            source,
            destination,
            compression,
            keep_original: self.config.keep_original(),
            skip_integrity_check: self.config.skip_integrity_check(),
        }
    }

    fn worker_loop(
        &self,
        id: usize,
        tasks: Receiver<FileTask>,
        reports: Sender<Report>,
        in_flight: &InFlight,
    ) {
        trace!("Worker {} started", id);
        for task in tasks.iter() {
            if self.cancel.is_cancelled() {
                let _ = reports.send(Report::Skipped(task.source, SkipReason::Cancelled));
                continue;
            }

            in_flight.enter();
            let report = match execute_task(&self.codec, &task) {
                Ok(outcome) => Report::Done(outcome),
                Err(error) => {
                    debug!("Worker {} failed on {:?}: {}", id, task.source, error);
                    Report::Failed(BatchFailure {
                        path: task.source,
                        error,
                    })
                }
            };
            in_flight.leave();

            if reports.send(report).is_err() {
                break;
            }
        }
        trace!("Worker {} exiting", id);
    }
}

/// Read, transform, write, then optionally remove the source
///
/// The steps run strictly in order; any failure stops the task and leaves
/// the source untouched.
pub fn execute_task(codec: &ContainerCodec, task: &FileTask) -> Result<TaskOutcome> {
    if task.source == task.destination {
        return Err(DvplError::invalid_config(format!(
            "destination {:?} is the source file",
            task.destination
        )));
    }

    let input = fs::read(&task.source).map_err(|e| DvplError::fs(FsOp::Read, &task.source, e))?;

    let (output, payload_type) = match task.compression {
        Some(choice) => {
            let packed = codec.pack(&input, choice)?;
            (packed.bytes, packed.payload_type)
        }
        None => {
            let unpacked = codec.unpack(&input, task.skip_integrity_check)?;
            (unpacked.bytes, unpacked.payload_type)
        }
    };

    if let Some(parent) = task.destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| DvplError::fs(FsOp::CreateDir, parent, e))?;
        }
    }
    fs::write(&task.destination, &output)
        .map_err(|e| DvplError::fs(FsOp::Write, &task.destination, e))?;

    if !task.keep_original {
        fs::remove_file(&task.source).map_err(|e| DvplError::fs(FsOp::Remove, &task.source, e))?;
    }

    debug!(
        "{} {}: {:?} -> {:?} ({} -> {} bytes)",
        task.mode(),
        payload_type,
        task.source,
        task.destination,
        input.len(),
        output.len()
    );

    Ok(TaskOutcome {
        source: task.source.clone(),
        destination: task.destination.clone(),
        mode: task.mode(),
        payload_type,
        bytes_in: input.len() as u64,
        bytes_out: output.len() as u64,
        source_removed: !task.keep_original,
    })
}

/// Drain reports until every sender is gone
fn collect<F>(reports: Receiver<Report>, mut on_event: F) -> BatchResult
where
    F: FnMut(BatchEvent<'_>),
{
    let mut result = BatchResult::default();
    for report in reports {
        match report {
            Report::Done(outcome) => {
                on_event(BatchEvent::Completed(&outcome));
                result.record_outcome(&outcome);
            }
            Report::Failed(failure) => {
                on_event(BatchEvent::Failed(&failure));
                result.failures.push(failure);
            }
            Report::Skipped(path, reason) => {
                on_event(BatchEvent::Skipped {
                    path: &path,
                    reason,
                });
                result.skipped += 1;
            }
        }
    }
    result
}

/// Decide whether `path` should be packed or unpacked
///
/// A file is unpacked if it carries the `.dvpl` suffix. A directory is
/// unpacked if any file beneath it does; the pre-walk stops at the first
/// such file and never modifies anything.
///
/// # Errors
///
/// Fails if `path` cannot be stat'ed or the directory cannot be opened.
pub fn detect_mode(path: &Path) -> Result<Mode> {
    let metadata = fs::metadata(path).map_err(|e| DvplError::fs(FsOp::Stat, path, e))?;
    if !metadata.is_dir() {
        return Ok(if has_dvpl_suffix(path) {
            Mode::Unpack
        } else {
            Mode::Pack
        });
    }

    for entry in WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(_) => continue,
        };
        if !entry.file_type().is_dir() && has_dvpl_suffix(entry.path()) {
            trace!("Found packed file {:?}, treating {:?} as unpack", entry.path(), path);
            return Ok(Mode::Unpack);
        }
    }
    Ok(Mode::Pack)
}
