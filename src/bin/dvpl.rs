//! # dvpl CLI - pack and unpack DVPL files
//!
//! A command-line front end for the dvpl library.
//!
//! ## Features
//! - Pack or unpack a single file or a whole directory tree in parallel
//! - Ignore, filter and no-compress glob lists
//! - Optional `.dvpl.yml` next to the executable, or `--config <path>`
//! - Drag-and-drop: pass paths positionally and the mode is detected per path
//! - Interactive menu when started without arguments
//!
//! ## Usage
//! ```bash
//! # Pack a directory with LZ4HC, in place
//! dvpl -c -i ./Data
//!
//! # Unpack into another directory, keeping the containers
//! dvpl -d -i ./Data -o ./Unpacked --keep-original
//!
//! # Skip executables, store images uncompressed
//! dvpl -c -i ./Data --ignore "*.exe,*.dll" --no-compress "*.webp,*.png"
//!
//! # Drag-and-drop style
//! dvpl ./Data ./other/file.txt.dvpl
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use colored::*;
use dvpl::utils::format_bytes;
use dvpl::{
    BatchConfig, BatchConfigBuilder, BatchEvent, BatchResult, BatchScheduler, ConfigFile,
    FallbackPolicy, Mode, PayloadType,
};
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

/// Exit status when a batch finished with per-file failures
const EXIT_PARTIAL: u8 = 2;

/// dvpl CLI - Convert files to and from DVPL containers
#[derive(Parser)]
#[command(name = "dvpl")]
#[command(version)]
#[command(about = "Pack and unpack .dvpl files, whole directory trees at a time")]
#[command(long_about = None)]
struct Cli {
    /// Pack files into .dvpl containers
    #[arg(short = 'c', long = "compress", conflicts_with = "decompress")]
    compress: bool,

    /// Unpack .dvpl containers
    #[arg(short = 'd', long = "decompress")]
    decompress: bool,

    /// Input path (file or directory)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output path (file or directory); defaults to the input
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep original files
    #[arg(long)]
    keep_original: bool,

    /// Payload type: 0|none, 1|lz4hc, 2|lz4
    #[arg(long = "compress-type", value_parser = parse_payload_type)]
    compress_type: Option<PayloadType>,

    /// Keep compressed output even when it is not smaller
    #[arg(short, long)]
    force: bool,

    /// Decode even when the CRC32 does not match
    #[arg(long)]
    skip_crc: bool,

    /// Comma-separated glob patterns to ignore
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<String>,

    /// Comma-separated glob patterns; only matching files are processed
    #[arg(long, value_delimiter = ',')]
    filter: Vec<String>,

    /// Comma-separated glob patterns stored without compression
    #[arg(long = "no-compress", value_delimiter = ',')]
    no_compress: Vec<String>,

    /// Number of parallel workers (defaults to CPU count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// When to discard compressed output in favour of raw bytes
    #[arg(long, value_enum, default_value = "not-smaller")]
    fallback: FallbackMode,

    /// LZ4HC compression level (1-12)
    #[arg(long, default_value_t = 9)]
    hc_level: i32,

    /// Config file (defaults to .dvpl.yml next to the executable)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show a spinner while running
    #[arg(long)]
    progress: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Files or directories to process, mode detected per path
    #[arg(conflicts_with_all = ["input", "compress", "decompress"])]
    paths: Vec<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FallbackMode {
    /// Store raw when compressed size >= original
    NotSmaller,
    /// Store raw only when compressed size > original
    Larger,
}

impl From<FallbackMode> for FallbackPolicy {
    fn from(mode: FallbackMode) -> Self {
        match mode {
            FallbackMode::NotSmaller => FallbackPolicy::NotSmaller,
            FallbackMode::Larger => FallbackPolicy::Larger,
        }
    }
}

fn parse_payload_type(s: &str) -> std::result::Result<PayloadType, String> {
    let t: PayloadType = s.parse().map_err(|e: dvpl::DvplError| e.to_string())?;
    if !t.is_writable() {
        return Err(format!("payload type {} can only be decoded", t));
    }
    Ok(t)
}

fn main() -> ExitCode {
    let bare = std::env::args_os().len() == 1;
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let outcome = if bare {
        interactive()
    } else {
        run(cli)
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_PARTIAL),
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "dvpl=debug" } else { "dvpl=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Load the config overlay; an explicit path must parse, a discovered one may not
fn load_config_file(explicit: Option<&Path>) -> Result<Option<ConfigFile>> {
    if let Some(path) = explicit {
        let file = ConfigFile::load(path)
            .with_context(|| format!("loading config file {}", path.display()))?;
        return Ok(Some(file));
    }

    let Some(path) = ConfigFile::discover() else {
        return Ok(None);
    };
    match ConfigFile::load(&path) {
        Ok(file) => {
            tracing::debug!("Using config file {:?}", path);
            Ok(Some(file))
        }
        Err(e) => {
            eprintln!(
                "{} ignoring {}: {}",
                "Warning:".yellow().bold(),
                path.display(),
                e
            );
            Ok(None)
        }
    }
}

/// Main command runner; returns whether every file succeeded
fn run(cli: Cli) -> Result<bool> {
    let file = load_config_file(cli.config.as_deref())?.unwrap_or_default();

    if !cli.paths.is_empty() {
        let template = builder_from(&cli, &file, Mode::Pack, cli.paths[0].clone()).build()?;
        return run_dropped(&cli.paths, &template, cli.progress, cli.verbose);
    }

    let mode = match (cli.compress, cli.decompress) {
        (true, false) => Mode::Pack,
        (false, true) => Mode::Unpack,
        _ => match file.mode() {
            Some(mode) => mode,
            None => {
                Cli::command().print_help()?;
                bail!("specify either -c (compress) or -d (decompress)");
            }
        },
    };

    let Some(input) = cli.input.clone().or_else(|| file.input.clone()) else {
        Cli::command().print_help()?;
        bail!("an input path is required (-i)");
    };

    let config = builder_from(&cli, &file, mode, input).build()?;
    run_batch(config, cli.progress, cli.verbose)
}

/// Build a config from CLI flags, overlaid with the config file
fn builder_from(cli: &Cli, file: &ConfigFile, mode: Mode, input: PathBuf) -> BatchConfigBuilder {
    let mut builder = BatchConfigBuilder::new(mode, input)
        .forced(cli.force)
        .keep_original(cli.keep_original)
        .skip_integrity_check(cli.skip_crc)
        .ignore_patterns(cli.ignore.clone())
        .filter_patterns(cli.filter.clone())
        .no_compress_patterns(cli.no_compress.clone())
        .fallback_policy(cli.fallback.into())
        .hc_level(cli.hc_level);

    if let Some(output) = &cli.output {
        builder = builder.output(output.clone());
    }
    if let Some(t) = cli.compress_type {
        builder = builder.payload_type(t);
    }
    if let Some(w) = cli.workers {
        builder = builder.workers(w);
    }
    builder.overlay(file)
}

/// Run each dropped path with its own detected mode
fn run_dropped(paths: &[PathBuf], template: &BatchConfig, progress: bool, verbose: bool) -> Result<bool> {
    let mut all_ok = true;
    for path in paths {
        let scheduler = match BatchScheduler::for_path(template, path.clone()) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                eprintln!("{} {}: {}", "[error]".red().bold(), path.display(), e.user_message());
                all_ok = false;
                continue;
            }
        };
        all_ok &= execute(&scheduler, progress, verbose)?;
    }
    Ok(all_ok)
}

fn run_batch(config: BatchConfig, progress: bool, verbose: bool) -> Result<bool> {
    let scheduler = BatchScheduler::new(config);
    execute(&scheduler, progress, verbose)
}

/// Run one scheduler, printing a line per file and a final summary
fn execute(scheduler: &BatchScheduler, progress: bool, verbose: bool) -> Result<bool> {
    let config = scheduler.config();
    for warning in scheduler.pattern_warnings() {
        eprintln!("{} {}", "Warning:".yellow().bold(), warning);
    }

    let verb = match config.mode() {
        Mode::Pack => "Packing",
        Mode::Unpack => "Unpacking",
    };
    println!(
        "{} {} with {} workers",
        verb.blue().bold(),
        config.input().display().to_string().cyan(),
        config.workers()
    );

    let spinner = if progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {pos} files {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let print = |line: String| match &spinner {
        Some(pb) => pb.println(line),
        None => println!("{}", line),
    };

    let start = Instant::now();
    let result = scheduler.run_with_progress(|event| match event {
        BatchEvent::Completed(outcome) => {
            let verb = match outcome.mode {
                Mode::Pack => "Pack",
                Mode::Unpack => "Unpack",
            };
            print(format!("{} {}: {}", verb, outcome.payload_type, outcome.source.display()));
            if let Some(pb) = &spinner {
                pb.inc(1);
            }
        }
        BatchEvent::Failed(failure) => {
            print(format!("{} {}", "Failed:".red(), failure.path.display()));
            if let Some(pb) = &spinner {
                pb.inc(1);
            }
        }
        BatchEvent::Skipped { path, reason } => {
            if verbose {
                print(format!("{}", format!("Skip ({}): {}", reason, path.display()).dimmed()));
            }
        }
    })?;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    print_summary(&result, start.elapsed());
    Ok(result.is_success())
}

fn print_summary(result: &BatchResult, elapsed: std::time::Duration) {
    for failure in &result.failures {
        eprintln!(
            "{} {}: {}",
            "[error]".red().bold(),
            failure.path.display(),
            failure.error.user_message()
        );
    }
    let transient = result
        .failures
        .iter()
        .filter(|f| f.error.is_recoverable())
        .count();
    if transient > 0 {
        eprintln!(
            "{} {} failure(s) were transient I/O errors; running again may fix them",
            "Note:".yellow().bold(),
            transient
        );
    }

    let mark = if result.is_success() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "\n{} {} ({} read, {} written)",
        mark,
        result.summary_line(),
        format_bytes(result.bytes_read),
        format_bytes(result.bytes_written)
    );
    if result.cancelled {
        println!("{}", "Cancelled before all files were processed".yellow());
    }
    println!("{}", format!("Total time: {}", format_duration(elapsed)).dimmed());
    println!("{}", "Operation completed!".bold());
}

/// Numbered menu on stdin, run against the current directory
fn interactive() -> Result<bool> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    let operation = prompt(&mut lines, "Select operation", &["Compress", "Decompress"], 0)?;
    let config = if operation == 0 {
        let types = [PayloadType::None, PayloadType::Lz4Hc, PayloadType::Lz4];
        let labels = ["None (0)", "LZ4HC (1)", "LZ4 (2)"];
        let choice = prompt(&mut lines, "Select compression type", &labels, 1)?;
        BatchConfigBuilder::new(Mode::Pack, ".")
            .payload_type(types[choice])
            .build()?
    } else {
        BatchConfigBuilder::new(Mode::Unpack, ".").build()?
    };

    run_batch(config, false, false)
}

fn prompt<B: BufRead>(
    lines: &mut io::Lines<B>,
    title: &str,
    options: &[&str],
    default: usize,
) -> Result<usize> {
    println!("{}", title.blue().bold());
    for (i, option) in options.iter().enumerate() {
        let marker = if i == default { ">" } else { " " };
        println!("{} {}) {}", marker, i + 1, option);
    }

    loop {
        print!("Choice [{}]: ", default + 1);
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            return Ok(default);
        };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(default);
        }
        match line.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => println!("{}", format!("Enter a number from 1 to {}", options.len()).yellow()),
        }
    }
}
