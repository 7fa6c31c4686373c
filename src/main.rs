//! fileman - Snapshot a directory tree's metadata to JSON.
//!
//! Usage:
//!   fileman snapshot [--root DIR] [--out FILE]   Tree snapshot (JSON / JSON lines)
//!   fileman flat [--root DIR] [--out FILE]       Flat list of entries
//!   fileman --help                               Show help

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fileman_core::{Entry, ScanOptions, ScanWarning};
use fileman_scan::{CancellationToken, Scanner, write_flat, write_snapshot, write_stream};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "FILEMAN_LOG";

#[derive(Parser)]
#[command(
    name = "fileman",
    version,
    about = "Snapshot a directory tree's metadata to JSON",
    long_about = "fileman walks a directory and records every entry's type, size, \
                  permissions, ownership and timestamps.\n\n\
                  `fileman snapshot` writes a nested tree, `fileman flat` a flat list."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a tree snapshot of a directory
    Snapshot {
        #[command(flatten)]
        scan: ScanArgs,

        /// Pretty-printed JSON document
        #[arg(long, conflicts_with_all = ["jsonl", "stream"])]
        json: bool,

        /// Single-line JSON document (default)
        #[arg(long, conflicts_with = "stream")]
        jsonl: bool,

        /// JSON lines: a header, then one line per entry, without building a tree
        #[arg(long)]
        stream: bool,

        /// Also render the tree to stderr
        #[arg(long, conflicts_with = "stream")]
        print: bool,
    },

    /// Write a flat list of entries (root excluded)
    Flat {
        #[command(flatten)]
        scan: ScanArgs,

        /// Pretty-printed JSON
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Directory to scan
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Maximum depth to descend into (root is 0)
    #[arg(short, long)]
    depth: Option<u32>,

    /// Include entries whose name starts with '.'
    #[arg(long)]
    include_hidden: bool,

    /// Stat through symlinks and traverse linked directories
    #[arg(long)]
    follow_symlinks: bool,

    /// Glob to exclude (repeatable; a leading '/' anchors it at the root)
    #[arg(short, long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Do not prepend the built-in excludes (.git, node_modules, target, ...)
    #[arg(long)]
    no_default_excludes: bool,

    /// Worker threads (1 = sequential, 0 = one per core)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Stop listing new directories after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// TOML file with scan options; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report progress on stderr
    #[arg(long)]
    progress: bool,
}

impl ScanArgs {
    /// Merge the config file (if any) with command-line flags.
    fn options(&self) -> Result<ScanOptions> {
        let base = match &self.config {
            Some(path) => ScanOptions::from_file(path)
                .wrap_err_with(|| format!("Failed to load config {}", path.display()))?,
            None => ScanOptions::new(),
        };

        let mut exclude = base.exclude_patterns;
        exclude.extend(self.exclude.iter().cloned());

        let options = ScanOptions::builder()
            .max_depth(self.depth.or(base.max_depth))
            .include_hidden(self.include_hidden || base.include_hidden)
            .follow_symlinks(self.follow_symlinks || base.follow_symlinks)
            .exclude_patterns(exclude)
            .threads(self.threads.unwrap_or(base.threads))
            .build()
            .wrap_err("Invalid scan options")?;

        Ok(if self.no_default_excludes {
            options
        } else {
            options.with_default_excludes()
        })
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Command::Snapshot {
            scan,
            json,
            jsonl: _,
            stream,
            print,
        } => run_snapshot(&scan, json, stream, print),
        Command::Flat { scan, pretty } => run_flat(&scan, pretty),
    }
}

/// Install the stderr log subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Scanner plus the background tasks driving its timeout and progress line.
struct Session {
    scanner: Scanner,
    token: CancellationToken,
    runtime: tokio::runtime::Runtime,
    progress: Option<JoinHandle<()>>,
}

impl Session {
    fn start(args: &ScanArgs) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .wrap_err("Failed to start runtime")?;

        let token = CancellationToken::new();
        let scanner = Scanner::new().with_cancellation(token.clone());

        if let Some(secs) = args.timeout {
            let token = token.clone();
            runtime.spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                tracing::warn!(timeout_secs = secs, "timeout reached, stopping scan");
                token.cancel();
            });
        }

        let progress = args.progress.then(|| {
            let mut rx = scanner.subscribe();
            runtime.spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(progress) => {
                            eprint!(
                                "\r{} entries, {} ({:.0}/s)   ",
                                progress.total_items(),
                                format_size(progress.bytes_scanned),
                                progress.entries_per_second()
                            );
                            if progress.finished {
                                eprintln!();
                                break;
                            }
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        });

        Ok(Self {
            scanner,
            token,
            runtime,
            progress,
        })
    }

    /// Wait for the progress line to print its final update.
    fn finish(self) {
        if let Some(handle) = self.progress {
            let _ = self.runtime.block_on(handle);
        }
        if self.token.is_cancelled() {
            tracing::info!("snapshot is partial");
        }
    }
}

/// Open the output: a file (creating parent directories) or stdout.
fn open_output(out: Option<&Path>) -> Result<Box<dyn Write>> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = File::create(path)
                .wrap_err_with(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

/// Write a tree snapshot.
fn run_snapshot(args: &ScanArgs, pretty: bool, stream: bool, print: bool) -> Result<()> {
    let options = args.options()?;
    let session = Session::start(args)?;
    let start = Instant::now();

    if stream {
        let out = open_output(args.out.as_deref())?;
        let summary = write_stream(&session.scanner, &args.root, &options, out)
            .wrap_err("Scan failed")?;
        session.finish();

        eprintln!(
            "Streamed {} entries from {} in {:.2}s, {} warning(s)",
            summary.entries,
            args.root.display(),
            start.elapsed().as_secs_f64(),
            summary.warnings
        );
        return Ok(());
    }

    let snapshot = session
        .scanner
        .scan(&args.root, &options)
        .wrap_err("Scan failed")?;
    session.finish();

    report_warnings(&snapshot.warnings);
    if print {
        print_node(&snapshot.tree, &args.root, 0);
    }

    write_snapshot(&snapshot, pretty, open_output(args.out.as_deref())?)
        .wrap_err("Failed to write snapshot")?;

    let stats = snapshot.stats();
    eprintln!(
        "{}: {} entries ({} files, {} directories, {} symlinks), {} in {:.2}s",
        args.root.display(),
        stats.total_entries(),
        stats.total_files,
        stats.total_dirs,
        stats.total_symlinks,
        format_size(stats.total_size),
        start.elapsed().as_secs_f64()
    );
    if let Some(out) = &args.out {
        eprintln!("Wrote {}", out.display());
    }

    Ok(())
}

/// Write a flat list.
fn run_flat(args: &ScanArgs, pretty: bool) -> Result<()> {
    let options = args.options()?;
    let session = Session::start(args)?;
    let start = Instant::now();

    let flat = session
        .scanner
        .scan_flat(&args.root, &options)
        .wrap_err("Scan failed")?;
    session.finish();

    report_warnings(&flat.warnings);
    write_flat(&flat, pretty, open_output(args.out.as_deref())?)
        .wrap_err("Failed to write flat listing")?;

    eprintln!(
        "{}: {} entries in {:.2}s",
        args.root.display(),
        flat.entries.len(),
        start.elapsed().as_secs_f64()
    );
    if let Some(out) = &args.out {
        eprintln!("Wrote {}", out.display());
    }

    Ok(())
}

fn report_warnings(warnings: &[ScanWarning]) {
    for warning in warnings {
        tracing::warn!(path = %warning.path, kind = ?warning.kind, "{}", warning.message);
    }
    if !warnings.is_empty() {
        eprintln!("{} warning(s) during scan", warnings.len());
    }
}

/// Print an entry and its children to stderr.
fn print_node(entry: &Entry, root: &Path, depth: usize) {
    let indent = "  ".repeat(depth);

    let name = if depth == 0 {
        root.display().to_string()
    } else {
        entry.name().to_string()
    };

    match entry {
        Entry::Directory(dir) => {
            eprintln!(
                "{}▼ {:<40} {:>10} {}",
                indent,
                truncate(&format!("{name}/"), 40),
                format!("{} items", dir.children.len()),
                dir.meta.permissions()
            );
            for child in &dir.children {
                print_node(child, root, depth + 1);
            }
        }
        Entry::File(file) => {
            eprintln!(
                "{}  {:<40} {:>10} {}",
                indent,
                truncate(&name, 40),
                format_size(file.size),
                file.meta.permissions()
            );
        }
        Entry::Symlink(link) => {
            eprintln!("{}  {} -> {}", indent, truncate(&name, 40), link.target);
        }
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
