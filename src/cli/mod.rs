//! # CLI Module
//!
//! Command-line interface for the photo importer.
//!
//! ## Usage
//! ```bash
//! # Import a card into the default-named destination tree
//! photo-import run /media/CARD01 --destination ~/Pictures
//!
//! # With a job code and two backup drives
//! photo-import run /media/CARD01 -d ~/Pictures \
//!     --job-code wedding --backup /mnt/backup1 --backup /mnt/backup2
//!
//! # Skip files whose destination name is already taken
//! photo-import run /media/CARD01 -d ~/Pictures --conflict skip
//!
//! # JSON output
//! photo-import run /media/CARD01 -d ~/Pictures --output json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photo_importer::core::cache::{InMemoryCache, SqliteThumbCache, ThumbCache};
use photo_importer::core::{
    BackupPolicy, BackupTarget, ConflictPolicy, Coordinator, FolderDevice, ImportConfig,
    ImportReport, ProviderAvailability,
};
use photo_importer::error::Result;
use photo_importer::events::{CopyEvent, Event, EventChannel, ScanEvent, SessionEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// Photo Importer - download, rename, verify, back up
#[derive(Parser, Debug)]
#[command(name = "photo-import")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import photos and videos from one or more source devices
    Run {
        /// Source devices (mounted folders or card roots)
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination root for imported files
        #[arg(short, long)]
        destination: PathBuf,

        /// Backup roots; each receives a verified second copy
        #[arg(long)]
        backup: Vec<PathBuf>,

        /// Treat backup failures as warnings instead of file failures
        #[arg(long)]
        backup_best_effort: bool,

        /// Job code usable in naming templates
        #[arg(short, long)]
        job_code: Option<String>,

        /// What to do when two files resolve to the same name
        #[arg(long, default_value = "add-suffix")]
        conflict: Conflict,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Thumbnail cache database path
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Skip the on-disk thumbnail cache entirely
        #[arg(long)]
        no_cache: bool,

        /// Sequence counter file (persists downloads-today across runs)
        #[arg(long)]
        sequence_file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Conflict {
    /// Skip the later file
    Skip,
    /// Append an incrementing _1, _2, ... suffix
    AddSuffix,
}

impl From<Conflict> for ConflictPolicy {
    fn from(conflict: Conflict) -> Self {
        match conflict {
            Conflict::Skip => ConflictPolicy::Skip,
            Conflict::AddSuffix => ConflictPolicy::AddUniqueIdentifier,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (imported paths only)
    Minimal,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            sources,
            destination,
            backup,
            backup_best_effort,
            job_code,
            conflict,
            output,
            verbose,
            cache,
            no_cache,
            sequence_file,
        } => run_import(ImportArgs {
            sources,
            destination,
            backup,
            backup_best_effort,
            job_code,
            conflict,
            output,
            verbose,
            cache,
            no_cache,
            sequence_file,
        }),
    }
}

struct ImportArgs {
    sources: Vec<PathBuf>,
    destination: PathBuf,
    backup: Vec<PathBuf>,
    backup_best_effort: bool,
    job_code: Option<String>,
    conflict: Conflict,
    output: OutputFormat,
    verbose: bool,
    cache: Option<PathBuf>,
    no_cache: bool,
    sequence_file: Option<PathBuf>,
}

fn run_import(args: ImportArgs) -> Result<()> {
    let term = Term::stderr();

    if matches!(args.output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Photo Importer").bold().cyan(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    // Thumbnail cache: on-disk by default so re-imports are fast
    let cache: Arc<dyn ThumbCache> = if args.no_cache {
        Arc::new(InMemoryCache::new())
    } else {
        let cache_path = args.cache.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("photo-importer")
                .join("thumbs.db")
        });
        Arc::new(SqliteThumbCache::open(&cache_path)?)
    };

    let mut config = ImportConfig::new(&args.destination);
    config.naming.policy = args.conflict.into();
    config.job_code = args.job_code.clone();
    config.sequence_file = args.sequence_file.clone();
    config.backups = args
        .backup
        .iter()
        .map(|root| BackupTarget {
            root: root.clone(),
            policy: BackupPolicy::Overwrite,
            best_effort: args.backup_best_effort,
        })
        .collect();

    // Probe for a metadata provider once; never re-checked mid-pipeline
    let provider = match ProviderAvailability::probe() {
        ProviderAvailability::Available(provider) => provider,
        ProviderAvailability::Unavailable { reason } => {
            return Err(photo_importer::ImportError::Config(format!(
                "no metadata provider available: {reason}"
            )));
        }
    };

    let (sender, receiver) = EventChannel::new();
    let mut coordinator = Coordinator::new(config, provider, cache, sender.clone());
    for source in &args.sources {
        coordinator.add_device(Arc::new(FolderDevice::new(source)));
    }

    // Progress bar for pretty output, driven by copy byte counts
    let progress = if matches!(args.output, OutputFormat::Pretty) {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .unwrap()
                .progress_chars("█▓░"),
        );
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();
    let verbose_clone = args.verbose;

    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Scan(ScanEvent::Completed {
                    total_files,
                    total_bytes,
                    ..
                }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_message(format!("{} files found", total_files));
                        pb.inc_length(total_bytes);
                    }
                }
                Event::Copy(CopyEvent::Progress(p)) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_position(p.bytes_copied);
                        if verbose_clone {
                            pb.set_message(format!(
                                "{} ({}/{})",
                                p.current_path
                                    .file_name()
                                    .unwrap_or_default()
                                    .to_string_lossy(),
                                p.files_completed,
                                p.files_total
                            ));
                        }
                    }
                }
                Event::Session(SessionEvent::Completed { .. }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.finish_and_clear();
                    }
                }
                _ => {}
            }
        }
    });

    let result = coordinator.run();

    drop(sender);
    event_thread.join().ok();

    let report = result?;
    match args.output {
        OutputFormat::Pretty => print_pretty_report(&term, &report, args.verbose),
        OutputFormat::Json => print_json_report(&report),
        OutputFormat::Minimal => print_minimal_report(&report),
    }

    Ok(())
}

fn print_pretty_report(term: &Term, report: &ImportReport, verbose: bool) {
    let summary = &report.summary;

    term.write_line("").ok();
    if summary.files_failed == 0 {
        term.write_line(&format!("{} Import Complete", style("✓").green().bold()))
            .ok();
    } else {
        term.write_line(&format!(
            "{} Import finished with errors",
            style("!").yellow().bold()
        ))
        .ok();
    }
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} files imported ({}) in {:.1}s",
        style(summary.files_completed).cyan(),
        format_bytes(summary.bytes_copied),
        summary.duration_ms as f64 / 1000.0
    ))
    .ok();

    if summary.files_skipped > 0 {
        term.write_line(&format!(
            "  {} skipped",
            style(summary.files_skipped).yellow()
        ))
        .ok();
    }
    if summary.files_failed > 0 {
        term.write_line(&format!("  {} failed", style(summary.files_failed).red()))
            .ok();
    }
    if summary.files_incomplete > 0 {
        term.write_line(&format!(
            "  {} held awaiting backup",
            style(summary.files_incomplete).yellow()
        ))
        .ok();
    }
    if !report.clusters.is_empty() {
        term.write_line(&format!(
            "  {} timeline clusters",
            style(report.clusters.len()).dim()
        ))
        .ok();
    }
    term.write_line("").ok();

    // Failures grouped by the task they arose in
    let failures = report.failures_by_task();
    if !failures.is_empty() {
        term.write_line(&format!("{}", style("Problems:").bold().underlined()))
            .ok();
        term.write_line("").ok();

        let mut tasks: Vec<_> = failures.keys().copied().collect();
        tasks.sort_by_key(|t| format!("{t}"));
        for task in tasks {
            term.write_line(&format!("  {}", style(format!("{task}:")).bold()))
                .ok();
            for file in &failures[&task] {
                let reason = file
                    .reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                term.write_line(&format!(
                    "    {} {} ({})",
                    style("✗").red(),
                    file.source.display(),
                    style(reason).dim()
                ))
                .ok();
            }
        }
        term.write_line("").ok();
    }

    if verbose {
        for file in &report.files {
            for warning in &file.warnings {
                term.write_line(&format!(
                    "  {} {}: {}",
                    style("warn").yellow(),
                    file.source.display(),
                    warning
                ))
                .ok();
            }
        }
    }

    term.write_line(&format!(
        "{}",
        style("Source files were not modified or deleted.").dim()
    ))
    .ok();
}

fn print_json_report(report: &ImportReport) {
    let output = serde_json::json!({
        "summary": report.summary,
        "files": report.files,
        "clusters": report.clusters,
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}

fn print_minimal_report(report: &ImportReport) {
    for file in &report.files {
        if let Some(destination) = &file.destination {
            println!("{}", destination.display());
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
