use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use photocluster::core::{ClusterAssignment, ClusterSummary, HasherRegistry, MIN_NEIGHBORS};
use photocluster::services::{self, RestoreSelection};
use photocluster::{PhotoclusterConfig, RunObserver};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "photocluster", version, about = "Group visually similar photos into folders")]
struct Cli {
    /// Increase log verbosity (-v debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find clusters of similar images and list them
    Scan {
        #[command(flatten)]
        cluster: ClusterArgs,
        /// Print assignments as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move each cluster into its own `group_<n>` directory
    Group {
        #[command(flatten)]
        cluster: ClusterArgs,
        /// Only show what would be moved
        #[arg(long)]
        dry_run: bool,
    },

    /// Work with grouping history
    History {
        #[command(subcommand)]
        command: HistoryCmd,
    },
}

#[derive(Args, Debug)]
struct ClusterArgs {
    /// Directory containing the photos
    #[arg(short, long, value_name = "DIR")]
    path: PathBuf,
    /// Maximum proportion of differing hash bits (0.0-1.0); lower is stricter
    #[arg(short, long, value_parser = parse_sensitivity)]
    sensitivity: f64,
    /// Number of hashing workers (default: 75% of CPUs, at most 8)
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Minimum neighborhood size, including the image itself, to seed a cluster
    #[arg(long, default_value_t = MIN_NEIGHBORS)]
    min_neighbors: usize,
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List grouping history records
    List {
        /// Directory containing the photos
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Move grouped files back to their original locations
    Restore {
        /// Directory containing the photos
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Restore a specific record index
        #[arg(long, conflicts_with = "all")]
        record: Option<usize>,
        /// Restore all records
        #[arg(long, conflicts_with = "record")]
        all: bool,
    },
}

#[derive(Serialize)]
struct AssignmentRow<'a> {
    path: &'a Path,
    cluster_id: i64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan { cluster, json } => {
            let config = build_config(&cluster, true);
            let progress = TerminalProgress::new()?;
            let assignments = benchmark("clustering", || {
                photocluster::cluster_directory_with(
                    &config,
                    &HasherRegistry::default(),
                    &progress,
                )
            })?;
            if json {
                let rows: Vec<_> = assignments
                    .iter()
                    .map(|a| AssignmentRow {
                        path: &a.identifier,
                        cluster_id: a.label.id(),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_groups(&assignments);
            }
        }

        Commands::Group { cluster, dry_run } => {
            let config = build_config(&cluster, dry_run);
            let progress = TerminalProgress::new()?;
            let report = benchmark("grouping", || {
                photocluster::photocluster_with(&config, &progress)
            })?;
            print_groups(&report.assignments);

            let report = report.groups;
            for file_move in &report.moves {
                let verb = if dry_run { "[dry-run] MOVE" } else { "Moved" };
                println!(
                    "   📦 {} {} → {}",
                    verb,
                    file_move.from.display(),
                    file_move.to.display()
                );
            }

            if dry_run {
                println!("\n⚠️  Dry-run only; no files were changed.");
            } else if !report.moves.is_empty() {
                println!(
                    "\n✅ Moved {} file(s); recorded history in {}",
                    report.moves.len(),
                    services::history::history_path(&config.input_dir).display()
                );
            }
        }

        Commands::History { command } => match command {
            HistoryCmd::List { path } => {
                let records = services::read_history(&path)?;
                if records.is_empty() {
                    println!("No grouping history.");
                    return Ok(());
                }
                println!("🗂️  Grouping History:");
                for (i, record) in records.iter().enumerate() {
                    println!("[{}] {} ({} file(s))", i, record.timestamp, record.moves.len());
                    for file_move in &record.moves {
                        println!(
                            "     {} → {}",
                            file_move.from.display(),
                            file_move.to.display()
                        );
                    }
                }
            }

            HistoryCmd::Restore { path, record, all } => {
                let selection = match (all, record) {
                    (true, _) => RestoreSelection::All,
                    (false, Some(index)) => RestoreSelection::Index(index),
                    (false, None) => RestoreSelection::Latest,
                };
                let report = services::restore_history(&path, selection)?;
                for file_move in &report.restored {
                    println!(
                        "🔄 Restored {} → {}",
                        file_move.from.display(),
                        file_move.to.display()
                    );
                }
                if report.skipped > 0 {
                    eprintln!("⚠️  Skipped {} file(s)", report.skipped);
                }
                println!(
                    "🧹 Updated history, removed {} record(s)",
                    report.records_removed
                );
            }
        },
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_sensitivity(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("`{}` is not a number", s))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is not within 0.0-1.0", value))
    }
}

fn build_config(args: &ClusterArgs, dry_run: bool) -> PhotoclusterConfig {
    let mut config = PhotoclusterConfig::new(&args.path, args.sensitivity);
    config.min_neighbors = args.min_neighbors;
    config.dry_run = dry_run;
    if let Some(jobs) = args.jobs {
        config.concurrency = jobs;
    }
    config
}

/// Spinner while scanning, then a bar while hashing.
struct TerminalProgress {
    spinner: ProgressBar,
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::hidden();
        spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);

        let bar = ProgressBar::hidden();
        bar.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} {elapsed_precise}",
        )?);

        Ok(Self { spinner, bar })
    }
}

impl RunObserver for TerminalProgress {
    fn scan_started(&self, dir: &Path) {
        println!("▶ Scanning for images in: {}", dir.display());
        self.spinner.set_draw_target(ProgressDrawTarget::stderr());
        self.spinner.set_message("Scanning for images…");
        self.spinner.enable_steady_tick(Duration::from_millis(100));
    }

    fn scan_finished(&self, images: usize) {
        self.spinner.finish_with_message("Scan complete");
        if images == 0 {
            println!("No images found.");
            return;
        }
        println!("▶ Parallel hashing {} images…", images);
        self.bar.set_length(images as u64);
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
    }

    fn image_hashed(&self, _completed: usize) {
        self.bar.inc(1);
    }

    fn hashing_finished(&self) {
        self.bar.finish_and_clear();
    }
}

fn print_groups(assignments: &[ClusterAssignment]) {
    let summary = ClusterSummary::from_assignments(assignments);
    if summary.clusters == 0 {
        println!("No similar images found.");
        return;
    }

    println!(
        "Found {} group(s), {} unique image(s):",
        summary.clusters, summary.noise
    );
    for (id, members) in photocluster::core::cluster::groups(assignments) {
        println!(" Group {}:", id);
        for path in members {
            println!("   ▶ {}", path.display());
        }
    }
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
