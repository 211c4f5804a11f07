mod assemble;
mod classifier;
mod error;
mod files;
mod issues;
mod output;
mod parser;
mod pipeline;
mod settings;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context as _, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use classifier::LinearTextPipeline;
use issues::IssueTable;
use output::PoemWriter;
use pipeline::{Context, IssueSummary};
use settings::Settings;

#[derive(Parser)]
#[command(name = "classify", about = "Textblock classifier to poems and other text")]
struct Cli {
    /// Directory to classify (scanned recursively for *.xml)
    directory: PathBuf,
    /// Create a new CSV file, replacing the existing one
    #[arg(long)]
    newfile: bool,
    /// Settings file (optional)
    #[arg(long, default_value = settings::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn init_tracing(settings: &Settings) -> Result<()> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.log_file)
        .with_context(|| format!("failed to open log file {}", settings.log_file.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(Mutex::new(log))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to set up logging: {}", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    init_tracing(&settings)?;

    println!("Poem classifier");
    println!("===============\n");

    let t0 = Instant::now();
    let result = run(&cli, &settings);
    if let Err(e) = &result {
        error!("{:#}", e);
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    result
}

fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    info!("Loading classifier from {}", settings.model_path.display());
    let classifier = LinearTextPipeline::load(&settings.model_path)
        .with_context(|| format!("failed to load classifier {}", settings.model_path.display()))?;
    info!("Classifier loaded ({} terms)", classifier.vocabulary_size());

    let files = if cli.directory.is_dir() {
        files::find_xml_files(&cli.directory)?
    } else {
        Vec::new()
    };
    if files.is_empty() {
        warn!("No files found for {}", cli.directory.display());
        println!("No XML files found under {}", cli.directory.display());
        return Ok(());
    }
    info!("Found {} XML files", files.len());
    println!("Found {} XML files", files.len());

    let ledger = settings.ledger_path();
    if cli.newfile {
        output::create_ledger(&ledger)?;
        println!("Created {}", ledger.display());
    }

    let issues = IssueTable::load(settings)?;
    info!(
        "Loaded {} newspapers from {}",
        issues.len(),
        settings.issues_path.display()
    );

    let groups = files::group_by_issue(&files, &settings.path_marker);
    println!("Grouped into {} issues\n", groups.len());

    let writer = PoemWriter::new(&settings.output_dir, &ledger)?;
    let ctx = Context {
        classifier: &classifier,
        issues: &issues,
        writer: &writer,
        min_block_chars: settings.min_block_chars,
    };

    let pb = ProgressBar::new(groups.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut total = IssueSummary::default();
    for (issue, issue_files) in &groups {
        let summary = pipeline::process_issue(&ctx, issue_files)
            .with_context(|| format!("failed to process issue {}", issue))?;
        total += summary;
        pb.inc(1);
    }
    pb.finish_and_clear();

    print_summary(groups.len(), &total);
    Ok(())
}

fn print_summary(issues: usize, total: &IssueSummary) {
    println!(
        "Classified {} blocks from {} issues ({} files read, {} skipped).",
        total.blocks, issues, total.files_read, total.files_skipped
    );
    println!(
        "Found {} poem blocks, wrote {} poems.",
        total.poem_blocks, total.poems
    );
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{}m {}s", minutes, seconds),
        _ => format!("{}h {}m {}s", hours, minutes, seconds),
    }
}
