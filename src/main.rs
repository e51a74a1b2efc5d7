//! geoflow CLI - run, plan and inspect the dataset pipeline

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use geoflow::{
    CompletionGate, EventLog, FixSuggestion, Pipeline, PipelineConfig, PipelineError, SkipReason,
    Stage, TaskState, TracingSink,
};

#[derive(Parser)]
#[command(name = "geoflow")]
#[command(about = "geoflow - resumable GEO dataset pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring a stage (and everything it needs) up to date
    Run {
        /// Target stage: acquire, unpack, normalize, project, clean
        #[arg(default_value = "clean")]
        stage: String,

        #[command(flatten)]
        config: ConfigArgs,

        /// Write the run's event log as JSON
        #[arg(long, value_name = "PATH")]
        events_json: Option<PathBuf>,
    },

    /// Show the execution plan without running anything
    Plan {
        #[arg(default_value = "clean")]
        stage: String,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show which stage outputs exist
    Status {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Overrides applied on top of geoflow.toml and GEOFLOW_* variables
#[derive(Args)]
struct ConfigArgs {
    /// GEO series accession (e.g. GSE68849)
    #[arg(short, long)]
    dataset: Option<String>,

    /// Config file (default: ./geoflow.toml when present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Root for relative data locations
    #[arg(short, long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Archive URL; {dataset} and {series} are expanded
    #[arg(long, value_name = "URL")]
    source_url: Option<String>,
}

impl ConfigArgs {
    fn load(&self) -> Result<PipelineConfig, PipelineError> {
        let mut config = PipelineConfig::load(self.config.as_deref())?.with_env();

        if let Some(dataset) = &self.dataset {
            config.dataset = dataset.clone();
        }
        if let Some(url) = &self.source_url {
            config.source_url = url.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = Some(dir.clone());
        }

        Ok(config)
    }

    fn pipeline(&self) -> Result<Pipeline, PipelineError> {
        Pipeline::with_url_fetcher(self.load()?)
    }
}

fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            stage,
            config,
            events_json,
        } => run_pipeline(&stage, &config, events_json),
        Commands::Plan { stage, config } => show_plan(&stage, &config),
        Commands::Status { config } => show_status(&config),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn run_pipeline(
    stage: &str,
    args: &ConfigArgs,
    events_json: Option<PathBuf>,
) -> Result<(), PipelineError> {
    let stage: Stage = stage.parse()?;
    let pipeline = args.pipeline()?;

    println!(
        "{} Dataset: {} | target: {}",
        "→".cyan(),
        pipeline.config().dataset.cyan().bold(),
        stage.to_string().cyan()
    );

    let log = EventLog::new();
    let result = pipeline.run(stage, (TracingSink, &log));

    // The log is written for failed runs too
    if let Some(path) = events_json {
        let json = serde_json::to_string_pretty(&log.to_json()).map_err(std::io::Error::from)?;
        fs::write(&path, json)?;
    }

    let report = result?;
    for outcome in &report.outcomes {
        match outcome.state {
            TaskState::Succeeded => {
                let ms = outcome.duration.map(|d| d.as_millis()).unwrap_or_default();
                println!("  {} {} ({}ms)", "✓".green(), outcome.id, ms);
            }
            TaskState::Skipped(reason) => {
                println!("  {} {} {}", "○".dimmed(), outcome.id, skip_label(reason).dimmed());
            }
            _ => {}
        }
    }
    println!(
        "{} {} executed, {} skipped in {}ms",
        "✓".green().bold(),
        report.executed().len(),
        report.skipped().len(),
        report.duration.as_millis()
    );

    Ok(())
}

fn show_plan(stage: &str, args: &ConfigArgs) -> Result<(), PipelineError> {
    let stage: Stage = stage.parse()?;
    let pipeline = args.pipeline()?;
    let plan = pipeline.plan(stage)?;

    let gate = CompletionGate;
    let demanded = plan.demanded(&gate);

    println!("{} Plan for {} ({} tasks)", "→".cyan(), stage.to_string().cyan().bold(), plan.len());
    for (i, (id, task)) in plan.iter().enumerate() {
        let action = if !demanded.contains(id) {
            skip_label(SkipReason::NotRequired).dimmed()
        } else if gate.is_complete(task.as_ref()) {
            skip_label(SkipReason::AlreadySatisfied).dimmed()
        } else {
            "run".yellow()
        };
        println!("  {}. {} {}", i + 1, id, action);
    }

    Ok(())
}

fn show_status(args: &ConfigArgs) -> Result<(), PipelineError> {
    let pipeline = args.pipeline()?;

    println!("{} Dataset: {}", "→".cyan(), pipeline.config().dataset.cyan().bold());
    for status in pipeline.status() {
        let mark = if status.complete {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("  {} {:<10} {}", mark, status.stage.to_string(), status.output);
    }

    Ok(())
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::AlreadySatisfied => "skip (already satisfied)",
        SkipReason::NotRequired => "skip (not required)",
    }
}
