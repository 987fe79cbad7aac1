use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridcast::config::Config;
use gridcast::scheduler::{OverrideRequest, ScheduleDay, ScheduleDayCompiler, SchedulingService};
use gridcast::storage::{ChannelStore, MemoryLibrary, ScheduleDayStore};

#[derive(Parser)]
#[command(
    name = "gridcast",
    version,
    about = "Compile layered channel programming plans into frozen broadcast schedule days",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Library JSON (overrides the configured path)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Directory of frozen schedule days (overrides the configured path)
    #[arg(long, global = true)]
    schedule_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Print Prometheus metrics on exit
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and freeze a schedule day
    Compile {
        /// Channel identifier
        #[arg(short, long)]
        channel: String,

        /// Broadcast date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Replace an existing frozen day
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Compile without freezing or writing rotation history
    Preview {
        /// Channel identifier
        #[arg(short, long)]
        channel: String,

        /// Broadcast date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Print the full day as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Apply a manual override batch (JSON request file)
    Override {
        /// Override request file
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Validate a schedule plan
    Validate {
        /// Plan identifier
        #[arg(short, long)]
        plan: String,
    },

    /// Compile consecutive days ahead for one or more channels
    Horizon {
        /// Channels to compile (all channels when omitted)
        #[arg(short, long)]
        channel: Vec<String>,

        /// First broadcast date (YYYY-MM-DD)
        #[arg(short, long)]
        start: NaiveDate,

        /// Number of days (configured horizon when omitted)
        #[arg(long)]
        days: Option<u32>,

        /// Replace existing frozen days
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Show the summary of a frozen day
    Summary {
        /// Channel identifier
        #[arg(short, long)]
        channel: String,

        /// Broadcast date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(ref path) = cli.library {
        config.storage.library_path = path.clone();
    }
    if let Some(ref dir) = cli.schedule_dir {
        config.storage.schedule_dir = dir.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.logging.format = format.clone();
    }
    config.validate().context("Invalid configuration")?;

    // Initialize tracing/logging
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    if cli.metrics {
        if let Err(e) = gridcast::metrics::init_metrics() {
            tracing::warn!(error = %e, "Metrics initialization failed");
        }
    }

    let library = Arc::new(
        MemoryLibrary::load_from_file(&config.storage.library_path)
            .await
            .with_context(|| format!("Failed to load library {}", config.storage.library_path.display()))?,
    );
    let days = Arc::new(ScheduleDayStore::with_dir(config.storage.schedule_dir.clone()));
    let loaded = days.load().await?;
    tracing::debug!(days = loaded, "Loaded frozen schedule days");

    let mut service = SchedulingService::from_library(library.clone(), days)
        .with_compiler(ScheduleDayCompiler::new().with_max_slots(config.compiler.max_slots_per_day))
        .with_parallel_channels(config.compiler.parallel_channels);
    if let Some(deadline) = config.deadline() {
        service = service.with_deadline(deadline);
    }

    match cli.command {
        Commands::Compile {
            channel,
            date,
            force,
        } => {
            tracing::info!(channel = %channel, date = %date, force = %force, "Starting compile command");
            let day = service.compile(&channel, date, force).await?;
            print_day(&day);
            save_library(&library, &config).await?;
        }

        Commands::Preview {
            channel,
            date,
            json,
        } => {
            tracing::info!(channel = %channel, date = %date, "Starting preview command");
            let day = service.preview(&channel, date).await?;
            if json {
                println!("{}", day.to_json()?);
            } else {
                print_day(&day);
            }
        }

        Commands::Override { request } => {
            let content = tokio::fs::read_to_string(&request)
                .await
                .with_context(|| format!("Failed to read override request {}", request.display()))?;
            let request: OverrideRequest =
                serde_json::from_str(&content).context("Failed to parse override request")?;
            tracing::info!(day_id = %request.day_id, ops = request.ops.len(), "Starting override command");
            let day = service.override_day(&request).await?;
            print_day(&day);
        }

        Commands::Validate { plan } => {
            let issues = service.validate_plan(&plan)?;
            if issues.is_empty() {
                println!("Plan '{plan}' is valid");
            }
            for issue in &issues {
                println!("{issue}");
            }
            let errors = issues.iter().filter(|i| i.is_error()).count();
            if errors > 0 {
                anyhow::bail!("plan '{}' has {} error(s)", plan, errors);
            }
        }

        Commands::Horizon {
            channel,
            start,
            days,
            force,
        } => {
            let channels = if channel.is_empty() {
                library.channel_ids()?
            } else {
                channel
            };
            let days = days.unwrap_or(config.compiler.horizon_days);
            tracing::info!(channels = channels.len(), start = %start, days = days, "Starting horizon command");

            let entries = service.compile_horizon(&channels, start, days, force).await;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            save_library(&library, &config).await?;
        }

        Commands::Summary { channel, date } => {
            let day = service.schedule_day(&channel, date).await?;
            print!("{}", day.summary().display());
        }
    }

    if cli.metrics {
        match gridcast::metrics::encode_metrics() {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("gridcast=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("gridcast={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn save_library(library: &MemoryLibrary, config: &Config) -> Result<()> {
    library
        .save_to_file(&config.storage.library_path)
        .await
        .with_context(|| format!("Failed to save library {}", config.storage.library_path.display()))
}

fn print_day(day: &ScheduleDay) {
    print!("{}", day.summary().display());
    println!();
    for slot in &day.slots {
        let marker = if slot.carried_in {
            " (carried in)"
        } else if slot.is_manual_override {
            " (override)"
        } else {
            ""
        };
        println!(
            "  {} - {}  {:<24} zone={}{}",
            slot.start_utc.format("%Y-%m-%d %H:%M"),
            slot.end_utc.format("%H:%M"),
            slot.asset_ref,
            slot.zone_id.as_deref().unwrap_or("-"),
            marker
        );
    }
    for avail in &day.avails {
        println!(
            "  {} - {}  [avail: {}] {} min",
            avail.start_utc.format("%Y-%m-%d %H:%M"),
            avail.end_utc.format("%H:%M"),
            avail.reason.id(),
            avail.minutes()
        );
    }
    for diagnostic in &day.diagnostics {
        println!("  {:?} {:?}: {}", diagnostic.severity, diagnostic.code, diagnostic.message);
    }
}
