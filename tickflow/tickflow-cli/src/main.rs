//! Tickflow CLI - concurrency-controlled bulk loading of price histories.
//!
//! # Usage
//!
//! ```bash
//! # Write sample inputs
//! tickflow generate --symbols AAPL,MSFT,GOOG --days 365
//!
//! # Producer/consumer run with 3 consumers
//! tickflow run --consumers 3
//!
//! # Batches of 10, flushed once they exceed the size
//! tickflow batch --batch-size 10 --flush-policy exceed-size
//!
//! # Print records as they finish loading
//! tickflow stream --concurrency 8
//!
//! # Raise price and volume alerts
//! tickflow monitor --seed 42
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use tickflow_cli::{commands, output, OutputFormat};
use tickflow_core::{FlushPolicy, PipelineConfig, PipelineError};

#[derive(Parser)]
#[command(name = "tickflow")]
#[command(about = "Tickflow - concurrency-controlled bulk loading pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (human, json)
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,

    /// Directory holding the *.json inputs
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Maximum simultaneous loads
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FlushPolicyArg {
    AtSize,
    ExceedSize,
}

impl From<FlushPolicyArg> for FlushPolicy {
    fn from(arg: FlushPolicyArg) -> Self {
        match arg {
            FlushPolicyArg::AtSize => FlushPolicy::AtSize,
            FlushPolicyArg::ExceedSize => FlushPolicy::ExceedSize,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load through a bounded queue drained by consumers
    Run {
        /// Queue capacity
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// Number of consumers
        #[arg(long)]
        consumers: Option<usize>,
    },

    /// Load and process in batches
    Batch {
        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// When a batch is flushed
        #[arg(long)]
        flush_policy: Option<FlushPolicyArg>,
    },

    /// Print records in completion order
    Stream,

    /// Load everything with a progress bar
    Load,

    /// Run the two-stage load/analysis pipeline
    Analyze,

    /// Raise price and volume alerts over the inputs
    Monitor {
        /// Seed for invented first-sight baselines; without it the first
        /// sighting of a symbol raises no price alert
        #[arg(long)]
        seed: Option<u64>,

        /// Price change (percent) that raises an alert
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Write synthetic input files
    Generate {
        /// Comma-separated symbols
        #[arg(long, value_delimiter = ',', default_value = "AAPL,MSFT,GOOGL,AMZN,TSLA")]
        symbols: Vec<String>,

        /// Trading days per file
        #[arg(long, default_value_t = 365)]
        days: usize,

        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{:#}", e));
        let code = match e.downcast_ref::<PipelineError>() {
            Some(PipelineError::Config(_)) => 2,
            _ => 1,
        };
        process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let format = OutputFormat::from(cli.format);
    let mut config = commands::load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }

    match cli.command {
        Commands::Run {
            queue_capacity,
            consumers,
        } => {
            if let Some(capacity) = queue_capacity {
                config.queue_capacity = capacity;
            }
            if let Some(consumers) = consumers {
                config.consumers = consumers;
            }
            commands::run(validated(config)?, format).await?;
        }

        Commands::Batch {
            batch_size,
            flush_policy,
        } => {
            if let Some(size) = batch_size {
                config.batch_size = size;
            }
            if let Some(policy) = flush_policy {
                config.flush_policy = policy.into();
            }
            commands::batch(validated(config)?, format).await?;
        }

        Commands::Stream => commands::stream(validated(config)?, format).await?,

        Commands::Load => commands::load(validated(config)?, format).await?,

        Commands::Analyze => commands::analyze(validated(config)?, format).await?,

        Commands::Monitor { seed, threshold } => {
            if let Some(threshold) = threshold {
                config.price_change_threshold_pct = threshold;
            }
            commands::monitor(validated(config)?, seed, format).await?;
        }

        Commands::Generate { symbols, days, seed } => {
            let written = commands::generate(&config.data_dir, &symbols, days, seed)?;
            output::success(format!(
                "Wrote {} files to {}",
                written.len(),
                config.data_dir.display()
            ));
        }
    }

    Ok(())
}

fn validated(config: PipelineConfig) -> Result<PipelineConfig> {
    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("tickflow=debug,tickflow_core=debug,tickflow_pipeline=debug,tickflow_cli=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("tickflow=info,tickflow_pipeline=info,tickflow_cli=info,warn")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
