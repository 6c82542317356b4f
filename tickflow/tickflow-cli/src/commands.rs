//! Command implementations for the tickflow CLI.

use crate::output::{self, OutputFormat};
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tickflow_core::{PipelineConfig, ProgressReporter};
use tickflow_pipeline::alerts::{
    AlertDispatcher, AlertTopic, BaselineProvider, DispatchPolicy, JitterBaseline,
    LastSeenBaseline, NotificationService, RiskManager, StockMonitor, TradingBot,
};
use tickflow_pipeline::{
    discover_inputs, generate_fixtures, AnalysisProcessor, ConsoleProgressBar, JsonFileLoader,
    Pipeline, TracingReporter,
};
use tracing::{info, warn};

/// Spread of the invented first-sight baseline used with `--seed`
const JITTER_SPREAD: f64 = 0.15;

type FilePipeline = Pipeline<JsonFileLoader, AnalysisProcessor>;

/// Load configuration from `path` if given, otherwise defaults plus environment.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => PipelineConfig::from_env().context("Invalid configuration in environment"),
    }
}

fn inputs(config: &PipelineConfig) -> Result<Vec<String>> {
    let inputs = discover_inputs(&config.data_dir)
        .with_context(|| format!("Failed to scan {}", config.data_dir.display()))?;
    if inputs.is_empty() {
        bail!(
            "No .json inputs in {} (try `tickflow generate` first)",
            config.data_dir.display()
        );
    }
    Ok(inputs)
}

fn progress_reporter(total: usize, format: OutputFormat) -> Arc<dyn ProgressReporter> {
    match format {
        OutputFormat::Human => Arc::new(ConsoleProgressBar::new(total)),
        OutputFormat::Json => Arc::new(TracingReporter),
    }
}

fn build_pipeline(config: &PipelineConfig, reporter: Arc<dyn ProgressReporter>) -> FilePipeline {
    let processor = AnalysisProcessor::new().with_delay(config.processing_delay());
    let pipeline = Pipeline::new(
        config.clone(),
        Arc::new(JsonFileLoader::new(&config.data_dir)),
        Arc::new(processor),
    )
    .with_reporter(reporter);

    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });

    pipeline
}

pub async fn run(config: PipelineConfig, format: OutputFormat) -> Result<()> {
    let ids = inputs(&config)?;
    let pipeline = build_pipeline(&config, progress_reporter(ids.len(), format));

    let report = pipeline
        .run_producer_consumer(ids, config.queue_capacity, config.concurrency)
        .await?;
    output::report("Producer/consumer run", &report, format)
}

pub async fn batch(config: PipelineConfig, format: OutputFormat) -> Result<()> {
    let ids = inputs(&config)?;
    let pipeline = build_pipeline(&config, progress_reporter(ids.len(), format));

    let report = pipeline
        .run_batched(ids, config.batch_size, config.concurrency)
        .await?;
    output::report("Batched run", &report, format)
}

pub async fn stream(config: PipelineConfig, format: OutputFormat) -> Result<()> {
    let ids = inputs(&config)?;
    let pipeline = build_pipeline(&config, Arc::new(TracingReporter));

    let mut results = pipeline.stream_as_completed(ids, config.concurrency)?;
    let mut loaded = Vec::new();
    while let Some(result) = results.next().await {
        match result {
            Ok(record) => {
                if format == OutputFormat::Human {
                    output::success(format!(
                        "{} ({} days)",
                        record.symbol,
                        record.daily_data.len()
                    ));
                }
                loaded.push(record.symbol);
            }
            Err(failure) => output::error(&failure),
        }
    }

    if format == OutputFormat::Json {
        output::json(&loaded)?;
    }
    Ok(())
}

pub async fn load(config: PipelineConfig, format: OutputFormat) -> Result<()> {
    let ids = inputs(&config)?;
    let total = ids.len();
    let pipeline = build_pipeline(&config, Arc::new(TracingReporter));

    let results = pipeline
        .load_all_with_progress(ids, config.concurrency, progress_reporter(total, format))
        .await?;

    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    match format {
        OutputFormat::Json => output::json(&serde_json::json!({
            "total": total,
            "loaded": total - failures.len(),
            "failures": failures.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Human => {
            output::header("Bulk load");
            output::kv("Loaded", total - failures.len());
            for failure in &failures {
                output::error(failure);
            }
        }
    }
    Ok(())
}

pub async fn analyze(config: PipelineConfig, format: OutputFormat) -> Result<()> {
    let ids = inputs(&config)?;
    let pipeline = build_pipeline(&config, progress_reporter(ids.len(), format));

    let (mut analyses, report) = pipeline.run_analysis_pipeline(ids).await?;
    analyses.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    output::analyses(&analyses, format)?;
    if format == OutputFormat::Human {
        output::report("Analysis pipeline", &report, format)?;
    }
    Ok(())
}

pub async fn monitor(config: PipelineConfig, seed: Option<u64>, format: OutputFormat) -> Result<()> {
    let ids = inputs(&config)?;
    let pipeline = build_pipeline(&config, Arc::new(TracingReporter));

    let notifications = Arc::new(NotificationService::new());
    let risk = Arc::new(RiskManager::new());
    let mut dispatcher = AlertDispatcher::new(DispatchPolicy::Isolate);
    dispatcher.subscribe(AlertTopic::Price, Arc::new(TradingBot::new("AlgoTrader-1")));
    dispatcher.subscribe(AlertTopic::Price, Arc::new(TradingBot::new("AlgoTrader-2")));
    dispatcher.subscribe(AlertTopic::Price, risk.clone());
    dispatcher.subscribe(AlertTopic::Volume, Arc::new(TradingBot::new("AlgoTrader-3")));
    dispatcher.subscribe(AlertTopic::Status, notifications.clone());

    let baseline: Arc<dyn BaselineProvider> = match seed {
        Some(seed) => Arc::new(JitterBaseline::new(seed, JITTER_SPREAD)),
        None => Arc::new(LastSeenBaseline::new()),
    };
    let monitor = StockMonitor::new(dispatcher, baseline, config.price_change_threshold_pct);

    let records = pipeline
        .stream_as_completed(ids, config.concurrency)?
        .filter_map(|result| async move {
            match result {
                Ok(record) => Some(record),
                Err(failure) => {
                    warn!(identifier = %failure.identifier, error = %failure.error, "Skipping record");
                    None
                }
            }
        });

    let summary = monitor.monitor(records).await?;

    match format {
        OutputFormat::Json => output::json(&summary)?,
        OutputFormat::Human => {
            output::header("Monitoring summary");
            output::kv("Records", summary.records);
            output::kv("Price alerts", summary.price_alerts);
            output::kv("Volume alerts", summary.volume_alerts);
            output::kv("High risk", risk.high_risk().join(", "));
            for message in notifications.messages() {
                output::info(message);
            }
        }
    }
    Ok(())
}

pub fn generate(dir: &Path, symbols: &[String], days: usize, seed: u64) -> Result<Vec<PathBuf>> {
    let written = generate_fixtures(dir, symbols, days, seed)
        .with_context(|| format!("Failed to generate fixtures in {}", dir.display()))?;
    info!(files = written.len(), "Fixtures written");
    Ok(written)
}
