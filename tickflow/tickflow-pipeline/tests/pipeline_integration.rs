//! Integration tests for the pipeline run modes.

use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tickflow_core::{FlushPolicy, PipelineConfig, ProgressEvent};
use tickflow_pipeline::concurrent::{BoundedQueue, ConcurrencyLimiter, Consumer, Producer, QueueOptions};
use tickflow_pipeline::testing::ScriptedLoader;
use tickflow_pipeline::{
    discover_inputs, generate_fixtures, AnalysisProcessor, CollectingReporter, JsonFileLoader,
    Pipeline, ProgressTracker,
};
use tokio_util::sync::CancellationToken;

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn numbered(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("T{:03}", i)).collect()
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let loader = Arc::new(ScriptedLoader::new().fail_not_found("MISSING"));
    let processor = Arc::new(AnalysisProcessor::new());
    let sink = Arc::new(CollectingReporter::new());
    let pipeline = Pipeline::new(PipelineConfig::default(), loader, Arc::clone(&processor))
        .with_reporter(sink.clone());

    let report = pipeline
        .run_producer_consumer(ids(&["AAPL", "MSFT", "MISSING", "GOOG", "AMZN"]), 5, 3)
        .await
        .unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(report.loaded, 4);
    assert_eq!(report.processed, 4);
    assert_eq!(report.load_failures.len(), 1);
    assert_eq!(report.load_failures[0].identifier, "MISSING");
    assert!(report.load_failures[0].error.is_not_found());
    assert!(!report.cancelled);
    assert_eq!(processor.analyses().len(), 4);

    let events = sink.events();
    assert!(events.windows(2).all(|w| w[0].completed <= w[1].completed));
    assert_eq!(events.iter().filter(|e| e.completed == 5).count(), 1);
    assert_eq!(events.last().unwrap().completed, 5);

    let errors = sink.error_events();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].current, "MISSING");
}

#[tokio::test(start_paused = true)]
async fn test_queue_applies_backpressure_to_producer() {
    let loader = Arc::new(ScriptedLoader::new().with_default_delay(Duration::from_millis(10)));
    let producer = Producer::new(Arc::clone(&loader), ConcurrencyLimiter::new(4).unwrap());
    let queue = Arc::new(BoundedQueue::new(QueueOptions::bounded(2)).unwrap());

    let producing = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            producer
                .produce(numbered(10), queue, Arc::new(ProgressTracker::silent(10)), CancellationToken::new())
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;

    // Two records buffered, four loaded records waiting with their permits held.
    assert_eq!(queue.len(), 2);
    assert_eq!(loader.calls(), 6);
    assert!(!producing.is_finished());

    let consumer = Consumer::new("drain", Arc::new(AnalysisProcessor::new()));
    let consumed = consumer.consume(&queue).await;
    let produced = producing.await.unwrap().unwrap();

    assert_eq!(produced.loaded, 10);
    assert_eq!(consumed.processed, 10);
    assert!(loader.peak_concurrent() <= 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_after_some_completions() {
    let loader = Arc::new(ScriptedLoader::new().with_default_delay(Duration::from_millis(20)));
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Arc::clone(&loader),
        Arc::new(AnalysisProcessor::new()),
    );

    let calls_at_cancel = Arc::new(AtomicUsize::new(usize::MAX));
    let token = pipeline.cancellation_token();
    let pipeline = pipeline.with_reporter(Arc::new({
        let loader = Arc::clone(&loader);
        let calls_at_cancel = Arc::clone(&calls_at_cancel);
        move |event: &ProgressEvent| {
            if event.completed == 3 && !token.is_cancelled() {
                calls_at_cancel.store(loader.calls(), Ordering::SeqCst);
                token.cancel();
            }
        }
    }));

    let report = tokio::time::timeout(
        Duration::from_secs(30),
        pipeline.run_producer_consumer(numbered(20), 2, 2),
    )
    .await
    .expect("run must terminate after cancellation")
    .unwrap();

    assert!(report.cancelled);
    assert!(report.loaded >= 3);
    assert!(report.skipped >= 1);
    assert_eq!(report.loaded + report.load_failures.len() + report.skipped, report.total);
    assert!(report.load_failures.iter().all(|f| f.error.is_cancelled()));

    // No load starts once cancellation has fired.
    let at_cancel = calls_at_cancel.load(Ordering::SeqCst);
    assert!(at_cancel < 20);
    assert_eq!(loader.calls(), at_cancel);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_releases_writers_blocked_on_full_queue() {
    let loader = Arc::new(ScriptedLoader::new().with_default_delay(Duration::from_millis(10)));
    let processor = AnalysisProcessor::new().with_delay(Duration::from_millis(100));
    let pipeline = Pipeline::new(PipelineConfig::default(), Arc::clone(&loader), Arc::new(processor));

    let token = pipeline.cancellation_token();
    let pipeline = pipeline.with_reporter(Arc::new(move |event: &ProgressEvent| {
        if event.completed == 3 {
            token.cancel();
        }
    }));

    let report = tokio::time::timeout(
        Duration::from_secs(30),
        pipeline.run_producer_consumer(numbered(10), 1, 2),
    )
    .await
    .expect("blocked writers must be released")
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.loaded, 3);
    // The fourth record was loaded but never found room in the queue.
    assert!(!report.load_failures.is_empty());
    assert!(report.load_failures.iter().all(|f| f.error.is_cancelled()));
    assert_eq!(report.loaded + report.load_failures.len() + report.skipped, report.total);
    assert_eq!(loader.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_load_timeout_does_not_cancel_run() {
    let loader = Arc::new(ScriptedLoader::new().with_delay("SLOW", Duration::from_secs(2)));
    let config = PipelineConfig {
        load_timeout_ms: 100,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, loader, Arc::new(AnalysisProcessor::new()));

    let report = pipeline
        .run_producer_consumer(ids(&["A", "SLOW", "B"]), 2, 3)
        .await
        .unwrap();

    assert!(!report.cancelled);
    assert!(!pipeline.is_cancelled());
    assert_eq!(report.processed, 2);
    assert!(report.load_failures[0].error.is_timeout());
}

#[tokio::test]
async fn test_batched_exceed_policy_partition() {
    let config = PipelineConfig {
        flush_policy: FlushPolicy::ExceedSize,
        ..Default::default()
    };
    let processor = Arc::new(AnalysisProcessor::new());
    let pipeline = Pipeline::new(config, Arc::new(ScriptedLoader::new()), Arc::clone(&processor));

    let report = pipeline.run_batched(numbered(25), 10, 5).await.unwrap();

    assert_eq!(report.batch_sizes, vec![11, 11, 3]);
    assert_eq!(report.processed, 25);
    assert_eq!(processor.analyses().len(), 25);
}

#[tokio::test(start_paused = true)]
async fn test_stream_yields_each_success_once_in_completion_order() {
    let loader = ScriptedLoader::new()
        .with_delay("D", Duration::from_millis(400))
        .with_delay("C", Duration::from_millis(300))
        .with_delay("B", Duration::from_millis(200))
        .with_delay("A", Duration::from_millis(100))
        .fail_decode("BAD");
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Arc::new(loader),
        Arc::new(AnalysisProcessor::new()),
    );

    let stream = pipeline
        .stream_as_completed(ids(&["D", "C", "BAD", "B", "A"]), 5)
        .unwrap();
    assert_eq!(stream.launched(), 5);

    let results: Vec<_> = stream.collect().await;
    let successes: Vec<_> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|s| s.symbol.as_str())
        .collect();

    assert_eq!(results.len(), 5);
    assert_eq!(successes, vec!["A", "B", "C", "D"]);
    // The failure resolves immediately, before any success.
    assert_eq!(results[0].as_ref().unwrap_err().identifier, "BAD");
}

#[tokio::test(start_paused = true)]
async fn test_stream_respects_concurrency() {
    let loader = Arc::new(ScriptedLoader::new().with_default_delay(Duration::from_millis(50)));
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Arc::clone(&loader),
        Arc::new(AnalysisProcessor::new()),
    );

    let count = pipeline
        .stream_as_completed(numbered(12), 3)
        .unwrap()
        .filter(|r| futures::future::ready(r.is_ok()))
        .count()
        .await;

    assert_eq!(count, 12);
    assert_eq!(loader.peak_concurrent(), 3);
}

#[tokio::test]
async fn test_analysis_pipeline_over_generated_files() {
    let dir = TempDir::new().unwrap();
    generate_fixtures(dir.path(), &ids(&["AAPL", "MSFT", "NVDA"]), 20, 11).unwrap();
    std::fs::write(dir.path().join("CORRUPT.json"), "not json").unwrap();

    let inputs = discover_inputs(dir.path()).unwrap();
    assert_eq!(inputs.len(), 4);

    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Arc::new(JsonFileLoader::new(dir.path())),
        Arc::new(AnalysisProcessor::new()),
    );
    let (analyses, report) = pipeline.run_analysis_pipeline(inputs).await.unwrap();

    assert_eq!(analyses.len(), 3);
    assert_eq!(report.processed, 3);
    assert_eq!(report.load_failures.len(), 1);
    assert!(report.load_failures[0].error.is_decode());

    let mut symbols: Vec<_> = analyses.iter().map(|a| a.symbol.clone()).collect();
    symbols.sort();
    assert_eq!(symbols, ids(&["AAPL", "MSFT", "NVDA"]));
}
