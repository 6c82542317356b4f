//! Progress tracking for concurrent loads.
//!
//! [`ProgressTracker`] owns the completed counter for one run. Incrementing
//! and reporting happen under one short lock, so every observer sees a
//! non-decreasing `completed` sequence and each request is counted once.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use tickflow_pipeline::concurrent::progress::{CollectingReporter, ProgressTracker};
//!
//! let sink = Arc::new(CollectingReporter::new());
//! let tracker = ProgressTracker::new(2, sink.clone());
//! tracker.pending("a.json");
//! tracker.completed("a.json", None);
//! tracker.completed("b.json", Some("Not found: b.json".to_string()));
//! assert_eq!(sink.events().last().unwrap().completed, 2);
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use tickflow_core::{ProgressEvent, ProgressReporter};
use tracing::{info, warn};

/// Serialises `completed` updates and fans them to a reporter.
pub struct ProgressTracker {
    total: usize,
    completed: Mutex<usize>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressTracker {
    pub fn new(total: usize, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            total,
            completed: Mutex::new(0),
            reporter,
        }
    }

    /// Tracker that discards events
    pub fn silent(total: usize) -> Self {
        Self::new(total, Arc::new(NoopReporter))
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed_count(&self) -> usize {
        *self.completed.lock()
    }

    /// Report that work on `identifier` is starting.
    pub fn pending(&self, identifier: &str) {
        let completed = self.completed.lock();
        self.reporter
            .report(&ProgressEvent::new(*completed, self.total, identifier));
    }

    /// Count `identifier` as resolved and report it. Returns the new count.
    pub fn completed(&self, identifier: &str, error: Option<String>) -> usize {
        let mut completed = self.completed.lock();
        *completed += 1;

        let mut event = ProgressEvent::new(*completed, self.total, identifier);
        if let Some(error) = error {
            event = event.with_error(error);
        }
        self.reporter.report(&event);
        *completed
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn error_events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.has_error())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl ProgressReporter for CollectingReporter {
    fn report(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Emits one structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: &ProgressEvent) {
        match &event.error {
            Some(error) => warn!(
                completed = event.completed,
                total = event.total,
                current = %event.current,
                error = %error,
                "Load failed"
            ),
            None => info!(
                completed = event.completed,
                total = event.total,
                current = %event.current,
                percent = format!("{:.1}", event.percentage()),
                "Load progress"
            ),
        }
    }
}

/// Console progress bar.
#[cfg(feature = "progress")]
pub struct ConsoleProgressBar {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "progress")]
impl ConsoleProgressBar {
    pub fn new(total: usize) -> Self {
        use indicatif::{ProgressBar, ProgressStyle};

        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% ({pos}/{len}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█░ "));
        }
        Self { bar }
    }
}

#[cfg(feature = "progress")]
impl ProgressReporter for ConsoleProgressBar {
    fn report(&self, event: &ProgressEvent) {
        let name = std::path::Path::new(&event.current)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| event.current.clone());

        self.bar.set_position(event.completed as u64);
        match &event.error {
            Some(error) => self.bar.set_message(format!("ERROR: {}", truncate(error, 30))),
            None => self.bar.set_message(format!("Loading {}", name)),
        }

        if event.is_final() {
            self.bar.finish_with_message("All files processed");
        }
    }
}

#[cfg(feature = "progress")]
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_does_not_count() {
        let sink = Arc::new(CollectingReporter::new());
        let tracker = ProgressTracker::new(3, sink.clone());

        tracker.pending("a.json");
        tracker.pending("b.json");
        assert_eq!(tracker.completed_count(), 0);
        assert_eq!(sink.len(), 2);
        assert!(sink.events().iter().all(|e| e.completed == 0 && e.total == 3));
    }

    #[test]
    fn test_completed_counts_once_each() {
        let sink = Arc::new(CollectingReporter::new());
        let tracker = ProgressTracker::new(2, sink.clone());

        assert_eq!(tracker.completed("a.json", None), 1);
        assert_eq!(tracker.completed("b.json", Some("boom".to_string())), 2);

        let errors = sink.error_events();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].current, "b.json");
        assert!(sink.events().last().unwrap().is_final());
    }

    #[test]
    fn test_closure_reporter() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |e: &ProgressEvent| seen.lock().push(e.completed)
        };
        let tracker = ProgressTracker::new(2, Arc::new(sink));

        tracker.completed("a", None);
        tracker.completed("b", None);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_updates_are_monotonic() {
        let sink = Arc::new(CollectingReporter::new());
        let tracker = Arc::new(ProgressTracker::new(400, sink.clone()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("{}-{}", t, i);
                        tracker.pending(&id);
                        tracker.completed(&id, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = sink.events();
        assert!(events.windows(2).all(|w| w[0].completed <= w[1].completed));
        assert_eq!(tracker.completed_count(), 400);
        assert_eq!(events.iter().filter(|e| e.completed == 400).count(), 1);
    }
}
