//! Ordered, synchronous alert delivery.

use super::{AlertEvent, AlertTopic};
use std::sync::Arc;
use tickflow_core::Result;
use tracing::{debug, warn};

/// Receives alert events.
///
/// Handlers run inline on the monitoring task and should return quickly.
pub trait AlertSubscriber: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, event: &AlertEvent) -> Result<()>;
}

/// What a subscriber failure does to the rest of the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Log the failure and keep delivering.
    #[default]
    Isolate,
    /// Stop at the first failure and return it.
    FailFast,
}

/// Delivers each event to the subscribers registered for its topic, in
/// registration order.
#[derive(Default)]
pub struct AlertDispatcher {
    subscribers: Vec<(AlertTopic, Arc<dyn AlertSubscriber>)>,
    policy: DispatchPolicy,
}

impl AlertDispatcher {
    pub fn new(policy: DispatchPolicy) -> Self {
        Self {
            subscribers: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub fn subscribe(&mut self, topic: AlertTopic, subscriber: Arc<dyn AlertSubscriber>) {
        debug!(subscriber = subscriber.name(), ?topic, "Subscribed");
        self.subscribers.push((topic, subscriber));
    }

    /// Subscribers registered for `topic`
    pub fn subscriber_count(&self, topic: AlertTopic) -> usize {
        self.subscribers.iter().filter(|(t, _)| *t == topic).count()
    }

    /// Deliver `event`. Returns the number of failed deliveries under
    /// [`DispatchPolicy::Isolate`].
    pub fn dispatch(&self, event: &AlertEvent) -> Result<usize> {
        let topic = event.topic();
        let mut failures = 0;

        for (_, subscriber) in self.subscribers.iter().filter(|(t, _)| *t == topic) {
            if let Err(e) = subscriber.handle(event) {
                match self.policy {
                    DispatchPolicy::FailFast => return Err(e),
                    DispatchPolicy::Isolate => {
                        warn!(subscriber = subscriber.name(), error = %e, "Alert subscriber failed");
                        failures += 1;
                    }
                }
            }
        }

        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tickflow_core::PipelineError;

    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl AlertSubscriber for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn handle(&self, _event: &AlertEvent) -> Result<()> {
            self.log.lock().push(self.name.clone());
            if self.fail {
                return Err(PipelineError::Other(anyhow::anyhow!("{} refused", self.name)));
            }
            Ok(())
        }
    }

    fn dispatcher(policy: DispatchPolicy, log: &Arc<Mutex<Vec<String>>>) -> AlertDispatcher {
        let mut dispatcher = AlertDispatcher::new(policy);
        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            dispatcher.subscribe(
                AlertTopic::Status,
                Arc::new(Recorder {
                    name: name.to_string(),
                    log: Arc::clone(log),
                    fail,
                }),
            );
        }
        dispatcher
    }

    #[test]
    fn test_isolate_continues_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failures = dispatcher(DispatchPolicy::Isolate, &log)
            .dispatch(&AlertEvent::status("hello"))
            .unwrap();

        assert_eq!(failures, 1);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_fail_fast_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = dispatcher(DispatchPolicy::FailFast, &log).dispatch(&AlertEvent::status("hello"));

        assert!(result.is_err());
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_only_matching_topic_is_delivered() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = dispatcher(DispatchPolicy::Isolate, &log);

        let event = AlertEvent::Volume(crate::alerts::StockAlert {
            symbol: "X".to_string(),
            current_price: 1.0,
            previous_price: None,
            volume: 1,
            reason: "High volume".to_string(),
            raised_at: chrono::Utc::now(),
        });
        assert_eq!(dispatcher.dispatch(&event).unwrap(), 0);
        assert!(log.lock().is_empty());
        assert_eq!(dispatcher.subscriber_count(AlertTopic::Status), 3);
    }
}
