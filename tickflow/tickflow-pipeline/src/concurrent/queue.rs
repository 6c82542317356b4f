//! Fixed-capacity FIFO channel between pipeline stages.
//!
//! A full queue suspends writers until a slot frees (backpressure: never drop,
//! never grow). An empty queue suspends readers until an item arrives or the
//! queue is completed and drained, after which `dequeue` returns `Ok(None)`.
//! Completion is one-shot; completing twice or enqueueing afterwards is a
//! [`PipelineError::QueueFault`].
//!
//! Every queue is bound to a cancellation token. Cancelling it resolves all
//! suspended `enqueue`/`dequeue` calls with [`PipelineError::Cancelled`].
//!
//! ```text
//! producers ──enqueue──▶ [ C slots ] ──dequeue──▶ consumers
//!                 ▲                       │
//!                 └──── waits when full   └── Ok(None) after complete + drain
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tickflow_core::{PipelineError, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Construction options for a [`BoundedQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub capacity: usize,
    /// Only one task may enqueue at a time
    pub single_producer: bool,
    /// Only one task may dequeue at a time
    pub single_consumer: bool,
}

impl QueueOptions {
    /// Multi-producer, multi-consumer queue of the given capacity
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity,
            single_producer: false,
            single_consumer: false,
        }
    }

    pub fn single_producer(mut self, single: bool) -> Self {
        self.single_producer = single;
        self
    }

    pub fn single_consumer(mut self, single: bool) -> Self {
        self.single_consumer = single;
        self
    }
}

/// Bounded multi-producer/multi-consumer queue with explicit completion.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    options: QueueOptions,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<T>>,
    len: AtomicUsize,
    completed: AtomicBool,
    producers: AtomicUsize,
    consumers: AtomicUsize,
    cancel: CancellationToken,
}

impl<T: Send> BoundedQueue<T> {
    /// Create a queue with its own cancellation token.
    pub fn new(options: QueueOptions) -> Result<Self> {
        Self::with_cancellation(options, CancellationToken::new())
    }

    /// Create a queue whose waiters are released when `cancel` fires.
    pub fn with_cancellation(options: QueueOptions, cancel: CancellationToken) -> Result<Self> {
        if options.capacity == 0 {
            return Err(PipelineError::invalid_input("queue capacity must be at least 1"));
        }

        let (tx, rx) = mpsc::channel(options.capacity);
        Ok(Self {
            options,
            sender: Mutex::new(Some(tx)),
            receiver: tokio::sync::Mutex::new(rx),
            len: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
            producers: AtomicUsize::new(0),
            consumers: AtomicUsize::new(0),
            cancel,
        })
    }

    /// Append an item, waiting while the queue is full.
    pub async fn enqueue(&self, item: T) -> Result<()> {
        let _guard = RoleGuard::enter(&self.producers, self.options.single_producer, "producer")?;

        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| PipelineError::queue_fault("enqueue after completion"))?;

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
            permit = sender.reserve() => permit
                .map_err(|_| PipelineError::queue_fault("queue receiver dropped"))?,
        };

        // Counted before the item becomes visible so readers never underflow.
        self.len.fetch_add(1, Ordering::SeqCst);
        permit.send(item);
        Ok(())
    }

    /// Take the oldest item, waiting while the queue is empty.
    ///
    /// Returns `Ok(None)` once the queue is completed and drained.
    pub async fn dequeue(&self) -> Result<Option<T>> {
        let _guard = RoleGuard::enter(&self.consumers, self.options.single_consumer, "consumer")?;

        let item = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
            item = async { self.receiver.lock().await.recv().await } => item,
        };

        if item.is_some() {
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(item)
    }

    /// Signal that no more items will be written.
    pub fn complete(&self) -> Result<()> {
        let previous = self.sender.lock().take();
        if previous.is_none() {
            return Err(PipelineError::queue_fault("queue already completed"));
        }

        self.completed.store(true, Ordering::SeqCst);
        debug!(pending = self.len(), "Queue marked complete");
        Ok(())
    }

    /// Release every waiter with `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> BoundedQueue<T> {
    pub fn capacity(&self) -> usize {
        self.options.capacity
    }

    pub fn options(&self) -> QueueOptions {
        self.options
    }

    /// Items currently buffered
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Completed and fully drained
    pub fn is_closed(&self) -> bool {
        self.is_completed() && self.is_empty()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Tracks concurrent callers of one side of the queue.
struct RoleGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> RoleGuard<'a> {
    fn enter(active: &'a AtomicUsize, single: bool, role: &str) -> Result<Self> {
        let previous = active.fetch_add(1, Ordering::SeqCst);
        let guard = Self { active };
        if single && previous > 0 {
            return Err(PipelineError::queue_fault(format!(
                "concurrent {} on a single-{} queue",
                role, role
            )));
        }
        Ok(guard)
    }
}

impl Drop for RoleGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
