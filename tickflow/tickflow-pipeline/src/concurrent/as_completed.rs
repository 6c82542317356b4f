//! Eager, limiter-gated loads yielded in completion order.
//!
//! Every load is spawned up front; the limiter still caps how many run at
//! once. The returned [`AsCompleted`] stream owns the fixed set of pending
//! loads, yields whichever finishes first, drops it from the set, and ends
//! when the set is empty. It cannot be restarted, and dropping it aborts the
//! loads still pending.

use super::limiter::ConcurrencyLimiter;
use super::producer::guarded_load;
use futures::stream::{FusedStream, FuturesUnordered, Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tickflow_core::{ItemFailure, LoadResult, PipelineError, RecordLoader};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Stream of load results in completion order.
pub struct AsCompleted {
    pending: FuturesUnordered<JoinHandle<LoadResult>>,
    names: HashMap<task::Id, String>,
    launched: usize,
}

impl AsCompleted {
    /// Spawn one gated load per identifier.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch<L>(
        loader: Arc<L>,
        identifiers: Vec<String>,
        limiter: ConcurrencyLimiter,
        load_timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self
    where
        L: RecordLoader + ?Sized + 'static,
    {
        let pending = FuturesUnordered::new();
        let mut names = HashMap::with_capacity(identifiers.len());
        let launched = identifiers.len();

        for identifier in identifiers {
            let loader = Arc::clone(&loader);
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            let name = identifier.clone();

            let handle = tokio::spawn(async move {
                let _permit = match limiter.acquire_cancellable(&cancel).await {
                    Ok(permit) => permit,
                    Err(e) => return Err(ItemFailure::new(identifier, e)),
                };

                let result = guarded_load(&*loader, &identifier, load_timeout, &cancel).await;
                result.map_err(|e| ItemFailure::new(identifier, e))
            });

            names.insert(handle.id(), name);
            pending.push(handle);
        }

        debug!(launched, "Launched as-completed loads");
        Self {
            pending,
            names,
            launched,
        }
    }

    /// Loads started at launch
    pub fn launched(&self) -> usize {
        self.launched
    }

    /// Loads not yet yielded
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Stream for AsCompleted {
    type Item = LoadResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.pending.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Ready(Some(Ok(result))) => Poll::Ready(Some(result)),
            Poll::Ready(Some(Err(join_error))) => {
                let identifier = this.names.remove(&join_error.id()).unwrap_or_default();
                error!(identifier = %identifier, error = %join_error, "As-completed load aborted");
                Poll::Ready(Some(Err(ItemFailure::new(
                    identifier,
                    PipelineError::Other(anyhow::anyhow!("load task failed: {}", join_error)),
                ))))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.pending.len();
        (remaining, Some(remaining))
    }
}

impl FusedStream for AsCompleted {
    fn is_terminated(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Drop for AsCompleted {
    fn drop(&mut self) {
        for handle in self.pending.iter() {
            handle.abort();
        }
    }
}
