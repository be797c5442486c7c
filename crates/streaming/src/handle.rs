//! ListenerHandle - runs a listener with an isolated queue and worker task

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::listener::{StreamEvent, StreamListener};
use crate::metrics::ListenerMetrics;

/// Handle to a running listener worker
pub struct ListenerHandle {
    name: String,
    /// Channel to send events to the worker
    tx: mpsc::Sender<StreamEvent>,
    metrics: Arc<ListenerMetrics>,
    worker_handle: JoinHandle<()>,
}

impl ListenerHandle {
    /// Spawn the worker task of a listener
    pub fn spawn<L: StreamListener + Send + 'static>(listener: L, queue_capacity: usize) -> Self {
        let name = listener.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(ListenerMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            listener_worker(listener, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<ListenerMetrics> {
        &self.metrics
    }

    /// Queue an event for the listener (non-blocking)
    ///
    /// Returns false if the queue is full (event dropped) or the worker is gone.
    pub fn try_send(&self, event: StreamEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.inc_dropped_count();
                observability::record_listener_event(&self.name, false);
                warn!(
                    listener = %self.name,
                    event = event_kind(&event),
                    "Queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(listener = %self.name, "Listener worker closed unexpectedly");
                false
            }
        }
    }

    /// Drain the queue, close the listener and wait for the worker
    #[instrument(name = "listener_handle_shutdown", skip(self), fields(listener = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(listener = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(listener = %self.name, "ListenerHandle shutdown complete");
    }
}

fn event_kind(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::Frame(_) => "frame",
        StreamEvent::Status(_) => "status",
        StreamEvent::Error(_) => "error",
    }
}

/// Worker task feeding queued events to the listener
#[instrument(
    name = "listener_worker_loop",
    skip(listener, rx, metrics),
    fields(listener = %name)
)]
async fn listener_worker<L: StreamListener>(
    mut listener: L,
    mut rx: mpsc::Receiver<StreamEvent>,
    metrics: Arc<ListenerMetrics>,
    name: String,
) {
    debug!(listener = %name, "Listener worker started");

    while let Some(event) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match listener.on_event(&event).await {
            Ok(()) => {
                metrics.inc_delivered_count();
                observability::record_listener_event(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::record_listener_event(&name, false);
                error!(
                    listener = %name,
                    event = event_kind(&event),
                    error = %e,
                    "Listener failed to handle event"
                );
                // Keep going: one bad event must not stop the listener
            }
        }
    }

    if let Err(e) = listener.close().await {
        error!(listener = %name, error = %e, "Close failed on shutdown");
    }

    debug!(listener = %name, "Listener worker stopped");
}
