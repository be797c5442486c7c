//! StreamListener trait - reader output interface

use std::sync::Arc;

use contracts::ContractError;
use sync_engine::BufferedFrame;
use tokio::sync::mpsc;

use crate::SyncedStatus;

/// Event delivered to stream listeners
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A frame left the synchronizer, paired or evicted
    Frame(Arc<BufferedFrame>),
    /// The stream status changed
    Status(SyncedStatus),
    /// The loop hit an unexpected state
    Error(String),
}

impl StreamEvent {
    pub fn as_frame(&self) -> Option<&BufferedFrame> {
        match self {
            Self::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<SyncedStatus> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }
}

/// Consumer of stream events
///
/// Each listener runs on its own worker task behind a bounded queue, so a
/// slow listener only loses its own events.
#[trait_variant::make(StreamListener: Send)]
pub trait LocalStreamListener {
    /// Listener name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Handle one event
    ///
    /// # Errors
    /// Returns a listener error; the worker logs it and keeps going
    async fn on_event(&mut self, event: &StreamEvent) -> Result<(), ContractError>;

    /// Release resources after the last event
    async fn close(&mut self) -> Result<(), ContractError>;
}

/// Listener forwarding every event into an mpsc channel
pub struct ChannelListener {
    name: String,
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

impl StreamListener for ChannelListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&mut self, event: &StreamEvent) -> Result<(), ContractError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| ContractError::listener(&self.name, "receiver dropped"))
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
