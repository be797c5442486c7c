//! Streaming error types

use contracts::StreamId;
use thiserror::Error;

/// Errors raised by a synchronization loop
#[derive(Debug, Error)]
pub enum StreamingError {
    /// Frame source reported a status this loop does not know
    #[error("stream {stream_id} reported an unknown status: {status}")]
    UnknownStatus { stream_id: StreamId, status: String },
}

impl StreamingError {
    /// Create an unknown status error
    pub fn unknown_status(stream_id: StreamId, status: impl Into<String>) -> Self {
        Self::UnknownStatus {
            stream_id,
            status: status.into(),
        }
    }
}
