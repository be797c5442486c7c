//! Listener-facing stream status

use std::fmt;

use contracts::{SourceStatus, StreamId};

use crate::error::StreamingError;

/// Status published to stream listeners
///
/// Mirrors the frame source states. `Paused` and `Finished` also come from
/// the reader itself: a user pause, and a user close or exhausted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncedStatus {
    Initializing,
    Streaming,
    /// Source lost its connection and is retrying
    Halted,
    /// Terminal
    Closed,
    Paused,
    Finished,
}

impl SyncedStatus {
    /// Map a frame source status
    ///
    /// Statuses added to the source contract later are reported as
    /// [`StreamingError::UnknownStatus`] instead of being guessed.
    pub fn from_source(stream_id: StreamId, status: SourceStatus) -> Result<Self, StreamingError> {
        match status {
            SourceStatus::Initializing => Ok(Self::Initializing),
            SourceStatus::Streaming => Ok(Self::Streaming),
            SourceStatus::Halted => Ok(Self::Halted),
            SourceStatus::Closed => Ok(Self::Closed),
            SourceStatus::Paused => Ok(Self::Paused),
            SourceStatus::Finished => Ok(Self::Finished),
            other => Err(StreamingError::unknown_status(stream_id, format!("{other:?}"))),
        }
    }

    /// No further status follows, except `Closed` after `Finished`
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Finished)
    }

    /// Whether `next` is an expected successor of this status
    pub fn can_transition_to(self, next: SyncedStatus) -> bool {
        use SyncedStatus::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Finished, _) => false,
            (_, Finished) => true,
            (Initializing, Streaming | Halted | Paused) => true,
            (Streaming, Halted | Paused) => true,
            (Halted, Streaming | Paused) => true,
            (Paused, Streaming) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Streaming => "streaming",
            Self::Halted => "halted",
            Self::Closed => "closed",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for SyncedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
