//! FrameSource / ResultSource traits - external collaborator abstractions
//!
//! The video decode layer and the analysis-result receiver live outside this
//! workspace. The synchronization loop only talks to them through these traits,
//! so real decoders and mock sources are handled the same way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::{Frame, ResultSet, StreamId};

/// Connection state reported by a frame source
///
/// Marked `#[non_exhaustive]`: decoders may grow new states, and consumers
/// must route unknown ones to their error path.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Connecting / prerolling
    Initializing,
    /// Frames are flowing
    Streaming,
    /// Connection lost, the source is retrying on its own
    Halted,
    /// Connection closed for good
    Closed,
    /// Paused by the source itself
    Paused,
    /// Source exhausted (e.g. end of a file)
    Finished,
}

/// "New frame" / "status changed" notifications of a frame source
///
/// Both flags are individually settable, observable and clearable. Setting
/// either one wakes a waiter blocked in [`SourceSignals::wait_any`].
#[derive(Debug, Default)]
pub struct SourceSignals {
    new_frame: AtomicBool,
    new_status: AtomicBool,
    wakeup: Notify,
}

impl SourceSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that a new frame is available
    pub fn set_frame(&self) {
        self.new_frame.store(true, Ordering::Release);
        self.wakeup.notify_one();
    }

    /// Signal that the source status changed
    pub fn set_status(&self) {
        self.new_status.store(true, Ordering::Release);
        self.wakeup.notify_one();
    }

    pub fn is_frame_set(&self) -> bool {
        self.new_frame.load(Ordering::Acquire)
    }

    pub fn is_status_set(&self) -> bool {
        self.new_status.load(Ordering::Acquire)
    }

    /// Clear the frame flag, returning whether it was set
    pub fn clear_frame(&self) -> bool {
        self.new_frame.swap(false, Ordering::AcqRel)
    }

    /// Clear the status flag, returning whether it was set
    pub fn clear_status(&self) -> bool {
        self.new_status.swap(false, Ordering::AcqRel)
    }

    /// Logical OR of both flags
    pub fn is_any_set(&self) -> bool {
        self.is_frame_set() || self.is_status_set()
    }

    /// Wait until either flag is set or `timeout` elapses
    ///
    /// Does not clear the flags. Returns `true` if a flag is set on return.
    pub async fn wait_any(&self, timeout: Duration) -> bool {
        if self.is_any_set() {
            return true;
        }
        // A stored permit may wake us spuriously; the flags are re-checked.
        let _ = tokio::time::timeout(timeout, self.wakeup.notified()).await;
        self.is_any_set()
    }
}

/// Source of decoded, monotonically timestamped frames
pub trait FrameSource: Send + Sync {
    /// Most recent frame and its timestamp, `None` before the first frame
    fn latest_frame(&self) -> Option<(f64, Frame)>;

    /// Current connection status
    fn status(&self) -> SourceStatus;

    /// Notification flags shared with the source
    fn signals(&self) -> Arc<SourceSignals>;
}

/// Source of the most recent analysis results per stream
pub trait ResultSource: Send + Sync {
    /// Latest known results for a stream
    ///
    /// Must be cheap and non-blocking: implementations return a cached value,
    /// or an empty set if nothing was received yet.
    fn latest_results(&self, stream_id: StreamId) -> Arc<ResultSet>;
}
