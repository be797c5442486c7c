//! Buffered frame and the metadata attached when it leaves the buffer.

use std::sync::Arc;
use std::time::Duration;

use contracts::{Frame, ResultSet};

use crate::TrackSnapshot;

/// How a frame left the buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetadata {
    /// Evicted under shared buffer pressure instead of being paired
    pub client_buffer_full: bool,
    /// Evicted before the stream ever produced an analysis result
    pub no_analysis: bool,
    /// Result timestamp minus frame timestamp, for naturally paired frames
    pub analysis_latency: Duration,
    /// The attached result set differs from the one on the previous output
    pub has_new_results: bool,
}

/// A decoded frame waiting for, or carrying, analysis results
///
/// `zone_statuses` stays `None` until the frame is paired. Once paired the
/// frame is never put back into a buffer.
#[derive(Debug, Clone)]
pub struct BufferedFrame {
    pub frame: Frame,
    /// Capture timestamp in seconds
    pub tstamp: f64,
    pub zone_statuses: Option<Arc<ResultSet>>,
    pub tracks: Option<Arc<[TrackSnapshot]>>,
    pub metadata: FrameMetadata,
}

impl BufferedFrame {
    pub fn new(tstamp: f64, frame: Frame) -> Self {
        Self {
            frame,
            tstamp,
            zone_statuses: None,
            tracks: None,
            metadata: FrameMetadata::default(),
        }
    }

    /// Whether analysis results were attached
    pub fn is_paired(&self) -> bool {
        self.zone_statuses.is_some()
    }

    /// Tracks attached at pairing time, empty if unpaired
    pub fn tracks(&self) -> &[TrackSnapshot] {
        self.tracks.as_deref().unwrap_or(&[])
    }
}
