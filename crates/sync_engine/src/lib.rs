//! # Sync Engine
//!
//! Frame / analysis-result synchronization engine.
//!
//! Responsibilities:
//! - Buffer unpaired frames under a capacity shared by every open stream
//! - Pair each frame with the analysis result computed closest to it
//! - Aggregate detections into tracks, interpolate and age them
//! - Output `BufferedFrame`s in frame-timestamp order
//!
//! ## Usage Example
//!
//! ```ignore
//! use sync_engine::{CapacityTracker, FrameSyncer};
//!
//! let tracker = CapacityTracker::default();
//! let mut syncer = FrameSyncer::new(tracker.clone(), Default::default());
//!
//! // Once per incoming frame
//! if let Some(output) = syncer.sync(tstamp, frame, result_source.latest_results(stream_id)) {
//!     // Hand the paired frame to listeners
//! }
//! ```

mod buffer;
mod capacity;
mod engine;
mod frame;
mod track;

pub use buffer::FrameBuffer;
pub use capacity::CapacityTracker;
pub use engine::FrameSyncer;
pub use frame::{BufferedFrame, FrameMetadata};
pub use track::{DetectionTrack, TrackSample, TrackSnapshot};

// Re-export contracts types
pub use contracts::{BufferConfig, Detection, Frame, ResultSet, TrackConfig};
