//! # Streaming
//!
//! Per-stream synchronization loops.
//!
//! Responsibilities:
//! - Wait on frame source notifications and run `FrameSyncer::sync`
//! - Track the listener-facing stream status
//! - Fan out frames and status changes to listeners without letting a slow
//!   listener block the loop
//! - Open and close streams that share one buffer capacity

pub mod error;
pub mod handle;
pub mod listener;
pub mod manager;
pub mod metrics;
pub mod mock;
pub mod reader;
pub mod status;

pub use error::StreamingError;
pub use handle::ListenerHandle;
pub use listener::{ChannelListener, LocalStreamListener, StreamEvent, StreamListener};
pub use manager::StreamManager;
pub use metrics::{ListenerMetrics, MetricsSnapshot};
pub use mock::{MockFrameConfig, MockFrameSource, MockResultSource};
pub use reader::{ListenerId, SyncedStreamReader};
pub use status::SyncedStatus;
