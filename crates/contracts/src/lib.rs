//! # Contracts
//!
//! Frozen interface contracts shared by the synchronization crates.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Frames and analysis results each carry their own `f64` timestamp (seconds)
//! - Timestamps are monotonic per stream but not required to be wall-clock
//! - The timestamp of a [`ResultSet`] is the one of its full-frame zone

mod config;
mod detection;
mod error;
mod frame;
mod source;
mod stream_id;
mod zone;

pub use config::*;
pub use detection::*;
pub use error::*;
pub use frame::*;
pub use source::{FrameSource, ResultSource, SourceSignals, SourceStatus};
pub use stream_id::StreamId;
pub use zone::*;
