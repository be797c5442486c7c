//! Detection - analysis output for a single object

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Pixel coordinate, `[x, y]` with `(0, 0)` at the top left
pub type Coord = [f64; 2];

/// A detected object
///
/// A detection can own child detections (e.g. a face inside a person) and
/// attributes (e.g. a behaviour). `track_id` is absent when the upstream
/// algorithm does not support tracking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    /// Class name (e.g. "person")
    pub class_name: String,

    /// Polygon coordinates
    pub coords: Vec<Coord>,

    /// Attribute category -> value
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Identity this detection was matched to, if any
    #[serde(default)]
    pub with_identity: Option<IdentityMatch>,

    /// Algorithm-specific key/value data
    #[serde(default)]
    pub extra_data: HashMap<String, serde_json::Value>,

    /// Track identifier assigned by the analysis backend
    #[serde(default)]
    pub track_id: Option<Uuid>,

    /// Nested detections
    #[serde(default)]
    pub children: Vec<Detection>,
}

impl Detection {
    /// Create a detection with only a class name and coordinates
    pub fn new(class_name: impl Into<String>, coords: Vec<Coord>) -> Self {
        Self {
            class_name: class_name.into(),
            coords,
            ..Default::default()
        }
    }

    /// Attach a track id
    pub fn with_track_id(mut self, track_id: Uuid) -> Self {
        self.track_id = Some(track_id);
        self
    }

    /// Axis-aligned bounding box `(min, max)` of the coordinates
    pub fn bbox(&self) -> Option<(Coord, Coord)> {
        let mut iter = self.coords.iter();
        let first = *iter.next()?;
        Some(iter.fold((first, first), |(min, max), c| {
            (
                [min[0].min(c[0]), min[1].min(c[1])],
                [max[0].max(c[0]), max[1].max(c[1])],
            )
        }))
    }
}

/// A recognizable identity (a specific person or object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Server-side identifier
    pub id: u64,

    /// Unique name
    pub unique_name: String,

    /// Display name
    pub nickname: String,

    /// User-defined metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Identity match with confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMatch {
    pub identity: Identity,

    /// Match confidence in `[0, 1]`
    pub confidence: f64,
}
