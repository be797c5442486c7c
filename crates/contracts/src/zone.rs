//! ResultSet - ResultSource output
//!
//! Per-zone analysis results for one stream at one instant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Coord, Detection, StreamId};

/// Name of the zone covering the entire frame
pub const FULL_FRAME_ZONE_NAME: &str = "Screen";

/// Zone definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone name, unique per stream
    pub name: String,

    /// Owning stream
    pub stream_id: StreamId,

    /// Server-side identifier
    #[serde(default)]
    pub id: Option<u64>,

    /// Region covered by the zone
    pub geometry: ZoneGeometry,
}

impl Zone {
    /// The distinguished full-frame zone of a stream
    pub fn full_frame(stream_id: StreamId) -> Self {
        Self {
            name: FULL_FRAME_ZONE_NAME.to_string(),
            stream_id,
            id: None,
            geometry: ZoneGeometry::FullFrame,
        }
    }

    pub fn is_full_frame(&self) -> bool {
        self.name == FULL_FRAME_ZONE_NAME
    }
}

/// Zone region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "coords", rename_all = "snake_case")]
pub enum ZoneGeometry {
    /// The whole image
    FullFrame,
    /// Non-convex polygon
    Polygon(Vec<Coord>),
    /// Line region (for crossing counts)
    Line(Vec<Coord>),
}

/// Status of everything going on inside a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    /// Zone definition
    pub zone: Zone,

    /// Result timestamp (equal across every zone of one ResultSet)
    pub tstamp: f64,

    /// Objects that ever entered, per class name
    #[serde(default)]
    pub total_entered: HashMap<String, u64>,

    /// Objects that ever exited, per class name
    #[serde(default)]
    pub total_exited: HashMap<String, u64>,

    /// Detections currently inside the zone
    #[serde(default)]
    pub within: Vec<Detection>,

    /// Detections entering the zone
    #[serde(default)]
    pub entering: Vec<Detection>,

    /// Detections exiting the zone
    #[serde(default)]
    pub exiting: Vec<Detection>,
}

impl ZoneStatus {
    /// Empty status for a zone
    pub fn new(zone: Zone, tstamp: f64) -> Self {
        Self {
            zone,
            tstamp,
            total_entered: HashMap::new(),
            total_exited: HashMap::new(),
            within: Vec::new(),
            entering: Vec::new(),
            exiting: Vec::new(),
        }
    }

    /// Current count of each class detected within the zone
    pub fn within_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for det in &self.within {
            *counts.entry(det.class_name.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// One analysis engine output: zone name -> status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    statuses: HashMap<String, ZoneStatus>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the status of a zone
    pub fn insert(&mut self, status: ZoneStatus) {
        self.statuses.insert(status.zone.name.clone(), status);
    }

    /// Builder-style insert
    pub fn with_status(mut self, status: ZoneStatus) -> Self {
        self.insert(status);
        self
    }

    pub fn get(&self, zone_name: &str) -> Option<&ZoneStatus> {
        self.statuses.get(zone_name)
    }

    /// Status of the full-frame zone
    pub fn full_frame(&self) -> Option<&ZoneStatus> {
        self.get(FULL_FRAME_ZONE_NAME)
    }

    /// Shared timestamp of this result set
    ///
    /// Only the full-frame zone is trusted; other zones are not cross-checked.
    pub fn tstamp(&self) -> Option<f64> {
        self.full_frame().map(|status| status.tstamp)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn zones(&self) -> impl Iterator<Item = (&str, &ZoneStatus)> {
        self.statuses.iter().map(|(name, status)| (name.as_str(), status))
    }
}

impl FromIterator<ZoneStatus> for ResultSet {
    fn from_iter<I: IntoIterator<Item = ZoneStatus>>(iter: I) -> Self {
        let mut set = ResultSet::new();
        for status in iter {
            set.insert(status);
        }
        set
    }
}
