//! Detection tracks: per-object history across analysis results.
//!
//! The synchronizer owns the live [`DetectionTrack`]s. Consumers only ever
//! see a [`TrackSnapshot`], frozen when a frame is paired, so later
//! updates never show up in a frame that is already being rendered.

use std::collections::VecDeque;
use std::sync::Arc;

use contracts::{Detection, TrackConfig};
use nalgebra::Vector2;
use uuid::Uuid;

/// One detection of a track and the result timestamp it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSample {
    pub detection: Detection,
    pub tstamp: f64,
}

/// Mutable history of one tracked object
#[derive(Debug, Clone)]
pub struct DetectionTrack {
    track_id: Uuid,
    samples: VecDeque<TrackSample>,
    max_history: usize,
    /// Trail length handed to snapshots
    trail_age: f64,
}

impl DetectionTrack {
    pub fn new(track_id: Uuid) -> Self {
        Self::from_config(track_id, &TrackConfig::default())
    }

    /// Create a track with the history limit and trail age of `config`
    pub fn from_config(track_id: Uuid, config: &TrackConfig) -> Self {
        Self {
            track_id,
            samples: VecDeque::new(),
            max_history: config.max_history.max(1),
            trail_age: config.trail_age_s.max(0.0),
        }
    }

    /// Create a track keeping at most `max_history` samples
    pub fn with_max_history(track_id: Uuid, max_history: usize) -> Self {
        let config = TrackConfig {
            max_history,
            ..TrackConfig::default()
        };
        Self::from_config(track_id, &config)
    }

    /// Append a sample, pruning the oldest one past the history limit
    ///
    /// Timestamps must be non-decreasing; this is not re-checked.
    pub fn add_detection(&mut self, detection: Detection, tstamp: f64) {
        if self.samples.len() == self.max_history {
            self.samples.pop_front();
        }
        self.samples.push_back(TrackSample { detection, tstamp });
    }

    /// Timestamp of the newest sample, `-inf` if empty
    pub fn latest_timestamp(&self) -> f64 {
        self.samples.back().map_or(f64::NEG_INFINITY, |s| s.tstamp)
    }

    /// Detection state at `tstamp`, see [`TrackSnapshot::get_interpolated_detection`]
    pub fn get_interpolated_detection(&self, tstamp: f64) -> Option<Detection> {
        let samples = &self.samples;
        let upper = samples.partition_point(|s| s.tstamp < tstamp);
        interpolate(samples.len(), move |i| &samples[i], upper, tstamp)
    }

    /// Frozen copy unaffected by later `add_detection` calls
    pub fn copy(&self) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.track_id,
            samples: self.samples.iter().cloned().collect(),
            trail_age: self.trail_age,
        }
    }

    /// Alias of [`copy`](Self::copy)
    pub fn freeze(&self) -> TrackSnapshot {
        self.copy()
    }

    pub fn track_id(&self) -> Uuid {
        self.track_id
    }

    pub fn trail_age(&self) -> f64 {
        self.trail_age
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Immutable, cheaply clonable view of a track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    track_id: Uuid,
    samples: Arc<[TrackSample]>,
    trail_age: f64,
}

impl TrackSnapshot {
    pub fn track_id(&self) -> Uuid {
        self.track_id
    }

    /// Samples oldest first
    pub fn samples(&self) -> &[TrackSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of the newest sample, `-inf` if empty
    pub fn latest_timestamp(&self) -> f64 {
        self.samples.last().map_or(f64::NEG_INFINITY, |s| s.tstamp)
    }

    pub fn latest_detection(&self) -> Option<&Detection> {
        self.samples.last().map(|s| &s.detection)
    }

    /// Class of the newest detection
    pub fn class_name(&self) -> Option<&str> {
        self.latest_detection().map(|d| d.class_name.as_str())
    }

    /// Detection state at `tstamp`
    ///
    /// - an exact sample match is returned as is
    /// - between two samples, coordinates are interpolated linearly and the
    ///   remaining fields come from the nearer sample
    /// - outside the sampled range the nearest end is returned
    ///
    /// `None` if the track is empty.
    pub fn get_interpolated_detection(&self, tstamp: f64) -> Option<Detection> {
        let samples = &self.samples;
        let upper = samples.partition_point(|s| s.tstamp < tstamp);
        interpolate(samples.len(), move |i| &samples[i], upper, tstamp)
    }

    /// Samples no older than `latest - max_age`, newest first
    pub fn trail(&self, max_age: f64) -> impl Iterator<Item = &TrackSample> {
        let cutoff = self.latest_timestamp() - max_age;
        self.samples.iter().rev().take_while(move |s| s.tstamp >= cutoff)
    }

    /// Configured trail age in seconds
    pub fn trail_age(&self) -> f64 {
        self.trail_age
    }

    /// [`trail`](Self::trail) limited to the configured trail age
    pub fn recent_trail(&self) -> impl Iterator<Item = &TrackSample> {
        self.trail(self.trail_age)
    }
}

/// `upper` is the index of the first sample with `tstamp >= query`
fn interpolate<'a>(
    len: usize,
    at: impl Fn(usize) -> &'a TrackSample,
    upper: usize,
    query: f64,
) -> Option<Detection> {
    if len == 0 {
        return None;
    }
    if upper == 0 {
        return Some(at(0).detection.clone());
    }
    if upper == len {
        return Some(at(len - 1).detection.clone());
    }

    let after = at(upper);
    if after.tstamp == query {
        return Some(after.detection.clone());
    }
    let before = at(upper - 1);

    let span = after.tstamp - before.tstamp;
    let fraction = if span > 0.0 {
        (query - before.tstamp) / span
    } else {
        0.0
    };
    let nearer = if fraction < 0.5 { before } else { after };

    let mut detection = nearer.detection.clone();
    if before.detection.coords.len() == after.detection.coords.len() {
        detection.coords = before
            .detection
            .coords
            .iter()
            .zip(&after.detection.coords)
            .map(|(a, b)| {
                let point = Vector2::new(a[0], a[1]).lerp(&Vector2::new(b[0], b[1]), fraction);
                [point.x, point.y]
            })
            .collect();
    }
    Some(detection)
}
