//! Frame / result synchronizer.
//!
//! Frames arrive faster than analysis results and are buffered until a
//! result computed at or after their capture time shows up. Each call to
//! [`FrameSyncer::sync`] buffers one frame and releases at most one, either
//! paired with the latest result or force-evicted under buffer pressure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use contracts::{Frame, ResultSet, TrackConfig};
use tracing::instrument;
use uuid::Uuid;

use crate::{BufferedFrame, CapacityTracker, DetectionTrack, FrameBuffer, TrackSnapshot};

/// Pairs frames with analysis results for one stream
///
/// Owned by a single stream; only the [`CapacityTracker`] behind its buffer
/// is shared with other streams.
#[derive(Debug)]
pub struct FrameSyncer {
    config: TrackConfig,
    /// Unpaired frames
    buffer: FrameBuffer,
    /// Live tracks keyed by track id
    tracks: HashMap<Uuid, DetectionTrack>,
    /// Timestamp of the last result treated as new
    last_result_tstamp: f64,
    /// Result set attached to the previous output
    last_emitted_results: Option<Arc<ResultSet>>,
    /// Most recent output, returned again when nothing new was paired
    latest_output: Option<BufferedFrame>,
}

impl FrameSyncer {
    pub fn new(tracker: CapacityTracker, config: TrackConfig) -> Self {
        Self {
            config,
            buffer: FrameBuffer::new(tracker),
            tracks: HashMap::new(),
            last_result_tstamp: f64::NEG_INFINITY,
            last_emitted_results: None,
            latest_output: None,
        }
    }

    /// Buffer a frame and return the latest paired (or evicted) frame
    ///
    /// Returns the previous output unchanged when nothing could be released,
    /// and `None` until the first frame leaves the buffer.
    #[instrument(
        level = "trace",
        name = "frame_syncer_sync",
        skip(self, frame, results),
        fields(buffered = self.buffer.len())
    )]
    pub fn sync(
        &mut self,
        frame_tstamp: f64,
        frame: Frame,
        results: Arc<ResultSet>,
    ) -> Option<&BufferedFrame> {
        // Pressure is judged on what was buffered before this frame arrived
        let pressure_on_arrival = self.under_pressure();
        self.buffer.add_frame(BufferedFrame::new(frame_tstamp, frame));

        let Some(result_tstamp) = results.tstamp() else {
            if !results.is_empty() {
                tracing::warn!(
                    zones = results.len(),
                    "result set has no full-frame zone, treating it as empty"
                );
                metrics::counter!("frame_sync_results_ignored_total").increment(1);
            }
            if pressure_on_arrival {
                self.evict_without_analysis();
            }
            return self.latest_output.as_ref();
        };

        if result_tstamp != self.last_result_tstamp {
            self.catch_up();
            self.last_result_tstamp = result_tstamp;
            self.update_tracks(&results, result_tstamp);
        }

        let popped = match self.buffer.pop_if_older(self.last_result_tstamp) {
            Some(mut frame) => {
                frame.metadata.analysis_latency =
                    Duration::try_from_secs_f64(result_tstamp - frame.tstamp).unwrap_or_default();
                metrics::counter!("frame_sync_frames_total", "outcome" => "paired").increment(1);
                metrics::histogram!("frame_sync_analysis_latency_seconds")
                    .record(frame.metadata.analysis_latency.as_secs_f64());
                Some(frame)
            }
            None if pressure_on_arrival && self.under_pressure() => {
                self.buffer.pop_oldest().map(|mut frame| {
                    frame.metadata.client_buffer_full = true;
                    metrics::counter!("frame_sync_frames_total", "outcome" => "evicted")
                        .increment(1);
                    tracing::debug!(tstamp = frame.tstamp, "frame evicted under buffer pressure");
                    frame
                })
            }
            None => None,
        };

        if let Some(frame) = popped {
            self.apply_results(frame, results);
        }

        self.prune_tracks(frame_tstamp);
        self.latest_output.as_ref()
    }

    /// Shared maximum reached and this stream is above its reservation
    fn under_pressure(&self) -> bool {
        self.buffer.is_full() && !self.buffer.needs_guaranteed_space()
    }

    /// Release a frame before any analysis exists so consumers see something
    fn evict_without_analysis(&mut self) {
        if let Some(mut frame) = self.buffer.pop_oldest() {
            frame.metadata.client_buffer_full = true;
            frame.metadata.no_analysis = true;
            metrics::counter!("frame_sync_frames_total", "outcome" => "no_analysis").increment(1);
            tracing::debug!(tstamp = frame.tstamp, "frame evicted before first analysis result");
            self.latest_output = Some(frame);
        }
    }

    /// Drop frames that are older than the previous result
    ///
    /// They fell behind and can never be paired with a closer result.
    fn catch_up(&mut self) {
        let before = self.buffer.len();
        if let Some(last) = self.buffer.pop_until(self.last_result_tstamp) {
            let dropped = before - self.buffer.len();
            metrics::counter!("frame_sync_frames_dropped_total").increment(dropped as u64);
            tracing::debug!(
                dropped,
                newest_dropped = last.tstamp,
                "discarded frames behind previous result"
            );
        }
    }

    /// Append every full-frame detection to its track
    fn update_tracks(&mut self, results: &ResultSet, result_tstamp: f64) {
        let Some(full_frame) = results.full_frame() else {
            return;
        };

        for detection in &full_frame.within {
            let track_id = detection.track_id.unwrap_or_else(Uuid::new_v4);
            let config = &self.config;
            let track = self.tracks.entry(track_id).or_insert_with(|| {
                metrics::counter!("frame_sync_tracks_created_total").increment(1);
                DetectionTrack::from_config(track_id, config)
            });

            let mut detection = detection.clone();
            detection.track_id = Some(track_id);
            track.add_detection(detection, result_tstamp);
        }
    }

    /// Attach results and current track snapshots, then publish as output
    fn apply_results(&mut self, mut frame: BufferedFrame, results: Arc<ResultSet>) {
        let snapshots: Arc<[TrackSnapshot]> = self
            .tracks
            .values()
            .filter(|track| track.latest_timestamp() == self.last_result_tstamp)
            .map(DetectionTrack::copy)
            .collect();

        frame.metadata.has_new_results = match &self.last_emitted_results {
            Some(previous) => !(Arc::ptr_eq(previous, &results) || **previous == *results),
            None => true,
        };
        frame.tracks = Some(snapshots);
        frame.zone_statuses = Some(Arc::clone(&results));

        self.last_emitted_results = Some(results);
        self.latest_output = Some(frame);
    }

    /// Forget tracks with no detection for longer than the maximum age
    fn prune_tracks(&mut self, frame_tstamp: f64) {
        let max_age = self.config.max_track_age_s;
        let before = self.tracks.len();
        self.tracks.retain(|_, track| frame_tstamp - track.latest_timestamp() <= max_age);

        let pruned = before - self.tracks.len();
        if pruned > 0 {
            metrics::counter!("frame_sync_tracks_pruned_total").increment(pruned as u64);
            tracing::trace!(pruned, frame_tstamp, "pruned stale detection tracks");
        }
    }

    /// Most recent output
    pub fn latest_output(&self) -> Option<&BufferedFrame> {
        self.latest_output.as_ref()
    }

    /// Number of live tracks
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, track_id: &Uuid) -> Option<&DetectionTrack> {
        self.tracks.get(track_id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &DetectionTrack> {
        self.tracks.values()
    }

    /// Number of frames waiting for a result
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Timestamp of the last new result, `-inf` before the first one
    pub fn last_result_tstamp(&self) -> f64 {
        self.last_result_tstamp
    }
}
