//! Per-stream FIFO of unpaired frames.
//!
//! Every buffer publishes its length to a shared [`CapacityTracker`], so
//! capacity is bounded across all open streams rather than per stream:
//! - `is_full` compares the sum of all live buffers with the global maximum
//! - `needs_guaranteed_space` protects a stream's own minimum reservation
//!
//! No size check happens on insert. Callers resolve pressure lazily by
//! popping, which keeps a burst on one stream from evicting another
//! stream's reserved frames.

use std::collections::VecDeque;
use std::fmt;

use crate::{BufferedFrame, CapacityTracker};

/// FIFO of frames for one stream
pub struct FrameBuffer {
    frames: VecDeque<BufferedFrame>,
    tracker: CapacityTracker,
    /// Slot of this buffer in the tracker
    key: usize,
    out_of_order_count: u64,
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.frames.len())
            .field("key", &self.key)
            .field("out_of_order", &self.out_of_order_count)
            .finish()
    }
}

impl FrameBuffer {
    /// Create an empty buffer accounted against `tracker`
    pub fn new(tracker: CapacityTracker) -> Self {
        let key = tracker.register();
        Self {
            frames: VecDeque::new(),
            tracker,
            key,
            out_of_order_count: 0,
        }
    }

    /// Append a frame to the tail
    ///
    /// The caller guarantees non-decreasing timestamps. Violations are
    /// counted but the frame is still appended.
    pub fn add_frame(&mut self, frame: BufferedFrame) {
        debug_assert!(!frame.is_paired(), "paired frames must not be re-buffered");

        let _guard = self.tracker.lock();
        if let Some(last) = self.frames.back() {
            if frame.tstamp < last.tstamp {
                self.out_of_order_count += 1;
            }
        }
        self.frames.push_back(frame);
        self.publish_len();
    }

    /// Remove and return the head
    pub fn pop_oldest(&mut self) -> Option<BufferedFrame> {
        let _guard = self.tracker.lock();
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.publish_len();
        }
        frame
    }

    /// Remove and return the head only if it is strictly older than `tstamp`
    pub fn pop_if_older(&mut self, tstamp: f64) -> Option<BufferedFrame> {
        let is_older = self.frames.front().is_some_and(|head| head.tstamp < tstamp);
        if is_older {
            self.pop_oldest()
        } else {
            None
        }
    }

    /// Discard every frame strictly older than `tstamp`
    ///
    /// Returns the newest discarded frame, if any.
    pub fn pop_until(&mut self, tstamp: f64) -> Option<BufferedFrame> {
        // Hold the shared lock across the whole drain
        let tracker = self.tracker.clone();
        let _guard = tracker.lock();
        let mut last = None;
        while let Some(frame) = self.pop_if_older(tstamp) {
            last = Some(frame);
        }
        last
    }

    /// Whether all live buffers together reached the shared maximum
    pub fn is_full(&self) -> bool {
        self.tracker.is_full()
    }

    /// Whether this buffer is still below its guaranteed minimum
    pub fn needs_guaranteed_space(&self) -> bool {
        self.frames.len() < self.tracker.guaranteed_space()
    }

    /// Change the shared maximum for every buffer on the same tracker
    pub fn set_max_buffer_size(&self, max_buffer_size: usize) {
        self.tracker.set_max_buffer_size(max_buffer_size);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Timestamp of the head
    pub fn oldest_tstamp(&self) -> Option<f64> {
        self.frames.front().map(|f| f.tstamp)
    }

    pub fn tracker(&self) -> &CapacityTracker {
        &self.tracker
    }

    /// Frames appended with a timestamp below their predecessor
    #[inline]
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }

    fn publish_len(&self) {
        self.tracker.set_len(self.key, self.frames.len());
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.tracker.unregister(self.key);
    }
}
