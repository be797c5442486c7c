//! Buffer capacity shared by every frame buffer of a process.
//!
//! One tracker is created up front and a handle is passed to each
//! [`FrameBuffer`](crate::FrameBuffer). The tracker owns:
//! - the single re-entrant lock every buffer mutation runs under
//! - a slab of per-buffer lengths (one slot per live buffer)
//! - the global maximum and the per-buffer guaranteed minimum

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use contracts::BufferConfig;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use slab::Slab;

#[derive(Debug)]
pub(crate) struct CapacityState {
    /// Length of every live buffer, keyed by registration
    lengths: Slab<usize>,
    max_buffer_size: usize,
    guaranteed_space: usize,
}

/// Handle to the shared capacity accounting
///
/// Cloning is cheap and yields a handle to the same accounting.
#[derive(Clone)]
pub struct CapacityTracker {
    inner: Arc<ReentrantMutex<RefCell<CapacityState>>>,
}

/// Guard over the shared lock; may be taken again on the same thread
pub(crate) type CapacityGuard<'a> = ReentrantMutexGuard<'a, RefCell<CapacityState>>;

impl fmt::Debug for CapacityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.lock();
        let state = guard.borrow();
        f.debug_struct("CapacityTracker")
            .field("instances", &state.lengths.len())
            .field("total_len", &state.lengths.iter().map(|(_, len)| *len).sum::<usize>())
            .field("max_buffer_size", &state.max_buffer_size)
            .field("guaranteed_space", &state.guaranteed_space)
            .finish()
    }
}

impl Default for CapacityTracker {
    fn default() -> Self {
        Self::from_config(&BufferConfig::default())
    }
}

impl CapacityTracker {
    /// Create a tracker with a global maximum and a per-buffer reservation
    pub fn new(max_buffer_size: usize, guaranteed_space: usize) -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(CapacityState {
                lengths: Slab::new(),
                max_buffer_size,
                guaranteed_space,
            }))),
        }
    }

    pub fn from_config(config: &BufferConfig) -> Self {
        Self::new(config.max_buffer_size, config.guaranteed_buffer_space)
    }

    /// Acquire the shared lock
    #[inline]
    pub(crate) fn lock(&self) -> CapacityGuard<'_> {
        self.inner.lock()
    }

    /// Register a new buffer, returning its slot key
    pub(crate) fn register(&self) -> usize {
        let guard = self.lock();
        let key = guard.borrow_mut().lengths.insert(0);
        key
    }

    /// Release the slot of a dropped buffer
    pub(crate) fn unregister(&self, key: usize) {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        if state.lengths.contains(key) {
            state.lengths.remove(key);
        }
    }

    /// Publish the current length of a buffer
    pub(crate) fn set_len(&self, key: usize, len: usize) {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        if let Some(slot) = state.lengths.get_mut(key) {
            *slot = len;
        }
    }

    /// Sum of the lengths of every live buffer
    pub fn total_len(&self) -> usize {
        let guard = self.lock();
        let total = guard.borrow().lengths.iter().map(|(_, len)| *len).sum();
        total
    }

    /// Whether the shared maximum is reached
    pub fn is_full(&self) -> bool {
        self.total_len() >= self.max_buffer_size()
    }

    pub fn max_buffer_size(&self) -> usize {
        let guard = self.lock();
        let max = guard.borrow().max_buffer_size;
        max
    }

    /// Change the shared maximum
    ///
    /// Shrinking is not retroactive: buffers above the new limit drain as
    /// frames are paired or evicted by later syncs.
    pub fn set_max_buffer_size(&self, max_buffer_size: usize) {
        let guard = self.lock();
        guard.borrow_mut().max_buffer_size = max_buffer_size;
        tracing::debug!(max_buffer_size, "shared frame buffer maximum changed");
    }

    pub fn guaranteed_space(&self) -> usize {
        let guard = self.lock();
        let space = guard.borrow().guaranteed_space;
        space
    }

    /// Number of live buffers
    pub fn instance_count(&self) -> usize {
        let guard = self.lock();
        let count = guard.borrow().lengths.len();
        count
    }
}
