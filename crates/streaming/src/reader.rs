//! SyncedStreamReader - per-stream synchronization loop
//!
//! One tokio task per stream waits for the frame source to signal a new
//! frame or a status change, runs at most one `sync()` per wake and fans
//! the output out to listeners.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{FrameSource, ResultSource, StreamId, SyncEngineConfig};
use observability::{MetricsSummary, SyncMetricsAggregator};
use parking_lot::{Mutex, MutexGuard};
use slab::Slab;
use sync_engine::{BufferedFrame, CapacityTracker, FrameSyncer};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, instrument, warn};

use crate::handle::ListenerHandle;
use crate::listener::{ChannelListener, StreamEvent, StreamListener};
use crate::metrics::MetricsSnapshot;
use crate::SyncedStatus;

/// Key of a subscribed listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// State shared between the reader handle and its loop task
struct ReaderShared {
    stream_id: StreamId,
    source: Arc<dyn FrameSource>,
    status: Mutex<SyncedStatus>,
    latest: Mutex<Option<Arc<BufferedFrame>>>,
    listeners: Mutex<Slab<ListenerHandle>>,
    /// Set under the listeners lock once the loop drained them
    listeners_closed: AtomicBool,
    /// Written only under the status lock
    paused: AtomicBool,
    close_requested: AtomicBool,
    /// Wakes the loop on pause / resume / close
    control: Notify,
    queue_capacity: usize,
    stats: Mutex<SyncMetricsAggregator>,
}

// Lock order: status -> latest -> listeners
impl ReaderShared {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn dispatch(&self, event: StreamEvent) {
        let listeners = self.listeners.lock();
        for (_, handle) in listeners.iter() {
            handle.try_send(event.clone());
        }
    }

    /// Set and broadcast a new status, returning whether it changed
    fn publish_status(&self, next: SyncedStatus) -> bool {
        let mut status = self.status.lock();
        self.transition(&mut status, next)
    }

    /// Same as [`publish_status`](Self::publish_status) with the status lock held
    fn transition(&self, status: &mut MutexGuard<'_, SyncedStatus>, next: SyncedStatus) -> bool {
        let previous = **status;
        if previous == next {
            return false;
        }
        if previous == SyncedStatus::Closed {
            warn!(stream_id = %self.stream_id, %next, "stream already closed, status ignored");
            return false;
        }
        if !previous.can_transition_to(next) {
            debug!(stream_id = %self.stream_id, %previous, %next, "unexpected status transition");
        }

        **status = next;
        self.dispatch(StreamEvent::Status(next));
        observability::record_status_change(self.stream_id, next.as_str());
        info!(stream_id = %self.stream_id, %previous, %next, "stream status changed");
        true
    }

    /// React to a source status change
    ///
    /// Returns the final status if the loop has to exit.
    fn handle_source_status(&self) -> Option<SyncedStatus> {
        match SyncedStatus::from_source(self.stream_id, self.source.status()) {
            Ok(SyncedStatus::Closed) => Some(SyncedStatus::Closed),
            Ok(SyncedStatus::Finished) => Some(SyncedStatus::Finished),
            Ok(status) => {
                let mut current = self.status.lock();
                if self.is_paused() {
                    debug!(stream_id = %self.stream_id, %status, "source change while paused");
                } else {
                    self.transition(&mut current, status);
                }
                None
            }
            Err(e) => {
                error!(stream_id = %self.stream_id, error = %e, "unhandled source status");
                self.dispatch(StreamEvent::Error(e.to_string()));
                None
            }
        }
    }

    fn emit_frame(&self, frame: BufferedFrame) {
        observability::record_frame_emitted(self.stream_id, &frame);
        self.stats.lock().update(&frame);

        let frame = Arc::new(frame);
        let mut latest = self.latest.lock();
        *latest = Some(Arc::clone(&frame));
        self.dispatch(StreamEvent::Frame(frame));
    }
}

/// Handle to the synchronization loop of one stream
///
/// Dropping the handle requests the loop to close.
pub struct SyncedStreamReader {
    shared: Arc<ReaderShared>,
    done_rx: watch::Receiver<bool>,
}

impl SyncedStreamReader {
    /// Start the loop of a stream on the current tokio runtime
    ///
    /// `tracker` is the buffer capacity shared with every other stream.
    pub fn spawn(
        stream_id: StreamId,
        frame_source: Arc<dyn FrameSource>,
        result_source: Arc<dyn ResultSource>,
        tracker: CapacityTracker,
        config: &SyncEngineConfig,
    ) -> Self {
        let shared = Arc::new(ReaderShared {
            stream_id,
            source: frame_source,
            status: Mutex::new(SyncedStatus::Initializing),
            latest: Mutex::new(None),
            listeners: Mutex::new(Slab::new()),
            listeners_closed: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            control: Notify::new(),
            queue_capacity: config.reader.listener_queue_capacity,
            stats: Mutex::new(SyncMetricsAggregator::new()),
        });

        let syncer = FrameSyncer::new(tracker, config.tracks.clone());
        let wait_timeout = config.reader.wait_timeout();
        let (done_tx, done_rx) = watch::channel(false);

        let loop_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            run_loop(loop_shared, result_source, syncer, wait_timeout).await;
            let _ = done_tx.send(true);
        });

        Self { shared, done_rx }
    }

    pub fn stream_id(&self) -> StreamId {
        self.shared.stream_id
    }

    /// Current status
    pub fn status(&self) -> SyncedStatus {
        *self.shared.status.lock()
    }

    /// Last frame emitted to listeners
    pub fn latest_frame(&self) -> Option<Arc<BufferedFrame>> {
        self.shared.latest.lock().clone()
    }

    /// Subscribe a listener
    ///
    /// The listener immediately receives the current state: the status if
    /// not streaming, else the latest frame, else `Initializing`.
    /// Must be called from within a tokio runtime.
    ///
    /// Once the loop has stopped the listener only gets the final status
    /// and is closed right away; `None` is returned.
    pub fn subscribe<L>(&self, listener: L) -> Option<ListenerId>
    where
        L: StreamListener + Send + 'static,
    {
        let status = self.shared.status.lock();
        let latest = self.shared.latest.lock();
        let mut listeners = self.shared.listeners.lock();

        let handle = ListenerHandle::spawn(listener, self.shared.queue_capacity);
        let initial = match (*status, latest.as_ref()) {
            (SyncedStatus::Streaming, Some(frame)) => StreamEvent::Frame(Arc::clone(frame)),
            (SyncedStatus::Streaming, None) => StreamEvent::Status(SyncedStatus::Initializing),
            (other, _) => StreamEvent::Status(other),
        };
        handle.try_send(initial);

        if self.shared.listeners_closed.load(Ordering::SeqCst) {
            warn!(
                stream_id = %self.shared.stream_id,
                listener = %handle.name(),
                status = %*status,
                "stream already stopped, listener closed after the final status"
            );
            // Dropping the sender lets the worker drain and close the listener
            drop(handle);
            return None;
        }

        let name = handle.name().to_string();
        let key = listeners.insert(handle);
        debug!(stream_id = %self.shared.stream_id, listener = %name, key, "listener subscribed");
        Some(ListenerId(key))
    }

    /// Subscribe a [`ChannelListener`] and return its receiving end
    pub fn subscribe_channel(
        &self,
        name: impl Into<String>,
        capacity: usize,
    ) -> (Option<ListenerId>, mpsc::Receiver<StreamEvent>) {
        let (listener, rx) = ChannelListener::new(name, capacity);
        (self.subscribe(listener), rx)
    }

    /// Remove a listener
    ///
    /// Its worker drains the queued events and closes the listener on its
    /// own. Unknown ids are logged and ignored.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.shared.listeners.lock().try_remove(id.0);
        match removed {
            Some(handle) => {
                debug!(
                    stream_id = %self.shared.stream_id,
                    listener = %handle.name(),
                    "listener unsubscribed"
                );
                true
            }
            None => {
                warn!(
                    stream_id = %self.shared.stream_id,
                    ?id,
                    "unsubscribe of unknown listener ignored"
                );
                false
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }

    /// Metrics of every subscribed listener
    pub fn listener_metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.shared
            .listeners
            .lock()
            .iter()
            .map(|(_, h)| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Summary of the frames emitted so far
    pub fn metrics_summary(&self) -> MetricsSummary {
        self.shared.stats.lock().summary()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// Stop emitting frames; the source stays connected
    pub fn pause(&self) {
        let mut status = self.shared.status.lock();
        if status.is_terminal() {
            warn!(stream_id = %self.shared.stream_id, "pause of an ended stream ignored");
            return;
        }
        if self.shared.paused.swap(true, Ordering::SeqCst) {
            warn!(stream_id = %self.shared.stream_id, "stream already paused");
            return;
        }
        self.shared.transition(&mut status, SyncedStatus::Paused);
        drop(status);
        self.shared.control.notify_one();
    }

    /// Resume a paused stream
    ///
    /// No-op with a warning if the stream is not paused or the source is not
    /// in a state to stream (paused itself, ended or unknown).
    pub fn resume(&self) {
        let stream_id = self.shared.stream_id;
        let mut status = self.shared.status.lock();
        if !self.is_paused() {
            warn!(%stream_id, "resume of a stream that is not paused ignored");
            return;
        }

        let next = match SyncedStatus::from_source(stream_id, self.shared.source.status()) {
            Ok(source) if source.is_terminal() || source == SyncedStatus::Paused => {
                warn!(%stream_id, %source, "source can not be resumed, stream stays paused");
                return;
            }
            Ok(source) => source,
            Err(e) => {
                warn!(%stream_id, error = %e, "source status unknown, resume ignored");
                return;
            }
        };

        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.transition(&mut status, next);
        drop(status);
        self.shared.control.notify_one();
    }

    /// Request the loop to stop (fire-and-forget)
    pub fn close(&self) {
        if !self.shared.close_requested.swap(true, Ordering::SeqCst) {
            debug!(stream_id = %self.shared.stream_id, "close requested");
        }
        self.shared.control.notify_one();
    }

    /// Whether the loop task has terminated
    pub fn is_closed(&self) -> bool {
        *self.done_rx.borrow() || self.done_rx.has_changed().is_err()
    }

    /// Wait for the loop task to terminate
    ///
    /// Does not request the close by itself.
    pub async fn wait_until_closed(&self) {
        let mut done_rx = self.done_rx.clone();
        // Err means the task is gone without reporting, which is also done
        let _ = done_rx.wait_for(|done| *done).await;
    }
}

impl Drop for SyncedStreamReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[instrument(
    name = "synced_stream_reader_loop",
    skip_all,
    fields(stream_id = %shared.stream_id)
)]
async fn run_loop(
    shared: Arc<ReaderShared>,
    result_source: Arc<dyn ResultSource>,
    mut syncer: FrameSyncer,
    wait_timeout: Duration,
) {
    let stream_id = shared.stream_id;
    let signals = shared.source.signals();
    let mut last_emitted = f64::NEG_INFINITY;
    // The source may have changed status before the loop started
    let mut check_status = true;

    info!(%stream_id, "synchronization loop started");

    let final_status = loop {
        if shared.close_requested.load(Ordering::SeqCst) {
            break SyncedStatus::Finished;
        }

        if signals.clear_status() | std::mem::take(&mut check_status) {
            if let Some(status) = shared.handle_source_status() {
                break status;
            }
        }

        if signals.clear_frame() && !shared.is_paused() {
            if let Some((tstamp, frame)) = shared.source.latest_frame() {
                let results = result_source.latest_results(stream_id);
                let output = syncer
                    .sync(tstamp, frame, results)
                    .filter(|out| out.tstamp > last_emitted)
                    .cloned();

                observability::record_buffer_depth(stream_id, syncer.buffer_len());
                observability::record_active_tracks(stream_id, syncer.track_count());

                if let Some(output) = output {
                    last_emitted = output.tstamp;
                    shared.emit_frame(output);
                }
            }
        }

        tokio::select! {
            _ = signals.wait_any(wait_timeout) => {}
            _ = shared.control.notified() => {}
        }
    };

    shared.publish_status(final_status);

    let handles: Vec<ListenerHandle> = {
        let mut listeners = shared.listeners.lock();
        shared.listeners_closed.store(true, Ordering::SeqCst);
        listeners.drain().collect()
    };
    for handle in handles {
        handle.shutdown().await;
    }

    info!(%stream_id, status = %final_status, "synchronization loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFrameSource, MockResultSource};
    use contracts::{Frame, ResultSet, SourceStatus, Zone, ZoneStatus};
    use tokio::time::{sleep, timeout};

    const STREAM: StreamId = StreamId::new(7);

    fn results(tstamp: f64) -> ResultSet {
        ResultSet::new().with_status(ZoneStatus::new(Zone::full_frame(STREAM), tstamp))
    }

    fn start() -> (Arc<MockFrameSource>, Arc<MockResultSource>, SyncedStreamReader) {
        let source = MockFrameSource::new(STREAM);
        let result_source = MockResultSource::new();
        let reader = SyncedStreamReader::spawn(
            STREAM,
            source.clone(),
            result_source.clone(),
            CapacityTracker::default(),
            &SyncEngineConfig::default(),
        );
        (source, result_source, reader)
    }

    async fn next_event(rx: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    async fn next_status(rx: &mut mpsc::Receiver<StreamEvent>) -> SyncedStatus {
        next_event(rx).await.as_status().expect("expected a status event")
    }

    async fn next_frame_tstamp(rx: &mut mpsc::Receiver<StreamEvent>) -> f64 {
        next_event(rx).await.as_frame().expect("expected a frame event").tstamp
    }

    async fn push(source: &MockFrameSource, tstamp: f64) {
        source.push_frame(tstamp, Frame::empty());
        sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_subscribe_receives_initial_status() {
        let (_source, _results, reader) = start();
        let (_, mut rx) = reader.subscribe_channel("ui", 16);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Initializing);
    }

    #[tokio::test]
    async fn test_streams_paired_frames() {
        let (source, result_source, reader) = start();
        let (_, mut rx) = reader.subscribe_channel("ui", 16);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Initializing);

        source.set_status(SourceStatus::Streaming);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Streaming);

        result_source.publish(STREAM, results(10.0));
        push(&source, 1.0).await;
        push(&source, 2.0).await;

        assert_eq!(next_frame_tstamp(&mut rx).await, 1.0);
        let event = next_event(&mut rx).await;
        let frame = event.as_frame().unwrap();
        assert_eq!(frame.tstamp, 2.0);
        assert!(frame.is_paired());
        assert_eq!(reader.latest_frame().unwrap().tstamp, 2.0);
        assert_eq!(reader.metrics_summary().total_frames, 2);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_latest_frame() {
        let (source, result_source, reader) = start();
        source.set_status(SourceStatus::Streaming);
        result_source.publish(STREAM, results(10.0));
        push(&source, 1.0).await;

        let (_, mut rx) = reader.subscribe_channel("late", 4);
        assert_eq!(next_frame_tstamp(&mut rx).await, 1.0);
    }

    #[tokio::test]
    async fn test_pause_suppresses_frames() {
        let (source, result_source, reader) = start();
        let (_, mut rx) = reader.subscribe_channel("ui", 16);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Initializing);
        source.set_status(SourceStatus::Streaming);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Streaming);
        result_source.publish(STREAM, results(10.0));

        reader.pause();
        assert!(reader.is_paused());
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Paused);

        push(&source, 1.0).await;
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

        reader.resume();
        assert!(!reader.is_paused());
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Streaming);

        push(&source, 2.0).await;
        assert_eq!(next_frame_tstamp(&mut rx).await, 2.0);
    }

    #[tokio::test]
    async fn test_resume_when_not_paused_is_noop() {
        let (source, _results, reader) = start();
        source.set_status(SourceStatus::Streaming);
        sleep(Duration::from_millis(20)).await;

        reader.resume();
        assert!(!reader.is_paused());
        assert_eq!(reader.status(), SyncedStatus::Streaming);
    }

    #[tokio::test]
    async fn test_halted_recovers() {
        let (source, _results, reader) = start();
        let (_, mut rx) = reader.subscribe_channel("ui", 16);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Initializing);

        source.set_status(SourceStatus::Streaming);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Streaming);
        source.set_status(SourceStatus::Halted);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Halted);
        source.set_status(SourceStatus::Streaming);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Streaming);
    }

    #[tokio::test]
    async fn test_close_publishes_finished() {
        let (_source, _results, reader) = start();
        let (_, mut rx) = reader.subscribe_channel("ui", 16);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Initializing);

        reader.close();
        timeout(Duration::from_secs(2), reader.wait_until_closed())
            .await
            .unwrap();

        assert!(reader.is_closed());
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Finished);
        // Listener workers are shut down with the loop
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_source_closed_is_terminal() {
        let (source, _results, reader) = start();
        let (_, mut rx) = reader.subscribe_channel("ui", 16);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Initializing);

        source.set_status(SourceStatus::Closed);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Closed);
        timeout(Duration::from_secs(2), reader.wait_until_closed())
            .await
            .unwrap();
        assert_eq!(reader.status(), SyncedStatus::Closed);

        reader.pause();
        assert!(!reader.is_paused());
    }

    #[tokio::test]
    async fn test_subscribe_after_stop_gets_final_status() {
        let (_source, _results, reader) = start();
        reader.close();
        timeout(Duration::from_secs(2), reader.wait_until_closed())
            .await
            .unwrap();

        let (id, mut rx) = reader.subscribe_channel("late", 4);
        assert!(id.is_none());
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Finished);
        let closed = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(closed.is_none());
        assert_eq!(reader.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_keeps_pause_while_source_paused() {
        let (source, _results, reader) = start();
        let (_, mut rx) = reader.subscribe_channel("ui", 16);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Initializing);
        source.set_status(SourceStatus::Streaming);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Streaming);

        reader.pause();
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Paused);

        source.set_status(SourceStatus::Paused);
        sleep(Duration::from_millis(20)).await;
        reader.resume();
        assert!(reader.is_paused());
        assert_eq!(reader.status(), SyncedStatus::Paused);

        source.set_status(SourceStatus::Streaming);
        sleep(Duration::from_millis(20)).await;
        // Source changes are not published while paused
        assert_eq!(reader.status(), SyncedStatus::Paused);

        reader.resume();
        assert!(!reader.is_paused());
        assert_eq!(reader.status(), SyncedStatus::Streaming);
        assert_eq!(next_status(&mut rx).await, SyncedStatus::Streaming);
    }

    #[tokio::test]
    async fn test_pause_and_source_changes_race() {
        let (source, _results, reader) = start();
        source.set_status(SourceStatus::Streaming);
        sleep(Duration::from_millis(20)).await;

        let reader = Arc::new(reader);
        let toggler = {
            let reader = Arc::clone(&reader);
            tokio::spawn(async move {
                for _ in 0..50 {
                    reader.pause();
                    tokio::task::yield_now().await;
                    reader.resume();
                    tokio::task::yield_now().await;
                }
                reader.pause();
            })
        };
        for i in 0..50 {
            let status = if i % 2 == 0 {
                SourceStatus::Halted
            } else {
                SourceStatus::Streaming
            };
            source.set_status(status);
            tokio::task::yield_now().await;
        }
        toggler.await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert!(reader.is_paused());
        assert_eq!(reader.status(), SyncedStatus::Paused);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (_source, _results, reader) = start();
        let (id, _rx) = reader.subscribe_channel("ui", 16);
        let id = id.unwrap();
        assert_eq!(reader.listener_count(), 1);

        assert!(reader.unsubscribe(id));
        assert!(!reader.unsubscribe(id));
        assert_eq!(reader.listener_count(), 0);
    }
}
