//! StreamManager - owns the readers of every open stream

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{FrameSource, ResultSource, StreamId, SyncEngineConfig};
use parking_lot::Mutex;
use sync_engine::CapacityTracker;
use tracing::{debug, info, instrument};

use crate::SyncedStreamReader;

/// Opens and closes synchronized streams
///
/// Every reader started here shares one [`CapacityTracker`], so the buffer
/// maximum applies to all streams together.
pub struct StreamManager {
    config: SyncEngineConfig,
    tracker: CapacityTracker,
    result_source: Arc<dyn ResultSource>,
    readers: Mutex<HashMap<StreamId, Arc<SyncedStreamReader>>>,
    /// Readers asked to close without waiting
    closing: Mutex<Vec<Arc<SyncedStreamReader>>>,
}

impl StreamManager {
    pub fn new(result_source: Arc<dyn ResultSource>, config: SyncEngineConfig) -> Self {
        let tracker = CapacityTracker::from_config(&config.buffer);
        Self {
            config,
            tracker,
            result_source,
            readers: Mutex::new(HashMap::new()),
            closing: Mutex::new(Vec::new()),
        }
    }

    pub fn tracker(&self) -> &CapacityTracker {
        &self.tracker
    }

    /// Start synchronizing a stream
    ///
    /// Returns the existing reader if the stream is already open.
    #[instrument(name = "stream_manager_start", skip(self, frame_source))]
    pub fn start_streaming(
        &self,
        stream_id: StreamId,
        frame_source: Arc<dyn FrameSource>,
    ) -> Arc<SyncedStreamReader> {
        let mut readers = self.readers.lock();
        if let Some(reader) = readers.get(&stream_id) {
            debug!(%stream_id, "stream already open");
            return Arc::clone(reader);
        }

        let reader = Arc::new(SyncedStreamReader::spawn(
            stream_id,
            frame_source,
            Arc::clone(&self.result_source),
            self.tracker.clone(),
            &self.config,
        ));
        readers.insert(stream_id, Arc::clone(&reader));
        info!(%stream_id, open_streams = readers.len(), "stream opened");
        reader
    }

    pub fn reader(&self, stream_id: StreamId) -> Option<Arc<SyncedStreamReader>> {
        self.readers.lock().get(&stream_id).cloned()
    }

    pub fn is_streaming(&self, stream_id: StreamId) -> bool {
        self.readers.lock().contains_key(&stream_id)
    }

    /// Ids of the open streams, sorted
    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.readers.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Close a stream and wait for its loop to stop
    ///
    /// Returns false if the stream was not open.
    #[instrument(name = "stream_manager_close", skip(self))]
    pub async fn close_stream(&self, stream_id: StreamId) -> bool {
        let Some(reader) = self.readers.lock().remove(&stream_id) else {
            debug!(%stream_id, "close of a stream that is not open");
            return false;
        };
        reader.close();
        reader.wait_until_closed().await;
        info!(%stream_id, "stream closed");
        true
    }

    /// Request a stream to close without waiting
    pub fn close_stream_async(&self, stream_id: StreamId) -> bool {
        let Some(reader) = self.readers.lock().remove(&stream_id) else {
            debug!(%stream_id, "close of a stream that is not open");
            return false;
        };
        reader.close();

        let mut closing = self.closing.lock();
        closing.retain(|r| !r.is_closed());
        closing.push(reader);
        true
    }

    /// Readers still shutting down after [`close_stream_async`](Self::close_stream_async)
    pub fn closing_count(&self) -> usize {
        let mut closing = self.closing.lock();
        closing.retain(|r| !r.is_closed());
        closing.len()
    }

    /// Close every stream and wait for all loops to stop
    #[instrument(name = "stream_manager_close_all", skip(self))]
    pub async fn close_all(&self) {
        let readers: Vec<Arc<SyncedStreamReader>> = self
            .readers
            .lock()
            .drain()
            .map(|(_, reader)| reader)
            .chain(self.closing.lock().drain(..))
            .collect();

        for reader in &readers {
            reader.close();
        }
        for reader in &readers {
            reader.wait_until_closed().await;
        }
        info!(closed = readers.len(), "all streams closed");
    }
}
