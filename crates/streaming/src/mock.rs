//! Mock 帧源 / 结果源
//!
//! 用于无解码器、无分析服务器环境的测试。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    Frame, FrameSource, PixelFormat, ResultSet, ResultSource, SourceSignals, SourceStatus,
    StreamId,
};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Mock 帧生成器配置
#[derive(Debug, Clone)]
pub struct MockFrameConfig {
    /// 发送频率 (Hz)
    pub frequency_hz: f64,

    /// 图像宽度
    pub width: u32,

    /// 图像高度
    pub height: u32,

    /// 发送帧数上限，达到后状态变为 Finished（None = 不限）
    pub max_frames: Option<u64>,
}

impl Default for MockFrameConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 30.0,
            width: 64,
            height: 48,
            max_frames: None,
        }
    }
}

#[derive(Debug)]
struct MockFrameState {
    latest: Option<(f64, Frame)>,
    status: SourceStatus,
}

/// Mock 帧源
///
/// 既可以手动推送帧 / 状态，也可以启动定时生成任务。
#[derive(Debug)]
pub struct MockFrameSource {
    stream_id: StreamId,
    state: Mutex<MockFrameState>,
    signals: Arc<SourceSignals>,
    running: Arc<AtomicBool>,
}

impl MockFrameSource {
    /// 创建新的 Mock 帧源（初始状态 Initializing）
    pub fn new(stream_id: StreamId) -> Arc<Self> {
        Arc::new(Self {
            stream_id,
            state: Mutex::new(MockFrameState {
                latest: None,
                status: SourceStatus::Initializing,
            }),
            signals: Arc::new(SourceSignals::new()),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// 推送一帧并发出 "new frame" 通知
    pub fn push_frame(&self, tstamp: f64, frame: Frame) {
        self.state.lock().latest = Some((tstamp, frame));
        self.signals.set_frame();
        trace!(stream_id = %self.stream_id, tstamp, "mock frame pushed");
    }

    /// 修改状态并发出 "status changed" 通知
    pub fn set_status(&self, status: SourceStatus) {
        self.state.lock().status = status;
        self.signals.set_status();
        debug!(stream_id = %self.stream_id, ?status, "mock source status changed");
    }

    /// 启动定时生成任务
    ///
    /// 先切换到 Streaming，然后按频率推送帧；帧时间戳从 0 开始按周期递增。
    pub fn start(self: &Arc<Self>, config: MockFrameConfig) -> JoinHandle<()> {
        let source = Arc::clone(self);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let period = 1.0 / config.frequency_hz.max(f64::MIN_POSITIVE);
            let interval = Duration::from_secs_f64(period);
            let size = config.width as usize
                * config.height as usize
                * PixelFormat::Rgb8.bytes_per_pixel();
            let data = Bytes::from(vec![128u8; size]);
            let mut frame_count: u64 = 0;

            debug!(
                stream_id = %source.stream_id,
                frequency_hz = config.frequency_hz,
                "mock frame source started"
            );
            source.set_status(SourceStatus::Streaming);

            while running.load(Ordering::Relaxed) {
                if config.max_frames.is_some_and(|max| frame_count >= max) {
                    source.set_status(SourceStatus::Finished);
                    break;
                }

                let frame =
                    Frame::new(config.width, config.height, PixelFormat::Rgb8, data.clone());
                source.push_frame(frame_count as f64 * period, frame);
                frame_count += 1;

                tokio::time::sleep(interval).await;
            }

            debug!(
                stream_id = %source.stream_id,
                frames = frame_count,
                "mock frame source stopped"
            );
        })
    }

    /// 停止定时生成任务
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl FrameSource for MockFrameSource {
    fn latest_frame(&self) -> Option<(f64, Frame)> {
        self.state.lock().latest.clone()
    }

    fn status(&self) -> SourceStatus {
        self.state.lock().status
    }

    fn signals(&self) -> Arc<SourceSignals> {
        Arc::clone(&self.signals)
    }
}

/// Mock 结果源
///
/// 缓存每个流最近一次发布的 ResultSet。
#[derive(Debug, Default)]
pub struct MockResultSource {
    latest: RwLock<HashMap<StreamId, Arc<ResultSet>>>,
    empty: Arc<ResultSet>,
}

impl MockResultSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 发布某个流的最新结果
    pub fn publish(&self, stream_id: StreamId, results: ResultSet) {
        self.latest.write().insert(stream_id, Arc::new(results));
    }

    /// 清除某个流的结果
    pub fn clear(&self, stream_id: StreamId) {
        self.latest.write().remove(&stream_id);
    }
}

impl ResultSource for MockResultSource {
    fn latest_results(&self, stream_id: StreamId) -> Arc<ResultSet> {
        self.latest
            .read()
            .get(&stream_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }
}
