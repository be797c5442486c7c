//! Frame Sync 指标收集模块
//!
//! 基于 BufferedFrame 元数据收集和统计同步循环的运行指标。

use std::collections::HashMap;

use contracts::StreamId;
use metrics::{counter, gauge, histogram};
use sync_engine::BufferedFrame;

/// 记录一帧输出
///
/// 每次同步循环向监听者发出一帧时调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_frame_emitted;
///
/// if let Some(frame) = syncer.sync(tstamp, frame, results) {
///     record_frame_emitted(stream_id, frame);
/// }
/// ```
pub fn record_frame_emitted(stream_id: StreamId, frame: &BufferedFrame) {
    let stream = stream_id.to_string();

    // 帧计数器
    counter!("frame_sync_frames_emitted_total", "stream_id" => stream.clone()).increment(1);

    // 最近一帧时间戳
    gauge!("frame_sync_last_frame_tstamp", "stream_id" => stream.clone()).set(frame.tstamp);

    // 缓冲区满导致的强制输出
    if frame.metadata.client_buffer_full {
        record_buffer_eviction(stream_id, frame.metadata.no_analysis);
    }

    if frame.is_paired() {
        // 分析延迟 (秒 -> 毫秒)
        histogram!("frame_sync_analysis_latency_ms", "stream_id" => stream.clone())
            .record(frame.metadata.analysis_latency.as_secs_f64() * 1000.0);

        // 每帧附带的轨迹数
        histogram!("frame_sync_tracks_per_frame", "stream_id" => stream.clone())
            .record(frame.tracks().len() as f64);
    }

    if frame.metadata.has_new_results {
        counter!("frame_sync_new_results_total", "stream_id" => stream).increment(1);
    }
}

/// 记录缓冲区压力导致的强制输出
pub fn record_buffer_eviction(stream_id: StreamId, no_analysis: bool) {
    let reason = if no_analysis { "no_analysis" } else { "buffer_full" };
    counter!(
        "frame_sync_buffer_evictions_total",
        "stream_id" => stream_id.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// 记录流状态变化
pub fn record_status_change(stream_id: StreamId, status: &str) {
    counter!(
        "frame_sync_status_changes_total",
        "stream_id" => stream_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录监听者事件投递
pub fn record_listener_event(listener: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "frame_sync_listener_events_total",
        "listener" => listener.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录缓冲区深度
pub fn record_buffer_depth(stream_id: StreamId, depth: usize) {
    gauge!(
        "frame_sync_buffer_depth",
        "stream_id" => stream_id.to_string()
    )
    .set(depth as f64);
}

/// 记录活跃轨迹数
pub fn record_active_tracks(stream_id: StreamId, count: usize) {
    gauge!(
        "frame_sync_active_tracks",
        "stream_id" => stream_id.to_string()
    )
    .set(count as f64);
}

/// 同步指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsAggregator {
    /// 总帧数
    pub total_frames: u64,

    /// 已配对帧数
    pub paired_frames: u64,

    /// 缓冲区满强制输出帧数
    pub evicted_frames: u64,

    /// 无分析结果时输出的帧数
    pub no_analysis_frames: u64,

    /// 携带新结果的帧数
    pub new_result_frames: u64,

    /// 分析延迟统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 每帧轨迹数统计
    pub track_stats: RunningStats,

    /// 各类别检测次数
    pub class_counts: HashMap<String, u64>,
}

impl SyncMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, frame: &BufferedFrame) {
        self.total_frames += 1;

        if frame.metadata.client_buffer_full {
            self.evicted_frames += 1;
        }
        if frame.metadata.no_analysis {
            self.no_analysis_frames += 1;
        }
        if frame.metadata.has_new_results {
            self.new_result_frames += 1;
        }

        if frame.is_paired() {
            self.paired_frames += 1;
            if !frame.metadata.client_buffer_full {
                self.latency_stats
                    .push(frame.metadata.analysis_latency.as_secs_f64() * 1000.0);
            }

            let tracks = frame.tracks();
            self.track_stats.push(tracks.len() as f64);
            for class_name in tracks.iter().filter_map(|t| t.class_name()) {
                *self.class_counts.entry(class_name.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames,
            paired_frames: self.paired_frames,
            evicted_frames: self.evicted_frames,
            no_analysis_frames: self.no_analysis_frames,
            eviction_rate: if self.total_frames > 0 {
                self.evicted_frames as f64 / self.total_frames as f64 * 100.0
            } else {
                0.0
            },
            analysis_latency_ms: StatsSummary::from(&self.latency_stats),
            tracks_per_frame: StatsSummary::from(&self.track_stats),
            class_counts: self.class_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub paired_frames: u64,
    pub evicted_frames: u64,
    pub no_analysis_frames: u64,
    pub eviction_rate: f64,
    pub analysis_latency_ms: StatsSummary,
    pub tracks_per_frame: StatsSummary,
    pub class_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Frame Sync Summary ===")?;
        writeln!(f, "Total frames: {}", self.total_frames)?;
        writeln!(f, "Paired frames: {}", self.paired_frames)?;
        writeln!(
            f,
            "Evicted frames: {} ({:.2}%)",
            self.evicted_frames, self.eviction_rate
        )?;
        writeln!(f, "Frames without analysis: {}", self.no_analysis_frames)?;
        writeln!(f, "Analysis latency (ms): {}", self.analysis_latency_ms)?;
        writeln!(f, "Tracks per frame: {}", self.tracks_per_frame)?;

        if !self.class_counts.is_empty() {
            writeln!(f, "Tracked classes:")?;
            let mut classes: Vec<_> = self.class_counts.iter().collect();
            classes.sort();
            for (class_name, count) in classes {
                writeln!(f, "  {}: {}", class_name, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Detection, Frame, ResultSet, StreamId, Zone, ZoneStatus};
    use std::sync::Arc;
    use sync_engine::{CapacityTracker, FrameSyncer, TrackConfig};

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut syncer = FrameSyncer::new(CapacityTracker::default(), TrackConfig::default());
        let mut status = ZoneStatus::new(Zone::full_frame(StreamId::new(1)), 1.5);
        status.within = vec![
            Detection::new("person", vec![[0.0, 0.0]]),
            Detection::new("car", vec![[1.0, 1.0]]),
        ];
        let results = Arc::new(ResultSet::new().with_status(status));

        let mut aggregator = SyncMetricsAggregator::new();
        let frame = syncer.sync(1.0, Frame::empty(), results).unwrap();
        aggregator.update(frame);

        assert_eq!(aggregator.total_frames, 1);
        assert_eq!(aggregator.paired_frames, 1);
        assert_eq!(aggregator.evicted_frames, 0);
        assert_eq!(aggregator.class_counts.get("person"), Some(&1));
        assert!((aggregator.latency_stats.mean() - 500.0).abs() < 1e-6);

        let mut evicted = BufferedFrame::new(0.5, Frame::empty());
        evicted.metadata.client_buffer_full = true;
        evicted.metadata.no_analysis = true;
        aggregator.update(&evicted);

        let summary = aggregator.summary();
        assert_eq!(summary.evicted_frames, 1);
        assert_eq!(summary.no_analysis_frames, 1);
        assert!((summary.eviction_rate - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let summary = MetricsSummary {
            total_frames: 100,
            paired_frames: 95,
            evicted_frames: 5,
            no_analysis_frames: 0,
            eviction_rate: 5.0,
            analysis_latency_ms: StatsSummary {
                count: 95,
                min: 20.0,
                max: 80.0,
                mean: 50.0,
                std_dev: 15.0,
            },
            tracks_per_frame: StatsSummary::default(),
            class_counts: HashMap::from([("person".to_string(), 12)]),
        };

        let output = format!("{}", summary);
        assert!(output.contains("Total frames: 100"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("person: 12"));
    }
}
