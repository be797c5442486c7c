//! Sync engine configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Synchronization configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SyncEngineConfig {
    /// Frame buffer configuration
    #[serde(default)]
    #[validate(nested)]
    pub buffer: BufferConfig,

    /// Detection track configuration
    #[serde(default)]
    #[validate(nested)]
    pub tracks: TrackConfig,

    /// Synchronization loop configuration
    #[serde(default)]
    #[validate(nested)]
    pub reader: ReaderConfig,

    /// Logging and metrics export
    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// Frame buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BufferConfig {
    /// Maximum number of unpaired frames across all streams
    #[serde(default = "default_max_buffer_size")]
    #[validate(range(min = 1))]
    pub max_buffer_size: usize,

    /// Frames each stream may keep even when the shared maximum is reached
    #[serde(default = "default_guaranteed_buffer_space")]
    pub guaranteed_buffer_space: usize,
}

fn default_max_buffer_size() -> usize {
    300
}

fn default_guaranteed_buffer_space() -> usize {
    30
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: default_max_buffer_size(),
            guaranteed_buffer_space: default_guaranteed_buffer_space(),
        }
    }
}

/// Detection track configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TrackConfig {
    /// Seconds without a detection before a track is dropped
    #[serde(default = "default_max_track_age_s")]
    #[validate(range(exclusive_min = 0.0))]
    pub max_track_age_s: f64,

    /// Samples kept per track (oldest pruned first)
    #[serde(default = "default_max_history")]
    #[validate(range(min = 1))]
    pub max_history: usize,

    /// Age of the oldest sample shown in a motion trail
    #[serde(default = "default_trail_age_s")]
    #[validate(range(min = 0.0))]
    pub trail_age_s: f64,
}

fn default_max_track_age_s() -> f64 {
    30.0
}

fn default_max_history() -> usize {
    1000
}

fn default_trail_age_s() -> f64 {
    10.0
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            max_track_age_s: default_max_track_age_s(),
            max_history: default_max_history(),
            trail_age_s: default_trail_age_s(),
        }
    }
}

/// Synchronization loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReaderConfig {
    /// Upper bound of a single wait for source notifications (ms)
    #[serde(default = "default_wait_timeout_ms")]
    #[validate(range(min = 1))]
    pub wait_timeout_ms: u64,

    /// Queue capacity of each listener
    #[serde(default = "default_listener_queue_capacity")]
    #[validate(range(min = 1))]
    pub listener_queue_capacity: usize,
}

fn default_wait_timeout_ms() -> u64 {
    200
}

fn default_listener_queue_capacity() -> usize {
    32
}

impl ReaderConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            listener_queue_capacity: default_listener_queue_capacity(),
        }
    }
}

/// 日志与指标导出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// 日志格式
    #[serde(default)]
    pub log_format: LogFormat,

    /// 默认日志级别，RUST_LOG 优先
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1))]
    pub log_level: String,

    /// Prometheus 端口 (None = 禁用)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}
