//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - 按 `SyncEngineConfig::observability` 初始化 Tracing (JSON/Pretty/Compact)
//! - 可选的 Prometheus 指标导出
//! - 帧同步指标收集与统计
//!
//! ## 使用示例
//!
//! ```ignore
//! let config = config_loader::ConfigLoader::load_from_path(path)?;
//! observability::init(&config.observability)?;
//!
//! // 记录同步指标
//! if let Some(frame) = syncer.sync(tstamp, frame, results) {
//!     observability::record_frame_emitted(stream_id, frame);
//! }
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use contracts::{LogFormat, ObservabilityConfig};

// Re-exports
pub use crate::metrics::{
    record_active_tracks, record_buffer_depth, record_buffer_eviction, record_frame_emitted,
    record_listener_event, record_status_change, MetricsSummary, RunningStats, StatsSummary,
    SyncMetricsAggregator,
};

/// 初始化可观测性（Tracing + Prometheus）
///
/// - Tracing: `RUST_LOG` 优先，否则使用 `config.log_level`
/// - Prometheus: 仅当 `metrics_port` 设置时监听 0.0.0.0:port
///
/// 全局 subscriber 只能安装一次，重复调用返回错误。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("Invalid log level '{}'", config.log_level))?,
    };

    tracing_subscriber::registry()
        .with(fmt_layer(config.log_format))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("Failed to install Prometheus recorder")?;

        tracing::info!(port, "Prometheus metrics endpoint initialized");
    }

    tracing::info!(
        log_format = ?config.log_format,
        log_level = %config.log_level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}
