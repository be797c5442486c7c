//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 多个流共享缓冲容量的场景
//! - 检测轨迹跨帧插值
//! - 模拟 e2e 测试（Mock 帧源 -> StreamManager -> 监听者）

#[cfg(test)]
mod contract_tests {
    use contracts::SyncEngineConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(config_loader::ConfigLoader::validate(&SyncEngineConfig::default()).is_ok());
    }
}

#[cfg(test)]
mod shared_capacity_tests {
    use std::sync::Arc;

    use contracts::{Frame, ResultSet, StreamId, Zone, ZoneStatus};
    use sync_engine::{CapacityTracker, FrameSyncer, TrackConfig};

    fn no_results() -> Arc<ResultSet> {
        Arc::new(ResultSet::new())
    }

    /// 两个流共用一个 CapacityTracker：
    /// 先到的流占满共享上限后，后到的流仍有保底空间，
    /// 超出保底的流在下一帧到来时被迫输出最旧帧。
    #[test]
    fn test_two_streams_share_buffer_capacity() {
        let tracker = CapacityTracker::new(4, 1);
        let mut first = FrameSyncer::new(tracker.clone(), TrackConfig::default());
        let mut second = FrameSyncer::new(tracker.clone(), TrackConfig::default());

        for t in 1..=4 {
            assert!(first.sync(t as f64, Frame::empty(), no_results()).is_none());
        }
        assert!(tracker.is_full());

        // 第二个流低于保底空间，不会被驱逐
        assert!(second.sync(1.0, Frame::empty(), no_results()).is_none());
        assert_eq!(tracker.total_len(), 5);

        // 第一个流超出保底，被迫输出最旧帧
        let evicted = first.sync(5.0, Frame::empty(), no_results()).unwrap();
        assert_eq!(evicted.tstamp, 1.0);
        assert!(evicted.metadata.client_buffer_full);
        assert!(evicted.metadata.no_analysis);
        assert!(!evicted.is_paired());
        assert_eq!(first.buffer_len(), 4);

        // 第二个流达到保底后同样受压
        let evicted = second.sync(2.0, Frame::empty(), no_results()).unwrap();
        assert_eq!(evicted.tstamp, 1.0);
        assert!(evicted.metadata.client_buffer_full);
        assert_eq!(second.buffer_len(), 1);
    }

    #[test]
    fn test_closing_a_stream_releases_capacity() {
        let tracker = CapacityTracker::new(3, 1);
        let mut first = FrameSyncer::new(tracker.clone(), TrackConfig::default());
        {
            let mut second = FrameSyncer::new(tracker.clone(), TrackConfig::default());
            for t in 1..=3 {
                second.sync(t as f64, Frame::empty(), no_results());
            }
            assert_eq!(tracker.instance_count(), 2);
            assert!(tracker.is_full());
        }

        assert_eq!(tracker.instance_count(), 1);
        assert_eq!(tracker.total_len(), 0);
        for t in 1..=3 {
            assert!(first.sync(t as f64, Frame::empty(), no_results()).is_none());
        }
    }

    #[test]
    fn test_results_resume_pairing_after_eviction() {
        let stream = StreamId::new(1);
        let tracker = CapacityTracker::new(3, 2);
        let mut syncer = FrameSyncer::new(tracker, TrackConfig::default());

        for t in 1..=4 {
            syncer.sync(t as f64, Frame::empty(), no_results());
        }
        // t=1 已被驱逐
        assert_eq!(syncer.latest_output().unwrap().tstamp, 1.0);

        let results = Arc::new(
            ResultSet::new().with_status(ZoneStatus::new(Zone::full_frame(stream), 3.5)),
        );
        let output = syncer.sync(5.0, Frame::empty(), results).unwrap();
        assert_eq!(output.tstamp, 2.0);
        assert!(output.is_paired());
        assert!(!output.metadata.client_buffer_full);
        assert!(output.metadata.has_new_results);
    }
}

#[cfg(test)]
mod track_tests {
    use std::sync::Arc;

    use contracts::{Detection, Frame, ResultSet, StreamId, Zone, ZoneStatus};
    use sync_engine::{CapacityTracker, FrameSyncer, TrackConfig};
    use uuid::Uuid;

    fn results(tstamp: f64, detections: Vec<Detection>) -> Arc<ResultSet> {
        let mut status = ZoneStatus::new(Zone::full_frame(StreamId::new(1)), tstamp);
        status.within = detections;
        Arc::new(ResultSet::new().with_status(status))
    }

    #[test]
    fn test_tracks_follow_results_across_frames() {
        let id = Uuid::new_v4();
        let mut syncer = FrameSyncer::new(CapacityTracker::default(), TrackConfig::default());

        let first = syncer
            .sync(
                0.5,
                Frame::empty(),
                results(1.0, vec![Detection::new("person", vec![[0.0, 0.0]]).with_track_id(id)]),
            )
            .unwrap();
        assert_eq!(first.tracks().len(), 1);
        assert_eq!(first.tracks()[0].track_id(), id);
        let first_snapshot = first.tracks()[0].clone();

        let second = syncer
            .sync(
                1.5,
                Frame::empty(),
                results(
                    2.0,
                    vec![Detection::new("person", vec![[10.0, 10.0]]).with_track_id(id)],
                ),
            )
            .unwrap();
        assert_eq!(second.tstamp, 1.5);

        let track = &second.tracks()[0];
        assert_eq!(track.len(), 2);
        assert_eq!(track.class_name(), Some("person"));

        let midpoint = track.get_interpolated_detection(1.5).unwrap();
        assert!((midpoint.coords[0][0] - 5.0).abs() < 1e-9);
        assert!((midpoint.coords[0][1] - 5.0).abs() < 1e-9);

        let trail: Vec<f64> = track.recent_trail().map(|s| s.tstamp).collect();
        assert_eq!(trail, vec![2.0, 1.0]);

        // 旧帧上的快照不受后续结果影响
        assert_eq!(first_snapshot.len(), 1);
        assert_eq!(syncer.track(&id).unwrap().len(), 2);
    }

    #[test]
    fn test_stale_tracks_are_dropped() {
        let config = TrackConfig {
            max_track_age_s: 5.0,
            ..TrackConfig::default()
        };
        let mut syncer = FrameSyncer::new(CapacityTracker::default(), config);

        syncer.sync(
            0.0,
            Frame::empty(),
            results(1.0, vec![Detection::new("car", vec![[1.0, 1.0]])]),
        );
        assert_eq!(syncer.track_count(), 1);

        syncer.sync(4.0, Frame::empty(), results(1.0, vec![]));
        assert_eq!(syncer.track_count(), 1);

        syncer.sync(7.0, Frame::empty(), results(1.0, vec![]));
        assert_eq!(syncer.track_count(), 0);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Once;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ResultSet, SourceStatus, StreamId, SyncEngineConfig, Zone, ZoneStatus};
    use streaming::{
        MockFrameConfig, MockFrameSource, MockResultSource, StreamEvent, StreamManager,
        SyncedStatus,
    };
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const CONFIG: &str = r#"
[buffer]
max_buffer_size = 20
guaranteed_buffer_space = 5

[reader]
wait_timeout_ms = 20
listener_queue_capacity = 64

[observability]
log_format = "compact"
log_level = "warn"
"#;

    /// 全局 subscriber 每个测试进程只安装一次
    fn init_logging(config: &SyncEngineConfig) {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            if let Err(e) = observability::init(&config.observability) {
                eprintln!("observability init skipped: {e:#}");
            }
        });
    }

    async fn collect_events(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for the stream to finish")
        {
            events.push(event);
        }
        events
    }

    /// End-to-end test: MockFrameSource -> StreamManager -> ChannelListener
    ///
    /// 验证完整的数据流：
    /// 1. 从 TOML 加载配置
    /// 2. Mock 帧源按固定频率推送帧，发送完毕后进入 Finished
    /// 3. 监听者依次收到状态与按时间戳递增的已配对帧，最后通道关闭
    #[tokio::test]
    async fn test_e2e_mock_pipeline() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        init_logging(&config);
        let stream = StreamId::new(1);

        let results = MockResultSource::new();
        results.publish(
            stream,
            ResultSet::new().with_status(ZoneStatus::new(Zone::full_frame(stream), 100.0)),
        );
        let manager = StreamManager::new(results.clone(), config);

        let source = MockFrameSource::new(stream);
        let reader = manager.start_streaming(stream, source.clone());
        let (_, rx) = reader.subscribe_channel("e2e", 64);

        let generator = source.start(MockFrameConfig {
            frequency_hz: 100.0,
            max_frames: Some(5),
            ..Default::default()
        });
        generator.await.unwrap();

        let events = collect_events(rx).await;
        let statuses: Vec<SyncedStatus> =
            events.iter().filter_map(StreamEvent::as_status).collect();
        assert_eq!(statuses.first(), Some(&SyncedStatus::Initializing));
        assert!(statuses.contains(&SyncedStatus::Streaming));
        assert_eq!(statuses.last(), Some(&SyncedStatus::Finished));

        let tstamps: Vec<f64> = events
            .iter()
            .filter_map(StreamEvent::as_frame)
            .inspect(|frame| assert!(frame.is_paired()))
            .map(|frame| frame.tstamp)
            .collect();
        assert!(!tstamps.is_empty());
        assert!(tstamps.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(
            reader.metrics_summary().total_frames,
            tstamps.len() as u64
        );

        reader.wait_until_closed().await;
        manager.close_all().await;
        assert_eq!(manager.tracker().instance_count(), 0);
    }

    #[tokio::test]
    async fn test_e2e_source_closed() {
        let manager = StreamManager::new(MockResultSource::new(), Default::default());
        let stream = StreamId::new(2);
        let source = MockFrameSource::new(stream);
        let reader = manager.start_streaming(stream, source.clone());
        let (_, rx) = reader.subscribe_channel("e2e", 16);

        source.set_status(SourceStatus::Streaming);
        source.set_status(SourceStatus::Closed);

        let events = collect_events(rx).await;
        assert_eq!(
            events.last().and_then(StreamEvent::as_status),
            Some(SyncedStatus::Closed)
        );
        timeout(Duration::from_secs(2), reader.wait_until_closed())
            .await
            .unwrap();
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn test_e2e_two_streams_one_manager() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        init_logging(&config);
        let manager = StreamManager::new(MockResultSource::new(), config);

        let mut receivers = Vec::new();
        for id in [10, 11] {
            let stream = StreamId::new(id);
            let source = MockFrameSource::new(stream);
            let reader = manager.start_streaming(stream, source.clone());
            receivers.push(reader.subscribe_channel("e2e", 64).1);
            source.start(MockFrameConfig {
                frequency_hz: 200.0,
                max_frames: Some(40),
                ..Default::default()
            });
        }
        assert_eq!(manager.tracker().instance_count(), 2);

        for rx in receivers {
            let events = collect_events(rx).await;
            // 没有分析结果：只有缓冲区受压时才会输出帧，且都标记为 no_analysis
            for frame in events.iter().filter_map(StreamEvent::as_frame) {
                assert!(frame.metadata.client_buffer_full);
                assert!(frame.metadata.no_analysis);
            }
            assert_eq!(
                events.last().and_then(StreamEvent::as_status),
                Some(SyncedStatus::Finished)
            );
        }

        // 共享上限 20，每个流保底 5
        assert!(manager.tracker().total_len() <= 20 + 5);

        manager.close_all().await;
        assert_eq!(manager.tracker().instance_count(), 0);
    }
}
