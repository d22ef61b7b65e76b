// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 计数行为: 每个 ID 只计一次、清零后重新计数、阈值过滤、三帧端到端

use std::collections::BTreeMap;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use sentinel_counter::detection::{BoxProcessor, Detection, RawPrediction, ReplayDetector, TrackRow};
use sentinel_counter::input::MemorySource;
use sentinel_counter::settings::{GeneralSettings, ModelSettings, TrackingSettings};
use sentinel_counter::tracking::{ActiveTrack, MultiObjectTracker, TrackerKind, TrackerParams};
use sentinel_counter::{
    FrameOutcome, FramePipeline, Session, SettingOrchestrator, SharedSession, TrackIdentityCounter,
    TrackerFactory,
};

const BIKE: usize = 1;

fn classes() -> Vec<String> {
    vec!["car".to_string(), "bike".to_string()]
}

fn row(track_id: u64, class_id: usize) -> TrackRow {
    TrackRow {
        rect: [10.0, 10.0, 30.0, 30.0],
        track_id,
        confidence: 0.9,
        class_id,
    }
}

/// 按帧回放预设轨迹行, 所有出现过的轨迹 age 固定为 10
struct ScriptedTracker {
    frames: Vec<Vec<TrackRow>>,
    cursor: usize,
    seen: Vec<(u64, usize)>,
}

impl ScriptedTracker {
    fn new(frames: Vec<Vec<TrackRow>>) -> Self {
        Self {
            frames,
            cursor: 0,
            seen: Vec::new(),
        }
    }
}

impl MultiObjectTracker for ScriptedTracker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn update(&mut self, _d: &[Detection], _f: &RgbImage) -> anyhow::Result<Vec<TrackRow>> {
        let rows = self.frames.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;
        for r in &rows {
            if !self.seen.iter().any(|(id, _)| *id == r.track_id) {
                self.seen.push((r.track_id, r.class_id));
            }
        }
        Ok(rows)
    }

    fn active_tracks(&self) -> Vec<ActiveTrack> {
        self.seen
            .iter()
            .map(|&(track_id, class_id)| ActiveTrack {
                track_id,
                class_id,
                age: 10,
            })
            .collect()
    }
}

fn counter_for(frames: Vec<Vec<TrackRow>>) -> TrackIdentityCounter {
    TrackIdentityCounter::new(Box::new(ScriptedTracker::new(frames)), 5, &classes(), &classes())
}

fn step(counter: &mut TrackIdentityCounter) -> bool {
    let frame = RgbImage::new(64, 64);
    let rows = counter.update_boxes(&[], &frame);
    let boxes = TrackIdentityCounter::to_bounding_boxes(&rows);
    counter.update_counts(&boxes, false)
}

#[test]
fn same_identity_counts_once_regardless_of_repeats() {
    for repeats in [1usize, 2, 7, 40] {
        let mut counter = counter_for(vec![vec![row(3, BIKE)]; repeats]);
        let flags: Vec<bool> = (0..repeats).map(|_| step(&mut counter)).collect();
        assert_eq!(counter.counts().get("bike"), Some(1), "repeats={}", repeats);
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
        assert!(flags[0]);
    }
}

#[test]
fn reset_clears_the_whole_ledger() {
    let mut counter = counter_for(vec![vec![row(3, BIKE), row(4, 0)], vec![row(3, BIKE), row(4, 0)]]);
    assert!(step(&mut counter));
    assert_eq!(counter.counts().total(), 2);

    counter.reset_counts();
    assert_eq!(counter.counts().total(), 0);
    assert_eq!(counter.ledger_len(), 0);

    // 清零后同一 ID 重新计数
    assert!(step(&mut counter));
    assert_eq!(counter.counts().get("bike"), Some(1));
    assert_eq!(counter.counts().get("car"), Some(1));
}

#[test]
fn threshold_keeps_only_strictly_higher_tracked_predictions() {
    let processor = BoxProcessor::new(&classes(), &["bike".to_string()], 0.6);
    let predictions: Vec<RawPrediction> = [0.3, 0.59, 0.61, 0.9]
        .iter()
        .map(|&confidence| RawPrediction {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            confidence,
            class_id: BIKE,
        })
        .chain(std::iter::once(RawPrediction {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            confidence: 0.95,
            class_id: 0,
        }))
        .collect();

    let kept: Vec<f32> = processor.extract(&predictions).iter().map(|d| d.confidence).collect();
    assert_eq!(kept, vec![0.61, 0.9]);
}

/// 每次构建都交出同一份脚本
struct ScriptFactory(Vec<Vec<TrackRow>>);

impl TrackerFactory for ScriptFactory {
    fn build(
        &self,
        _kind: TrackerKind,
        _params: &TrackerParams,
        _box_threshold: f32,
    ) -> anyhow::Result<Box<dyn MultiObjectTracker>> {
        Ok(Box::new(ScriptedTracker::new(self.0.clone())))
    }
}

fn bike_session() -> SharedSession {
    let mut general = GeneralSettings::default();
    general.classes = classes();
    general.tracked_classes = vec!["bike".to_string()];
    general.input_width = 32;
    general.input_height = 32;
    general.screen_width = 64;
    general.screen_height = 48;
    general.realistic_processing = false;
    let tracking = TrackingSettings::for_kind(TrackerKind::ByteTrack);
    Session::new(general, tracking, ModelSettings::default()).shared()
}

#[test]
fn three_frame_run_counts_two_bikes() {
    let session = bike_session();
    let script = vec![vec![row(7, BIKE)], vec![row(7, BIKE)], vec![row(9, BIKE)]];
    let orchestrator = SettingOrchestrator::new(session.clone());
    orchestrator.load_detector(Box::new(ReplayDetector::from_frames(vec![Vec::new(); 3])));

    let mut pipeline = FramePipeline::new(session, Arc::new(ScriptFactory(script)));
    let frame = RgbImage::from_pixel(32, 32, Rgb([90, 90, 90]));
    let flags: Vec<bool> = (0..3)
        .map(|i| match pipeline.process_frame(i, &frame) {
            FrameOutcome::Processed(out) => out.new_object,
            FrameOutcome::Skipped { reason, .. } => panic!("frame {} skipped: {}", i, reason),
        })
        .collect();

    assert_eq!(flags, vec![true, false, true]);
    let counts = orchestrator.counts().unwrap();
    let expected: BTreeMap<String, u64> = [("bike".to_string(), 2)].into_iter().collect();
    assert_eq!(counts.non_zero(), expected);
}

#[test]
fn full_run_reports_counts_and_new_object_frames() {
    let session = bike_session();
    let script = vec![vec![row(7, BIKE)], vec![row(7, BIKE)], vec![row(9, BIKE)]];
    SettingOrchestrator::new(session.clone())
        .load_detector(Box::new(ReplayDetector::from_frames(vec![Vec::new(); 3])));

    let frames = vec![RgbImage::new(32, 32); 3];
    let mut pipeline = FramePipeline::new(session, Arc::new(ScriptFactory(script)));
    let summary = pipeline.run(MemorySource::new(frames, 25.0)).unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.new_object_frames, 2);
    assert_eq!(summary.counts.unwrap().get("bike"), Some(2));
    assert!(!summary.aborted);
}
