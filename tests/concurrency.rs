// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 互斥区相关: 故障注入后锁被释放、重建在锁内完成、定时清零

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::RgbImage;
use sentinel_counter::detection::{Detection, RawPrediction, ReplayDetector, TrackRow, TrackedBox};
use sentinel_counter::settings::{GeneralSettings, ModelSettings, TrackingSettings};
use sentinel_counter::tracking::{ActiveTrack, MultiObjectTracker, TrackerKind, TrackerParams};
use sentinel_counter::{
    Clock, CyclingTimer, DefaultTrackerFactory, FrameOutcome, FramePipeline, Locker, ManualClock,
    Session, SettingOrchestrator, SharedSession, TrackerFactory,
};

fn session() -> SharedSession {
    let mut general = GeneralSettings::default();
    general.classes = vec!["car".to_string(), "bike".to_string()];
    general.tracked_classes = general.classes.clone();
    general.input_width = 32;
    general.input_height = 32;
    general.screen_width = 32;
    general.screen_height = 32;
    general.realistic_processing = false;
    let tracking = TrackingSettings {
        kind: TrackerKind::Iou,
        params: TrackerParams {
            min_hits: 0,
            max_age: 5,
            detection_threshold: 0.3,
        },
    };
    Session::new(general, tracking, ModelSettings::default()).shared()
}

fn car() -> RawPrediction {
    RawPrediction {
        x1: 4.0,
        y1: 4.0,
        x2: 20.0,
        y2: 20.0,
        confidence: 0.9,
        class_id: 0,
    }
}

/// 第 `fail_on` 次 update 返回错误, 其余时候每个检测框成为 age=10 的轨迹
struct FlakyTracker {
    calls: usize,
    fail_on: usize,
    locker: SharedSession,
    lock_held_during_update: Arc<AtomicUsize>,
}

impl MultiObjectTracker for FlakyTracker {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn update(&mut self, detections: &[Detection], _f: &RgbImage) -> anyhow::Result<Vec<TrackRow>> {
        self.calls += 1;
        if self.locker.is_locked() {
            self.lock_held_during_update.fetch_add(1, Ordering::SeqCst);
        }
        if self.calls == self.fail_on {
            anyhow::bail!("injected failure");
        }
        Ok(detections
            .iter()
            .map(|d| TrackRow {
                rect: d.rect(),
                track_id: 1,
                confidence: d.confidence,
                class_id: d.class_id,
            })
            .collect())
    }

    fn active_tracks(&self) -> Vec<ActiveTrack> {
        vec![ActiveTrack {
            track_id: 1,
            class_id: 0,
            age: 10,
        }]
    }
}

struct FlakyFactory {
    locker: SharedSession,
    lock_held: Arc<AtomicUsize>,
}

impl TrackerFactory for FlakyFactory {
    fn build(
        &self,
        _kind: TrackerKind,
        _params: &TrackerParams,
        _box_threshold: f32,
    ) -> anyhow::Result<Box<dyn MultiObjectTracker>> {
        Ok(Box::new(FlakyTracker {
            calls: 0,
            fail_on: 2,
            locker: self.locker.clone(),
            lock_held_during_update: Arc::clone(&self.lock_held),
        }))
    }
}

#[test]
fn tracker_failure_releases_lock_and_next_frame_completes() {
    let session = session();
    let lock_held = Arc::new(AtomicUsize::new(0));
    SettingOrchestrator::new(session.clone())
        .load_detector(Box::new(ReplayDetector::from_frames(vec![vec![car()]]).looped(true)));
    let factory = FlakyFactory {
        locker: session.clone(),
        lock_held: Arc::clone(&lock_held),
    };
    let mut pipeline = FramePipeline::new(session.clone(), Arc::new(factory));
    let frame = RgbImage::new(32, 32);

    let FrameOutcome::Processed(first) = pipeline.process_frame(0, &frame) else {
        panic!("frame 0 should be processed");
    };
    assert_eq!(first.tracked, 1);

    // 跟踪器失败: 本帧不跟踪任何目标
    let FrameOutcome::Processed(failed) = pipeline.process_frame(1, &frame) else {
        panic!("frame 1 degrades instead of failing");
    };
    assert_eq!(failed.tracked, 0);
    assert!(!session.is_locked());

    let FrameOutcome::Processed(next) = pipeline.process_frame(2, &frame) else {
        panic!("frame 2 should be processed");
    };
    assert_eq!(next.tracked, 1);
    assert_eq!(next.counts[0], ("car".to_string(), 1));
    // 每次 update 都发生在互斥区内
    assert_eq!(lock_held.load(Ordering::SeqCst), 3);
}

/// 记录构建代数; 构建期间检查锁被持有, 并故意放慢构建
struct GenerationFactory {
    locker: SharedSession,
    generation: AtomicUsize,
    built_outside_lock: AtomicUsize,
    log: Arc<Mutex<Vec<usize>>>,
}

struct GenerationTracker {
    generation: usize,
    log: Arc<Mutex<Vec<usize>>>,
}

impl MultiObjectTracker for GenerationTracker {
    fn name(&self) -> &'static str {
        "generation"
    }

    fn update(&mut self, _d: &[Detection], _f: &RgbImage) -> anyhow::Result<Vec<TrackRow>> {
        self.log.lock().unwrap().push(self.generation);
        Ok(Vec::new())
    }

    fn active_tracks(&self) -> Vec<ActiveTrack> {
        Vec::new()
    }
}

impl TrackerFactory for GenerationFactory {
    fn build(
        &self,
        _kind: TrackerKind,
        _params: &TrackerParams,
        _box_threshold: f32,
    ) -> anyhow::Result<Box<dyn MultiObjectTracker>> {
        if !self.locker.is_locked() {
            self.built_outside_lock.fetch_add(1, Ordering::SeqCst);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
        Ok(Box::new(GenerationTracker {
            generation,
            log: Arc::clone(&self.log),
        }))
    }
}

#[test]
fn concurrent_reset_requests_rebuild_inside_one_critical_section() {
    let session = session();
    let orchestrator = SettingOrchestrator::new(session.clone());
    orchestrator.load_detector(Box::new(ReplayDetector::from_frames(vec![vec![car()]]).looped(true)));

    let log = Arc::new(Mutex::new(Vec::new()));
    let factory = Arc::new(GenerationFactory {
        locker: session.clone(),
        generation: AtomicUsize::new(0),
        built_outside_lock: AtomicUsize::new(0),
        log: Arc::clone(&log),
    });
    let mut pipeline = FramePipeline::new(session.clone(), factory.clone());

    let mutator = {
        let orchestrator = orchestrator.clone();
        thread::spawn(move || {
            for i in 0..50u32 {
                orchestrator.set_min_hits(i % 4).unwrap();
                thread::sleep(Duration::from_micros(300));
            }
        })
    };

    let frame = RgbImage::new(32, 32);
    for i in 0..100 {
        assert!(pipeline.process_frame(i, &frame).is_processed());
    }
    mutator.join().unwrap();

    assert_eq!(factory.built_outside_lock.load(Ordering::SeqCst), 0);
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 100);
    // 每帧只用一个跟踪器实例, 且代数单调不减
    assert!(log.windows(2).all(|w| w[0] <= w[1]));
    assert!(factory.generation.load(Ordering::SeqCst) >= 1);
}

#[test]
fn timer_resets_counts_under_the_session_lock() {
    let session = session();
    session.lock().rebuild(&DefaultTrackerFactory, None).unwrap();
    {
        let mut s = session.lock();
        let p = s.processors.as_mut().unwrap();
        let boxes = [TrackedBox {
            x1: 0.0,
            y1: 0.0,
            x2: 5.0,
            y2: 5.0,
            track_id: 11,
            confidence: 0.9,
            class_id: 1,
        }];
        assert!(p.counter.update_counts(&boxes, false));
    }
    assert_eq!(session.lock().counts().unwrap().get("bike"), Some(1));

    let clock = Arc::new(ManualClock::new());
    let timer = Arc::new(
        CyclingTimer::new(
            "statistics",
            1.0,
            |s: &mut Session| {
                s.reset_counts();
            },
            session.clone(),
        )
        .unwrap()
        .with_clock(clock.clone() as Arc<dyn Clock>),
    );
    let handle = Arc::clone(&timer).spawn();
    while timer.fire_count() == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    timer.stop();
    handle.join().unwrap();

    assert_eq!(session.lock().counts().unwrap().get("bike"), Some(0));
    assert!(clock.elapsed() >= Duration::from_secs(60));
}

#[test]
fn locker_is_shared_between_clones() {
    let a = Locker::new(0u32);
    let b = a.clone();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let l = b.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    l.with(|v| *v += 1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*a.lock(), 4000);
}
