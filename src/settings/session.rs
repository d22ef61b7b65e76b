// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 运行会话状态 (Session)
//!
//! 互斥区保护的唯一对象: 配置快照、两个流水线标志、检测器槽位与处理器。
//! 任何读写都必须经由 `Locker<Session>`。

use ab_glyph::FontArc;
use log::info;

use super::general::GeneralSettings;
use super::model::ModelSettings;
use super::tracking::TrackingSettings;
use crate::detection::Detector;
use crate::locker::Locker;
use crate::pipeline::Processors;
use crate::tracking::{ClassCounts, TrackerFactory};

/// 所有组件共享的会话句柄
pub type SharedSession = Locker<Session>;

pub struct Session {
    pub general: GeneralSettings,
    pub tracking: TrackingSettings,
    pub model: ModelSettings,
    /// 下一帧开始前重建跟踪器/处理器
    pub needs_reset: bool,
    /// 协作式中止, 流水线在每次迭代检查
    pub aborting: bool,
    pub detector: Option<Box<dyn Detector>>,
    pub processors: Option<Processors>,
}

impl Session {
    pub fn new(general: GeneralSettings, tracking: TrackingSettings, model: ModelSettings) -> Self {
        Self {
            general,
            tracking,
            model,
            needs_reset: true,
            aborting: false,
            detector: None,
            processors: None,
        }
    }

    pub fn shared(self) -> SharedSession {
        Locker::new(self)
    }

    pub fn is_model_loaded(&self) -> bool {
        self.detector.is_some()
    }

    /// 按当前配置重建处理器并清除 `needs_reset`
    ///
    /// 失败时保留旧处理器和标志, 下一帧重试
    pub fn rebuild(&mut self, factory: &dyn TrackerFactory, font: Option<&FontArc>) -> anyhow::Result<()> {
        let processors = Processors::build(&self.general, &self.tracking, factory, font.cloned())?;
        info!(
            "🎯 处理器已重建: 跟踪器 {} (min_hits={}, max_age={}, det={:.2}), 阈值 {:.2}",
            processors.counter.tracker_name(),
            processors.counter.min_hits(),
            self.tracking.params.max_age,
            self.tracking.params.detection_threshold,
            self.general.box_threshold
        );
        self.processors = Some(processors);
        self.needs_reset = false;
        Ok(())
    }

    /// 清空账本并归零计数, 不重建跟踪器; 尚无处理器时返回 false
    pub fn reset_counts(&mut self) -> bool {
        match self.processors.as_mut() {
            Some(p) => {
                p.counter.reset_counts();
                true
            }
            None => false,
        }
    }

    pub fn counts(&self) -> Option<ClassCounts> {
        self.processors.as_ref().map(|p| p.counter.counts().clone())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(
            GeneralSettings::default(),
            TrackingSettings::default(),
            ModelSettings::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{DefaultTrackerFactory, TrackerKind};

    #[test]
    fn rebuild_follows_tracking_settings() {
        let mut session = Session::default();
        session.tracking = TrackingSettings::for_kind(TrackerKind::Iou);
        session.tracking.params.min_hits = 2;
        assert!(session.counts().is_none());
        assert!(!session.reset_counts());

        session.rebuild(&DefaultTrackerFactory, None).unwrap();
        assert!(!session.needs_reset);
        let p = session.processors.as_ref().unwrap();
        assert_eq!(p.counter.tracker_name(), "iou");
        assert_eq!(p.counter.min_hits(), 2);
        assert_eq!(session.counts().unwrap().total(), 0);
    }
}
