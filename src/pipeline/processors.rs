// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 每次重建时一起替换的处理器组

use ab_glyph::FontArc;

use crate::detection::BoxProcessor;
use crate::render::FrameAnnotator;
use crate::settings::{GeneralSettings, TrackingSettings};
use crate::tracking::{TrackIdentityCounter, TrackerFactory};

/// 跟踪器 + 计数器 + 过滤器 + 绘制器, 只在互斥区内整体替换
pub struct Processors {
    pub box_processor: BoxProcessor,
    pub counter: TrackIdentityCounter,
    pub annotator: FrameAnnotator,
}

impl Processors {
    pub fn build(
        general: &GeneralSettings,
        tracking: &TrackingSettings,
        factory: &dyn TrackerFactory,
        font: Option<FontArc>,
    ) -> anyhow::Result<Self> {
        let tracker = factory.build(tracking.kind, &tracking.params, general.box_threshold)?;
        Ok(Self {
            box_processor: BoxProcessor::new(
                &general.classes,
                &general.tracked_classes,
                general.box_threshold,
            ),
            counter: TrackIdentityCounter::new(
                tracker,
                tracking.params.min_hits,
                &general.classes,
                &general.tracked_classes,
            ),
            annotator: FrameAnnotator::new(&general.classes, &general.tracked_classes, font),
        })
    }
}
