// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 跟踪器工厂
//!
//! 跟踪器是一个封闭集合, 由 `TrackerKind` 选择, 通过工厂构建。
//! 流水线持有 `dyn TrackerFactory`, 测试可注入脚本跟踪器。

use std::fmt;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use super::bytetrack::ByteTracker;
use super::iou::IouTracker;
use super::tracker::MultiObjectTracker;
use crate::error::{Result, SentinelError};

/// 跟踪器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    #[default]
    ByteTrack,
    Iou,
}

impl TrackerKind {
    pub const ALL: [TrackerKind; 2] = [TrackerKind::ByteTrack, TrackerKind::Iou];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerKind::ByteTrack => "bytetrack",
            TrackerKind::Iou => "iou",
        }
    }

    /// 切换到该跟踪器时使用的默认参数
    pub fn default_params(&self) -> TrackerParams {
        match self {
            TrackerKind::ByteTrack => TrackerParams {
                min_hits: 5,
                max_age: 1000,
                detection_threshold: 0.4,
            },
            TrackerKind::Iou => TrackerParams {
                min_hits: 3,
                max_age: 30,
                detection_threshold: 0.4,
            },
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackerKind {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bytetrack" | "byte_track" | "byte" => Ok(TrackerKind::ByteTrack),
            "iou" => Ok(TrackerKind::Iou),
            _ => Err(SentinelError::invalid(
                "tracker",
                s,
                "expected one of: bytetrack, iou",
            )),
        }
    }
}

/// 跟踪器数值参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerParams {
    /// 轨迹 age 必须严格大于该值才会被绘制/计数
    pub min_hits: u32,
    /// 轨迹最多允许连续丢失的帧数
    pub max_age: u32,
    /// 高分检测阈值
    pub detection_threshold: f32,
}

impl Default for TrackerParams {
    fn default() -> Self {
        TrackerKind::default().default_params()
    }
}

impl TrackerParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_age == 0 {
            return Err(SentinelError::invalid("max_age", self.max_age, "must be at least 1"));
        }
        if !(self.detection_threshold > 0.0 && self.detection_threshold < 1.0) {
            return Err(SentinelError::invalid(
                "detection_threshold",
                self.detection_threshold,
                "must be between 0 and 1 (exclusive)",
            ));
        }
        Ok(())
    }
}

pub trait TrackerFactory: Send + Sync {
    fn build(
        &self,
        kind: TrackerKind,
        params: &TrackerParams,
        box_threshold: f32,
    ) -> anyhow::Result<Box<dyn MultiObjectTracker>>;
}

/// 内置跟踪器工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTrackerFactory;

impl TrackerFactory for DefaultTrackerFactory {
    fn build(
        &self,
        kind: TrackerKind,
        params: &TrackerParams,
        box_threshold: f32,
    ) -> anyhow::Result<Box<dyn MultiObjectTracker>> {
        params.validate()?;
        let tracker: Box<dyn MultiObjectTracker> = match kind {
            TrackerKind::ByteTrack => Box::new(ByteTracker::new(params, box_threshold)),
            TrackerKind::Iou => Box::new(IouTracker::new(params, box_threshold)),
        };
        info!(
            "🎯 跟踪器: {} (min_hits={}, max_age={}, det_thresh={:.2})",
            kind, params.min_hits, params.max_age, params.detection_threshold
        );
        Ok(tracker)
    }
}
