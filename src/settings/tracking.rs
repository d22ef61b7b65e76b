// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 跟踪设置 (Tracking settings)

use crate::tracking::{TrackerKind, TrackerParams};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackingSettings {
    pub kind: TrackerKind,
    pub params: TrackerParams,
}

impl TrackingSettings {
    /// 使用该跟踪器的默认参数
    pub fn for_kind(kind: TrackerKind) -> Self {
        Self {
            kind,
            params: kind.default_params(),
        }
    }
}
