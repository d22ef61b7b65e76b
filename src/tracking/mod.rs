// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 跟踪系统 (Tracking System)
///
/// - Tracker:  多目标跟踪器接口 + 卡尔曼滤波 + IoU 工具
/// - ByteTrack / IoU: 内置跟踪器
/// - Factory:  按 `TrackerKind` 构建跟踪器
/// - Counter:  按 ID 只计数一次
pub mod bytetrack;
pub mod counter;
pub mod factory;
pub mod iou;
pub mod tracker;

pub use bytetrack::ByteTracker;
pub use counter::{ClassCounts, LedgerEntry, TrackIdentityCounter};
pub use factory::{DefaultTrackerFactory, TrackerFactory, TrackerKind, TrackerParams};
pub use iou::IouTracker;
pub use tracker::{compute_iou, ActiveTrack, MultiObjectTracker};
