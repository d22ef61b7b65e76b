// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// - Detector:     外部检测模型接口
/// - BoxProcessor: 置信度 + 类别白名单过滤
/// - Replay:       JSON Lines 检测回放
pub mod box_processor;
pub mod detector;
pub mod replay;
pub mod types;

pub use box_processor::BoxProcessor;
pub use detector::Detector;
pub use replay::ReplayDetector;
pub use types::{resize_boxes, Detection, RawPrediction, TrackRow, TrackedBox};
