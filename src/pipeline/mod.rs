// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 处理流水线 (Pipeline)
///
/// 帧源 → [互斥区: 重建? → 检测 → 过滤 → 跟踪 → 计数 → 绘制] → 推送 / 保存
pub mod frame_pipeline;
pub mod processors;
pub mod status;

pub use frame_pipeline::{
    default_cache_folder, resize_frame, FramePipeline, MAX_CONSECUTIVE_SOURCE_ERRORS,
    MODEL_POLL_INTERVAL, PROGRESS_EVERY,
};
pub use processors::Processors;
pub use status::{FrameOutcome, PipelineStatus, ProcessedFrame, RunSummary, StatusHandle};
