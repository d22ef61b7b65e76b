#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // JSON 配置档
pub mod cycling_timer; // 定时清零
pub mod detection; // 检测接口与过滤
pub mod error; // 错误类型
pub mod input; // 帧源
pub mod locker; // 互斥区
pub mod output; // 视频/截图/推送
pub mod pipeline; // 帧处理流水线
pub mod render; // 绘制
pub mod settings; // 配置快照与修改入口
pub mod tracking; // 跟踪与计数

pub use crate::config::Profile;
pub use crate::cycling_timer::{Clock, CyclingTimer, ManualClock, SystemClock, TimeLeft, TimerState};
pub use crate::detection::{BoxProcessor, Detection, Detector, RawPrediction, ReplayDetector, TrackRow, TrackedBox};
pub use crate::error::{Result, SentinelError};
pub use crate::locker::Locker;
pub use crate::output::{FrameStream, ResultSaver, StreamMessage, VideoFormat};
pub use crate::pipeline::{FrameOutcome, FramePipeline, PipelineStatus, RunSummary};
pub use crate::settings::{Session, SettingOrchestrator, SharedSession};
pub use crate::tracking::{
    DefaultTrackerFactory, MultiObjectTracker, TrackIdentityCounter, TrackerFactory, TrackerKind,
    TrackerParams,
};

/// 本地时间戳, 各段用 `delimiter` 连接 (精确到纳秒, 用作文件名)
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
