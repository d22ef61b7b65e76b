// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 流水线状态与单帧结果

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;

use crate::tracking::ClassCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineStatus {
    Idle = 0,
    /// 检测器尚未加载, 轮询等待中
    WaitingForModel = 1,
    Processing = 2,
    Finished = 3,
    Aborted = 4,
    /// 启动错误或输入持续不可用
    Failed = 5,
}

impl PipelineStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PipelineStatus::WaitingForModel,
            2 => PipelineStatus::Processing,
            3 => PipelineStatus::Finished,
            4 => PipelineStatus::Aborted,
            5 => PipelineStatus::Failed,
            _ => PipelineStatus::Idle,
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::WaitingForModel => "waiting for model",
            PipelineStatus::Processing => "processing",
            PipelineStatus::Finished => "finished",
            PipelineStatus::Aborted => "aborted",
            PipelineStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 跨线程读取流水线状态
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<AtomicU8>);

impl StatusHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(PipelineStatus::Idle as u8)))
    }

    pub fn get(&self) -> PipelineStatus {
        PipelineStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, status: PipelineStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// 成功处理的一帧
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub index: usize,
    /// 显示尺寸, 已绘制检测框/计数/HUD
    pub display: RgbImage,
    /// 本帧出现了新计数的目标
    pub new_object: bool,
    /// 本帧绘制的已确认轨迹数
    pub tracked: usize,
    pub counts: Vec<(String, u64)>,
}

/// 单帧结果: 失败的帧被显式跳过, 不中断运行
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Processed(ProcessedFrame),
    Skipped { index: usize, reason: String },
}

impl FrameOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, FrameOutcome::Processed(_))
    }

    pub fn new_object(&self) -> bool {
        matches!(self, FrameOutcome::Processed(p) if p.new_object)
    }
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub frames_read: usize,
    pub processed: usize,
    pub skipped: usize,
    pub source_errors: usize,
    pub new_object_frames: usize,
    pub images_saved: usize,
    pub aborted: bool,
    pub counts: Option<ClassCounts>,
    /// 结果视频的缓存副本
    pub video: Option<PathBuf>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}
