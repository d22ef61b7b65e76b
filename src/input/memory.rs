// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 内存帧源 (合成测试、单张图片)

use std::collections::VecDeque;

use image::RgbImage;

use super::source::FrameSource;

pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    total: usize,
    fps: f64,
    live: bool,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            total: frames.len(),
            frames: frames.into(),
            fps,
            live: false,
        }
    }

    /// 标记为实时源 (不做节奏控制, 不报告总帧数)
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }
}

impl FrameSource for MemorySource {
    fn name(&self) -> String {
        format!("memory ({} frames)", self.total)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn total_frames(&self) -> Option<usize> {
        (!self.live).then_some(self.total)
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }
}
