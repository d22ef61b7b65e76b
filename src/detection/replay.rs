// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 回放检测器 (Replay detector)
//!
//! 从 JSON Lines 文件逐帧回放预先计算好的检测结果, 每行一个数组:
//! `[{"x1":..,"y1":..,"x2":..,"y2":..,"confidence":..,"class_id":..}, ...]`
//! 空行视为该帧无检测。回放结束后每帧返回空列表。

use std::fs;
use std::path::Path;

use anyhow::Context;
use image::RgbImage;
use log::info;

use super::detector::Detector;
use super::types::RawPrediction;

pub struct ReplayDetector {
    name: String,
    frames: Vec<Vec<RawPrediction>>,
    cursor: usize,
    looped: bool,
}

impl ReplayDetector {
    pub fn from_frames(frames: Vec<Vec<RawPrediction>>) -> Self {
        Self {
            name: "replay".to_string(),
            frames,
            cursor: 0,
            looped: false,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("读取检测回放文件失败: {}", path.display()))?;

        let mut frames = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                frames.push(Vec::new());
                continue;
            }
            let preds: Vec<RawPrediction> = serde_json::from_str(line)
                .with_context(|| format!("{}:{} 不是合法的检测数组", path.display(), lineno + 1))?;
            frames.push(preds);
        }

        info!("✅ 检测回放已加载: {} 帧 ({})", frames.len(), path.display());
        Ok(Self {
            name: format!("replay:{}", path.display()),
            ..Self::from_frames(frames)
        })
    }

    /// 回放结束后从头开始
    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Detector for ReplayDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(
        &mut self,
        _image: &RgbImage,
        conf_hint: f32,
        _device: &str,
    ) -> anyhow::Result<Vec<RawPrediction>> {
        if self.looped && !self.frames.is_empty() && self.cursor >= self.frames.len() {
            self.cursor = 0;
        }
        let preds = match self.frames.get(self.cursor) {
            Some(frame) => frame
                .iter()
                .filter(|p| p.confidence >= conf_hint)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        self.cursor += 1;
        Ok(preds)
    }
}
