// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图片序列输入 (目录中按文件名排序的帧)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbImage;
use log::info;

use super::source::FrameSource;
use crate::error::{Result, SentinelError};

/// 未指定时的默认帧率
pub const DEFAULT_SEQUENCE_FPS: f64 = 25.0;

const EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub struct ImageSequenceSource {
    root: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    fps: f64,
}

impl ImageSequenceSource {
    /// 打开目录; 目录不存在或没有图片属于启动错误
    pub fn open<P: AsRef<Path>>(dir: P, fps: Option<f64>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let entries = fs::read_dir(&root).map_err(|e| {
            SentinelError::setup(format!("无法打开输入目录 {}: {}", root.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SentinelError::setup(format!(
                "输入目录中没有图片: {}",
                root.display()
            )));
        }

        let fps = fps.filter(|f| f.is_finite() && *f > 0.0).unwrap_or(DEFAULT_SEQUENCE_FPS);
        info!("✅ 图片序列: {} ({} 帧 @ {:.1}fps)", root.display(), files.len(), fps);
        Ok(Self {
            root,
            files,
            cursor: 0,
            fps,
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> String {
        self.root.display().to_string()
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn total_frames(&self) -> Option<usize> {
        Some(self.files.len())
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let img = image::open(path).with_context(|| format!("读取帧失败: {}", path.display()))?;
        Ok(Some(img.to_rgb8()))
    }
}
