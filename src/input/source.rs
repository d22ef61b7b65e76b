// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧源接口与通用适配器

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbImage;
use log::{debug, info};

use crate::gen_time_string;

/// 帧源: 文件为有限序列, 摄像头为无限序列
pub trait FrameSource: Send {
    fn name(&self) -> String;

    /// 源帧率 (未知时返回猜测值)
    fn fps(&self) -> f64;

    /// 总帧数, 直播源为 None
    fn total_frames(&self) -> Option<usize>;

    /// 实时源 (摄像头) 不做节奏控制
    fn is_live(&self) -> bool {
        false
    }

    /// 下一帧; `Ok(None)` 表示源已结束
    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn fps(&self) -> f64 {
        (**self).fps()
    }

    fn total_frames(&self) -> Option<usize> {
        (**self).total_frames()
    }

    fn is_live(&self) -> bool {
        (**self).is_live()
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        (**self).next_frame()
    }
}

// ========== 跳帧 ==========

/// 跳过开头的 N 帧 (文件模式调试用)
pub struct SkipFrames<S> {
    inner: S,
    remaining: usize,
    skip: usize,
}

impl<S: FrameSource> SkipFrames<S> {
    pub fn new(inner: S, skip: usize) -> Self {
        Self {
            inner,
            remaining: skip,
            skip,
        }
    }
}

impl<S: FrameSource> FrameSource for SkipFrames<S> {
    fn name(&self) -> String {
        format!("{} (skip {})", self.inner.name(), self.skip)
    }

    fn fps(&self) -> f64 {
        self.inner.fps()
    }

    fn total_frames(&self) -> Option<usize> {
        self.inner.total_frames().map(|t| t.saturating_sub(self.skip))
    }

    fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        while self.remaining > 0 {
            self.remaining -= 1;
            if self.inner.next_frame()?.is_none() {
                self.remaining = 0;
                return Ok(None);
            }
        }
        self.inner.next_frame()
    }
}

// ========== 保存原始帧 ==========

/// 每一帧原图另存为 `<output>/output/frames/<时间戳>.jpg`
pub struct SaveEachFrame<S> {
    inner: S,
    folder: PathBuf,
    saved: usize,
}

impl<S: FrameSource> SaveEachFrame<S> {
    pub fn new<P: AsRef<Path>>(inner: S, output_folder: P) -> anyhow::Result<Self> {
        let folder = output_folder.as_ref().join("output").join("frames");
        fs::create_dir_all(&folder).with_context(|| format!("创建帧目录失败: {}", folder.display()))?;
        info!("💾 保存所有原始帧到 {}", folder.display());
        Ok(Self {
            inner,
            folder,
            saved: 0,
        })
    }

    pub fn saved(&self) -> usize {
        self.saved
    }
}

impl<S: FrameSource> FrameSource for SaveEachFrame<S> {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn fps(&self) -> f64 {
        self.inner.fps()
    }

    fn total_frames(&self) -> Option<usize> {
        self.inner.total_frames()
    }

    fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        let frame = self.inner.next_frame()?;
        if let Some(img) = &frame {
            // 同一时间戳内的多帧用序号区分
            let path = self
                .folder
                .join(format!("{}_{:06}.jpg", gen_time_string("-"), self.saved));
            img.save(&path)
                .with_context(|| format!("保存原始帧失败: {}", path.display()))?;
            self.saved += 1;
            debug!("保存原始帧 {}", path.display());
        }
        Ok(frame)
    }
}
