// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 结果保存 (Result saver)
//!
//! 一次运行对应一个视频容器:
//! - 视频: `<output>/output/videos/<时间戳>.<ext>`
//! - 截图: `<output>/output/images/<时间戳>.png`
//! - 运行结束时关闭写入器, 并复制一份到本地缓存目录
//!
//! `finish()` 显式收尾; 未调用时 `Drop` 兜底, 保证任何退出路径都会关闭文件。

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use log::{error, info, warn};

use super::video_writer::{open_writer, VideoFormat, VideoWriter};
use crate::error::{Result, SentinelError};
use crate::gen_time_string;

pub struct ResultSaver {
    output_folder: PathBuf,
    cache_folder: PathBuf,
    format: VideoFormat,
    video_path: PathBuf,
    writer: Option<Box<dyn VideoWriter>>,
    frame_size: Option<(u32, u32)>,
    appended: usize,
    images_saved: usize,
    finished: bool,
}

impl ResultSaver {
    /// 创建输出目录; 目录不可写属于启动错误
    pub fn create<P: AsRef<Path>, Q: AsRef<Path>>(
        output_folder: P,
        cache_folder: Q,
        format: VideoFormat,
    ) -> Result<Self> {
        let output_folder = output_folder.as_ref().to_path_buf();
        let cache_folder = cache_folder.as_ref().to_path_buf();

        let videos = output_folder.join("output").join("videos");
        let images = output_folder.join("output").join("images");
        let cache_videos = cache_folder.join("videos");
        for dir in [&videos, &images, &cache_videos] {
            fs::create_dir_all(dir).map_err(|e| {
                SentinelError::setup(format!("无法创建输出目录 {}: {}", dir.display(), e))
            })?;
        }
        info!("💾 输出目录: {}", output_folder.join("output").display());

        let video_path = videos.join(format!("{}.{}", gen_time_string("-"), format.extension()));
        Ok(Self {
            output_folder,
            cache_folder,
            format,
            video_path,
            writer: None,
            frame_size: None,
            appended: 0,
            images_saved: 0,
            finished: false,
        })
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn cache_copy_path(&self) -> PathBuf {
        let name = self.video_path.file_name().map(PathBuf::from).unwrap_or_default();
        self.cache_folder.join("videos").join(name)
    }

    pub fn images_folder(&self) -> PathBuf {
        self.output_folder.join("output").join("images")
    }

    pub fn is_initiated(&self) -> bool {
        self.writer.is_some()
    }

    pub fn appended(&self) -> usize {
        self.appended
    }

    pub fn images_saved(&self) -> usize {
        self.images_saved
    }

    /// 打开视频写入器
    pub fn initiate(&mut self, width: u32, height: u32, fps: f64) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(SentinelError::setup(format!("非法视频尺寸 {}x{}", width, height)));
        }
        let writer = open_writer(self.format, &self.video_path, width, height, fps)
            .map_err(|e| SentinelError::setup(format!("{:#}", e)))?;
        info!(
            "💾 视频写入器已创建: {} ({}x{} @ {:.1}fps)",
            self.video_path.display(),
            width,
            height,
            fps
        );
        self.writer = Some(writer);
        self.frame_size = Some((width, height));
        Ok(())
    }

    /// 追加一帧; 尚未 `initiate` 时只记录日志
    pub fn append(&mut self, frame: &RgbImage) {
        let (Some(writer), Some((w, h))) = (self.writer.as_mut(), self.frame_size) else {
            error!("❌ 尚未创建视频写入器, 请先调用 initiate");
            return;
        };

        let result = if frame.dimensions() == (w, h) {
            writer.write_frame(frame)
        } else {
            writer.write_frame(&imageops::resize(frame, w, h, FilterType::Triangle))
        };
        match result {
            Ok(()) => self.appended += 1,
            Err(e) => warn!("⚠️ 视频帧写入失败: {:#}", e),
        }
    }

    /// 保存一张截图, 返回文件路径
    pub fn save_image(&mut self, frame: &RgbImage) -> Result<PathBuf> {
        let path = self.images_folder().join(format!("{}.png", gen_time_string("-")));
        frame.save(&path)?;
        self.images_saved += 1;
        info!("💾 保存截图: {}", path.display());
        Ok(path)
    }

    /// 关闭写入器并复制到缓存目录, 返回缓存副本路径
    pub fn finish(&mut self) -> Result<Option<PathBuf>> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;

        let Some(mut writer) = self.writer.take() else {
            return Ok(None);
        };
        writer
            .finish()
            .map_err(|e| SentinelError::Io(std::io::Error::other(format!("{:#}", e))))?;

        let copy = self.cache_copy_path();
        fs::copy(&self.video_path, &copy)?;
        info!(
            "💾 视频已保存: {} ({} 帧), 缓存副本: {}",
            self.video_path.display(),
            self.appended,
            copy.display()
        );
        Ok(Some(copy))
    }
}

impl Drop for ResultSaver {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                error!("❌ 关闭视频写入器失败: {}", e);
            }
        }
    }
}
