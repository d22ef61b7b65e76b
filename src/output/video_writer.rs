// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 视频容器写入器
//!
//! - `GifVideoWriter`: 纯 Rust, 基于 `image` 的 GIF 编码器 (默认)
//! - `Mp4VideoWriter`: 帧先落盘为 JPEG, 关闭时用 FFmpeg 转码为 MP4 (`ffmpeg` 功能)

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::SentinelError;

pub trait VideoWriter: Send {
    fn path(&self) -> &Path;

    /// 追加一帧 (尺寸已由调用方统一)
    fn write_frame(&mut self, frame: &RgbImage) -> anyhow::Result<()>;

    /// 刷新并关闭, 重复调用无副作用
    fn finish(&mut self) -> anyhow::Result<()>;
}

/// 输出视频容器格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Gif,
    Mp4,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Gif => "gif",
            VideoFormat::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for VideoFormat {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gif" => Ok(VideoFormat::Gif),
            "mp4" => Ok(VideoFormat::Mp4),
            _ => Err(SentinelError::invalid("video_format", s, "expected gif or mp4")),
        }
    }
}

/// 按格式打开写入器
pub fn open_writer(
    format: VideoFormat,
    path: &Path,
    width: u32,
    height: u32,
    fps: f64,
) -> anyhow::Result<Box<dyn VideoWriter>> {
    match format {
        VideoFormat::Gif => Ok(Box::new(GifVideoWriter::create(path, width, height, fps)?)),
        #[cfg(feature = "ffmpeg")]
        VideoFormat::Mp4 => Ok(Box::new(mp4::Mp4VideoWriter::create(path, width, height, fps)?)),
        #[cfg(not(feature = "ffmpeg"))]
        VideoFormat::Mp4 => anyhow::bail!("MP4 输出需要启用 `ffmpeg` 功能"),
    }
}

// ========== GIF ==========

pub struct GifVideoWriter {
    path: PathBuf,
    encoder: Option<GifEncoder<BufWriter<File>>>,
    delay: Delay,
    frames: usize,
}

impl GifVideoWriter {
    pub fn create(path: &Path, _width: u32, _height: u32, fps: f64) -> anyhow::Result<Self> {
        let file = File::create(path).with_context(|| format!("创建视频文件失败: {}", path.display()))?;
        // speed 10: 量化质量与速度的折中
        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), 10);
        encoder.set_repeat(Repeat::Infinite)?;

        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 25.0 };
        let delay = Delay::from_numer_denom_ms(1000, fps.round().max(1.0) as u32);

        Ok(Self {
            path: path.to_path_buf(),
            encoder: Some(encoder),
            delay,
            frames: 0,
        })
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl VideoWriter for GifVideoWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_frame(&mut self, frame: &RgbImage) -> anyhow::Result<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            anyhow::bail!("视频已关闭: {}", self.path.display());
        };
        let rgba = DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
        encoder.encode_frame(Frame::from_parts(rgba, 0, 0, self.delay))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        // 编码器 drop 时写入文件尾
        drop(self.encoder.take());
        Ok(())
    }
}

// ========== MP4 (FFmpeg) ==========

#[cfg(feature = "ffmpeg")]
mod mp4 {
    use std::path::{Path, PathBuf};

    use anyhow::{anyhow, Context};
    use ez_ffmpeg::{FfmpegContext, Input};
    use image::RgbImage;
    use log::info;

    use super::VideoWriter;

    pub struct Mp4VideoWriter {
        path: PathBuf,
        staging: PathBuf,
        fps: f64,
        frames: usize,
        finished: bool,
    }

    impl Mp4VideoWriter {
        pub fn create(path: &Path, _width: u32, _height: u32, fps: f64) -> anyhow::Result<Self> {
            let staging = path.with_extension("frames");
            std::fs::create_dir_all(&staging)
                .with_context(|| format!("创建帧缓存目录失败: {}", staging.display()))?;
            Ok(Self {
                path: path.to_path_buf(),
                staging,
                fps: if fps > 0.0 { fps } else { 25.0 },
                frames: 0,
                finished: false,
            })
        }
    }

    impl VideoWriter for Mp4VideoWriter {
        fn path(&self) -> &Path {
            &self.path
        }

        fn write_frame(&mut self, frame: &RgbImage) -> anyhow::Result<()> {
            let file = self.staging.join(format!("{:08}.jpg", self.frames));
            frame.save(&file)?;
            self.frames += 1;
            Ok(())
        }

        fn finish(&mut self) -> anyhow::Result<()> {
            if self.finished {
                return Ok(());
            }
            self.finished = true;
            if self.frames == 0 {
                let _ = std::fs::remove_dir_all(&self.staging);
                return Ok(());
            }

            let pattern = self.staging.join("%08d.jpg");
            let framerate = format!("{:.3}", self.fps);
            let input = Input::new(pattern.to_string_lossy().to_string())
                .set_format("image2")
                .set_input_opts([("framerate", framerate.as_str())].into());

            let ctx = FfmpegContext::builder()
                .input(input)
                .output(self.path.to_string_lossy().to_string())
                .build()
                .map_err(|e| anyhow!("MP4 转码构建失败: {}", e))?;
            let sch = ctx.start().map_err(|e| anyhow!("MP4 转码启动失败: {}", e))?;
            sch.wait().map_err(|e| anyhow!("MP4 转码失败: {}", e))?;

            info!("💾 MP4 写入完成: {} ({} 帧)", self.path.display(), self.frames);
            let _ = std::fs::remove_dir_all(&self.staging);
            Ok(())
        }
    }
}

#[cfg(feature = "ffmpeg")]
pub use mp4::Mp4VideoWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gif_writer_produces_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.gif");
        let mut w = GifVideoWriter::create(&path, 8, 8, 10.0).unwrap();
        w.write_frame(&RgbImage::from_pixel(8, 8, image::Rgb([255, 0, 0]))).unwrap();
        w.write_frame(&RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 255]))).unwrap();
        w.finish().unwrap();
        w.finish().unwrap();
        assert_eq!(w.frames(), 2);
        assert!(w.write_frame(&RgbImage::new(8, 8)).is_err());

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));
    }

    #[test]
    fn parses_format() {
        assert_eq!("MP4".parse::<VideoFormat>().unwrap(), VideoFormat::Mp4);
        assert_eq!(VideoFormat::default().extension(), "gif");
        assert!("avi".parse::<VideoFormat>().is_err());
    }
}
