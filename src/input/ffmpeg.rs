// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! FFmpeg 输入: 视频文件 / 本地摄像头
//!
//! 解码在独立线程中进行, 由 `RgbFilter` 把 YUV420P 帧转成 `RgbImage`
//! 经有界通道交给处理线程。文件模式阻塞发送 (不丢帧), 摄像头模式满则丢弃。

use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input};
use image::RgbImage;
use log::{debug, error, info, warn};

use super::source::FrameSource;
use crate::error::{Result, SentinelError};

/// 摄像头帧率未知时的估计值
pub const CAMERA_FPS_GUESS: f64 = 5.0;

const CHANNEL_DEPTH: usize = 8;
const MAX_DIMENSION: u32 = 8192;

#[derive(Clone)]
struct RgbFilter {
    tx: Sender<RgbImage>,
    blocking: bool,
    decoded: usize,
    dropped: usize,
}

impl FrameFilter for RgbFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> std::result::Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> std::result::Result<Option<Frame>, String> {
        let Some(img) = (unsafe { frame_to_rgb(&frame) }) else {
            self.dropped += 1;
            return Ok(None);
        };
        self.decoded += 1;

        if self.blocking {
            // 接收端关闭说明处理已停止
            self.tx.send(img).map_err(|_| "receiver closed".to_string())?;
        } else {
            match self.tx.try_send(img) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => self.dropped += 1,
                Err(TrySendError::Disconnected(_)) => return Err("receiver closed".to_string()),
            }
        }
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!(
            "✅ 解码线程退出: 解码 {} 帧, 丢弃 {} 帧",
            self.decoded, self.dropped
        );
    }
}

/// YUV420P → RGB, 空帧/损坏帧返回 None
unsafe fn frame_to_rgb(frame: &Frame) -> Option<RgbImage> {
    if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
        return None;
    }
    let raw = &*frame.as_ptr();
    let (w, h) = (raw.width as u32, raw.height as u32);
    if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
        return None;
    }

    let (y_plane, u_plane, v_plane) = (raw.data[0], raw.data[1], raw.data[2]);
    let y_stride = raw.linesize[0] as usize;
    let uv_stride = raw.linesize[1] as usize;
    if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
        return None;
    }
    if y_stride < w as usize || uv_stride < (w as usize).div_ceil(2) {
        return None;
    }

    let mut img = RgbImage::new(w, h);
    for (y, row) in img.rows_mut().enumerate() {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;
        for (x, px) in row.enumerate() {
            let luma = *y_plane.add(y_row + x) as i32;
            let u = *u_plane.add(uv_row + (x >> 1)) as i32 - 128;
            let v = *v_plane.add(uv_row + (x >> 1)) as i32 - 128;
            px.0 = yuv_to_rgb(luma, u, v);
        }
    }
    Some(img)
}

/// BT.601 定点系数 (×128)
#[inline]
fn yuv_to_rgb(luma: i32, u: i32, v: i32) -> [u8; 3] {
    [
        (luma + ((v * 179) >> 7)).clamp(0, 255) as u8,
        (luma - ((u * 44) >> 7) - ((v * 91) >> 7)).clamp(0, 255) as u8,
        (luma + ((u * 227) >> 7)).clamp(0, 255) as u8,
    ]
}

/// 视频文件或摄像头帧源
pub struct FfmpegSource {
    name: String,
    rx: Receiver<RgbImage>,
    fps: f64,
    live: bool,
    worker: Option<JoinHandle<()>>,
}

impl FfmpegSource {
    /// 打开视频文件
    pub fn open_file<P: AsRef<Path>>(path: P, fps: f64) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SentinelError::setup(format!("视频文件不存在: {}", path.display())));
        }
        let url = path.display().to_string();
        Self::spawn(url.clone(), Input::new(url), fps, false)
    }

    /// 打开本地摄像头 (DirectShow / AVFoundation / V4L2)
    pub fn open_camera(index: usize, width: u32, height: u32) -> Result<Self> {
        let url = camera_url(index)?;

        #[cfg(target_os = "windows")]
        let format = "dshow";
        #[cfg(target_os = "macos")]
        let format = "avfoundation";
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let format = "v4l2";

        let size = format!("{}x{}", width, height);
        info!("📷 摄像头: {} ({}, {})", url, format, size);
        let input = Input::new(url.clone())
            .set_format(format)
            .set_input_opts([("video_size", size.as_str())].into());
        Self::spawn(url, input, CAMERA_FPS_GUESS, true)
    }

    fn spawn(name: String, input: Input, fps: f64, live: bool) -> Result<Self> {
        let (tx, rx) = bounded(CHANNEL_DEPTH);
        let filter = RgbFilter {
            tx,
            blocking: !live,
            decoded: 0,
            dropped: 0,
        };

        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("rgb", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let ctx = FfmpegContext::builder()
            .input(input)
            .output(out)
            .build()
            .map_err(|e| SentinelError::setup(format!("无法打开输入 {}: {}", name, e)))?;
        let sch = ctx
            .start()
            .map_err(|e| SentinelError::setup(format!("无法启动解码 {}: {}", name, e)))?;

        let worker_name = name.clone();
        let worker = thread::spawn(move || {
            if let Err(e) = sch.wait() {
                error!("❌ 解码结束异常 {}: {}", worker_name, e);
            }
            debug!("解码循环结束: {}", worker_name);
        });

        Ok(Self {
            name,
            rx,
            fps,
            live,
            worker: Some(worker),
        })
    }
}

fn camera_url(index: usize) -> Result<String> {
    #[cfg(target_os = "windows")]
    {
        let devices = ez_ffmpeg::device::get_input_video_devices()
            .map_err(|e| SentinelError::setup(format!("获取摄像头列表失败: {}", e)))?;
        let name = devices
            .get(index)
            .ok_or_else(|| SentinelError::setup(format!("摄像头 {} 不存在", index)))?;
        Ok(format!("video={}", name))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(index.to_string())
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Ok(format!("/dev/video{}", index))
    }
}

impl FrameSource for FfmpegSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn total_frames(&self) -> Option<usize> {
        None
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        loop {
            match self.rx.recv_timeout(Duration::from_secs(5)) {
                Ok(img) => return Ok(Some(img)),
                Err(RecvTimeoutError::Timeout) if self.live => {
                    anyhow::bail!("摄像头 5 秒未产生画面")
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("⚠️ 等待解码超时: {}", self.name);
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        // 关闭接收端让解码线程退出
        let (_, rx) = bounded(0);
        drop(std::mem::replace(&mut self.rx, rx));
        if let Some(worker) = self.worker.take() {
            if !self.live {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv_conversion_matches_reference_points() {
        assert_eq!(yuv_to_rgb(0, 0, 0), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(255, 0, 0), [255, 255, 255]);
        // 纯红 (BT.601): Y=76 U=-43 V=127
        let [r, g, b] = yuv_to_rgb(76, -43, 127);
        assert!(r > 240 && g < 20 && b < 20);
    }
}
