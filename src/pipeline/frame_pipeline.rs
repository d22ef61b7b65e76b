// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧处理流水线 (Frame pipeline)
//!
//! 每帧:
//!   1. 进入互斥区; 若 `needs_reset` 则整体重建跟踪器/过滤器/绘制器
//!   2. 缩放到推理尺寸 → 检测 → 过滤 → 跟踪 → 计数
//!   3. 检测框映射回显示尺寸, 绘制到原图的显示尺寸副本上
//!   4. 离开互斥区后再推送画面、写视频、存截图
//!
//! 单帧失败 (包括 panic) 只跳过该帧; 只有启动错误会终止运行。

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ab_glyph::FontArc;
use fast_image_resize as fr;
use image::RgbImage;
use log::{debug, error, info, log_enabled, warn, Level};

use super::status::{FrameOutcome, PipelineStatus, ProcessedFrame, RunSummary, StatusHandle};
use crate::cycling_timer::CyclingTimer;
use crate::detection::resize_boxes;
use crate::error::{Result, SentinelError};
use crate::input::{FrameSource, SaveEachFrame, SkipFrames};
use crate::output::{FrameStream, ResultSaver};
use crate::render::{draw_fps_text, draw_progress_bar};
use crate::settings::{Session, SharedSession};
use crate::tracking::{TrackIdentityCounter, TrackerFactory};

/// 等待模型加载的轮询间隔
pub const MODEL_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 每隔多少帧打印一次进度
pub const PROGRESS_EVERY: usize = 50;
/// 连续读帧失败达到该次数视为输入不可用
pub const MAX_CONSECUTIVE_SOURCE_ERRORS: usize = 25;

/// FPS 统计窗口
const FPS_WINDOW: usize = 10;
/// 样本数超过该值才显示 FPS
const FPS_MIN_SAMPLES: usize = 3;

pub struct FramePipeline {
    session: SharedSession,
    factory: Arc<dyn TrackerFactory>,
    font: Option<FontArc>,
    stream: Option<FrameStream>,
    cache_folder: PathBuf,
    model_poll: Duration,
    status: StatusHandle,
    frame_times: VecDeque<f64>,
    timer: Option<Arc<CyclingTimer<Session>>>,
}

impl FramePipeline {
    pub fn new(session: SharedSession, factory: Arc<dyn TrackerFactory>) -> Self {
        Self {
            session,
            factory,
            font: None,
            stream: None,
            cache_folder: default_cache_folder(),
            model_poll: MODEL_POLL_INTERVAL,
            status: StatusHandle::new(),
            frame_times: VecDeque::with_capacity(FPS_WINDOW),
            timer: None,
        }
    }

    /// 文本绘制字体; 没有字体时只画框和色块
    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    /// 每帧推送到实时画面通道
    pub fn with_stream(mut self, stream: FrameStream) -> Self {
        self.stream = Some(stream);
        self
    }

    /// 结果视频副本目录
    pub fn with_cache_folder<P: Into<PathBuf>>(mut self, folder: P) -> Self {
        self.cache_folder = folder.into();
        self
    }

    pub fn with_model_poll(mut self, interval: Duration) -> Self {
        self.model_poll = interval;
        self
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.get()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// 处理整个帧源, 直到结束或中止
    ///
    /// 返回 Err 仅限启动错误 (输出目录、视频写入器、定时器、输入持续不可用);
    /// 任何退出路径都会停止定时器、关闭结果视频、发布 `Finished` 并清除中止标志。
    pub fn run<S: FrameSource + 'static>(&mut self, source: S) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut saver = None;
        let mut timer_handle = None;

        let result = self.run_inner(Box::new(source), &mut saver, &mut timer_handle, &mut summary);

        // ===== 收尾: 任何路径都要执行 =====
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        if let Some(handle) = timer_handle {
            if handle.join().is_err() {
                error!("❌ 定时器线程异常退出");
            }
        }
        if let Some(mut saver) = saver {
            summary.images_saved = saver.images_saved();
            match saver.finish() {
                Ok(copy) => summary.video = copy,
                Err(e) => error!("❌ 结果视频收尾失败: {}", e),
            }
        }
        if let Some(stream) = &self.stream {
            stream.finish();
        }

        let mut session = self.session.lock();
        if session.aborting {
            summary.aborted = true;
            session.aborting = false;
        }
        summary.counts = session.counts();
        drop(session);

        summary.elapsed = started.elapsed();
        let status = match &result {
            Err(e) => {
                error!("❌ 运行失败: {}", e);
                PipelineStatus::Failed
            }
            Ok(()) if summary.aborted => PipelineStatus::Aborted,
            Ok(()) => PipelineStatus::Finished,
        };
        self.status.set(status);
        info!(
            "📊 运行结束 ({}): 读取 {} 帧 | 处理 {} | 跳过 {} | 平均 {:.1}fps",
            status,
            summary.frames_read,
            summary.processed,
            summary.skipped,
            summary.average_fps()
        );

        result.map(|_| summary)
    }

    /// 启动与主循环; 创建的资源放进调用方的槽位, 由 `run` 统一收尾
    fn run_inner(
        &mut self,
        mut source: Box<dyn FrameSource>,
        saver_slot: &mut Option<ResultSaver>,
        timer_slot: &mut Option<JoinHandle<()>>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let general = self.session.lock().general.clone();

        if general.skip_frames > 0 && !source.is_live() {
            source = Box::new(SkipFrames::new(source, general.skip_frames));
        }
        if general.save_all_frames {
            source = Box::new(
                SaveEachFrame::new(source, &general.output_folder)
                    .map_err(|e| SentinelError::setup(format!("{:#}", e)))?,
            );
        }

        info!(
            "✅ 开始运行: {} ({:.1}fps, {})",
            source.name(),
            source.fps(),
            source
                .total_frames()
                .map(|t| format!("{} 帧", t))
                .unwrap_or_else(|| "实时".to_string())
        );

        if general.save_results || general.save_new_objects {
            let saver = saver_slot.insert(ResultSaver::create(
                &general.output_folder,
                &self.cache_folder,
                general.video_format,
            )?);
            if general.save_results {
                saver.initiate(general.screen_width, general.screen_height, source.fps())?;
            }
        }

        *timer_slot = self.start_timer(general.reset_stats_min)?;

        if !self.wait_for_model() {
            summary.aborted = true;
            return Ok(());
        }
        self.status.set(PipelineStatus::Processing);
        self.process_source(
            source.as_mut(),
            saver_slot.as_mut(),
            summary,
            general.realistic_processing,
        )
    }

    /// 自动清零定时器, 周期为 0 时不启动
    fn start_timer(&mut self, minutes: f64) -> Result<Option<JoinHandle<()>>> {
        if minutes <= 0.0 {
            return Ok(None);
        }
        let timer = Arc::new(CyclingTimer::new(
            "statistics",
            minutes,
            |session: &mut Session| {
                if session.reset_counts() {
                    info!("📊 定时清零计数");
                }
            },
            self.session.clone(),
        )?);
        self.timer = Some(Arc::clone(&timer));
        Ok(Some(timer.spawn()))
    }

    /// 轮询直到检测器可用; 期间被中止返回 false
    fn wait_for_model(&self) -> bool {
        let mut announced = false;
        loop {
            {
                let session = self.session.lock();
                if session.aborting {
                    return false;
                }
                if session.is_model_loaded() {
                    return true;
                }
            }
            if !announced {
                info!("⏳ 等待检测器加载...");
                self.status.set(PipelineStatus::WaitingForModel);
                announced = true;
            }
            thread::sleep(self.model_poll);
        }
    }

    fn process_source(
        &mut self,
        source: &mut dyn FrameSource,
        mut saver: Option<&mut ResultSaver>,
        summary: &mut RunSummary,
        realistic: bool,
    ) -> Result<()> {
        let total = source.total_frames();
        let pace = (realistic && !source.is_live() && source.fps() > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / source.fps()));
        let mut consecutive_errors = 0usize;
        let mut index = 0usize;

        loop {
            if self.session.lock().aborting {
                info!("🛑 收到中止请求, 停止处理");
                summary.aborted = true;
                return Ok(());
            }

            let iteration = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => {
                    consecutive_errors = 0;
                    frame
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    summary.source_errors += 1;
                    consecutive_errors += 1;
                    warn!("⚠️ 读取第 {} 帧失败: {:#}", index, e);
                    if consecutive_errors >= MAX_CONSECUTIVE_SOURCE_ERRORS {
                        return Err(SentinelError::setup(format!(
                            "输入连续 {} 次读取失败: {}",
                            consecutive_errors,
                            source.name()
                        )));
                    }
                    index += 1;
                    continue;
                }
            };
            summary.frames_read += 1;

            match self.process_frame(index, &frame) {
                FrameOutcome::Processed(out) => {
                    summary.processed += 1;
                    if let Some(stream) = &self.stream {
                        stream.publish_frame(&out.display);
                    }
                    if let Some(saver) = saver.as_deref_mut() {
                        let (save_results, save_new) = {
                            let s = self.session.lock();
                            (s.general.save_results, s.general.save_new_objects)
                        };
                        if save_results {
                            saver.append(&out.display);
                        }
                        if out.new_object {
                            summary.new_object_frames += 1;
                            if save_new {
                                if let Err(e) = saver.save_image(&out.display) {
                                    warn!("⚠️ 截图保存失败: {}", e);
                                }
                            }
                        }
                    } else if out.new_object {
                        summary.new_object_frames += 1;
                    }
                }
                FrameOutcome::Skipped { .. } => summary.skipped += 1,
            }

            index += 1;
            if index % PROGRESS_EVERY == 0 {
                match total {
                    Some(t) if t > 0 => info!(
                        "📊 {:.0}% done ({}/{})",
                        index as f64 / t as f64 * 100.0,
                        index,
                        t
                    ),
                    _ => info!("📊 已处理 {} 帧", index),
                }
            }

            if let Some(period) = pace {
                let spent = iteration.elapsed();
                if spent < period {
                    thread::sleep(period - spent);
                }
            }
        }
    }

    /// 处理单帧; 错误与 panic 都转换为 `Skipped`
    pub fn process_frame(&mut self, index: usize, frame: &RgbImage) -> FrameOutcome {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.locked_step(index, frame)));

        let mut out = match result {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                error!("❌ 第 {} 帧处理失败: {:#}", index, e);
                return FrameOutcome::Skipped {
                    index,
                    reason: e.to_string(),
                };
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!("❌ 第 {} 帧处理 panic: {}", index, reason);
                return FrameOutcome::Skipped { index, reason };
            }
        };

        // HUD 不读共享状态, 锁外绘制
        self.record_frame_time(started.elapsed().as_secs_f64());
        if let Some(fps) = self.fps() {
            draw_fps_text(&mut out.display, self.font.as_ref(), fps);
        }
        if let Some(left) = self.timer.as_ref().and_then(|t| t.time_left()) {
            draw_progress_bar(
                &mut out.display,
                self.font.as_ref(),
                &format!("Resetting statistics in: {}", left.seconds),
                left.percent_left,
            );
        }
        FrameOutcome::Processed(out)
    }

    /// 互斥区内的全部工作; 守卫在任何返回或展开路径上释放
    fn locked_step(&self, index: usize, frame: &RgbImage) -> Result<ProcessedFrame> {
        let mut guard = self.session.lock();
        let session: &mut Session = &mut guard;

        if session.needs_reset {
            session
                .rebuild(self.factory.as_ref(), self.font.as_ref())
                .map_err(|e| SentinelError::Frame {
                    index,
                    reason: format!("rebuild failed: {:#}", e),
                })?;
        }

        let input = session.general.input_size();
        let screen = session.general.screen_size();
        let device = session.model.device.as_str();
        let (Some(detector), Some(p)) = (session.detector.as_mut(), session.processors.as_mut()) else {
            return Err(SentinelError::Frame {
                index,
                reason: "detector not loaded".to_string(),
            });
        };

        let resized = resize_frame(frame, input.0, input.1).map_err(|e| SentinelError::Frame {
            index,
            reason: format!("resize failed: {:#}", e),
        })?;
        let raw = detector
            .predict(&resized, p.box_processor.box_threshold(), device)
            .map_err(|e| SentinelError::Detector(format!("{:#}", e)))?;

        let detections = p.box_processor.extract(&raw);
        let rows = p.counter.update_boxes(&detections, &resized);
        let boxes = TrackIdentityCounter::to_bounding_boxes(&rows);
        let new_object = p.counter.update_counts(&boxes, log_enabled!(Level::Debug));

        let display_boxes = resize_boxes(&boxes, input, screen);
        let mut display = resize_frame(frame, screen.0, screen.1).map_err(|e| SentinelError::Frame {
            index,
            reason: format!("resize failed: {:#}", e),
        })?;
        p.annotator.draw_boxes(&mut display, &display_boxes);
        let display = p.counter.render_overlay(&display, &p.annotator);
        let counts = p.counter.formatted_counts();
        drop(guard);

        debug!(
            "帧 {}: 检测 {} | 过滤后 {} | 跟踪 {}{}",
            index,
            raw.len(),
            detections.len(),
            boxes.len(),
            if new_object { " | 新目标" } else { "" }
        );

        Ok(ProcessedFrame {
            index,
            display,
            new_object,
            tracked: boxes.len(),
            counts,
        })
    }

    fn record_frame_time(&mut self, secs: f64) {
        if self.frame_times.len() == FPS_WINDOW {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(secs);
    }

    /// 最近 10 帧耗时均值换算的 FPS; 样本不足时为 None
    fn fps(&self) -> Option<f64> {
        if self.frame_times.len() <= FPS_MIN_SAMPLES {
            return None;
        }
        let mean = self.frame_times.iter().sum::<f64>() / self.frame_times.len() as f64;
        (mean > 0.0).then(|| 1.0 / mean)
    }
}

/// 本地缓存目录 (`<cache>/sentinel`)
pub fn default_cache_folder() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sentinel")
}

/// RGB 缩放 (fast_image_resize, 双线性); 尺寸相同时直接复制
pub fn resize_frame(frame: &RgbImage, width: u32, height: u32) -> anyhow::Result<RgbImage> {
    if frame.dimensions() == (width, height) {
        return Ok(frame.clone());
    }
    let src = fr::images::Image::from_vec_u8(
        frame.width(),
        frame.height(),
        frame.as_raw().clone(),
        fr::PixelType::U8x3,
    )?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src,
        &mut dst,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
    )?;
    RgbImage::from_raw(width, height, dst.into_vec())
        .ok_or_else(|| anyhow::anyhow!("缩放结果尺寸不匹配 {}x{}", width, height))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
