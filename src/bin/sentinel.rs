// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 目标计数 (Sentinel counter)
///
/// 按轨迹 ID 对视频中的目标计数, 每个 ID 只计一次。
///
/// 系统架构:
/// 1. 主线程:   帧源 → 检测 → 跟踪 → 计数 → 绘制 → 保存
/// 2. 定时线程: 每 N 分钟清零统计 (可选)
/// 3. 推送线程: 最新画面写入 `<output>/output/live.jpg`
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};
use sentinel_counter::input::{FrameSource, ImageSequenceSource};
use sentinel_counter::output::spawn_stream_consumer;
use sentinel_counter::render::load_font;
use sentinel_counter::settings::{GeneralSettings, GPU_DEVICE};
use sentinel_counter::{
    DefaultTrackerFactory, FramePipeline, FrameStream, Profile, ReplayDetector, Session,
    SettingOrchestrator, StreamMessage, VideoFormat,
};

/// 目标计数参数
#[derive(Parser, Debug)]
#[command(author, version, about = "目标计数 - 按轨迹ID统计视频中的目标", long_about = None)]
struct Args {
    /// 输入: 图片目录或视频文件
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 使用本地摄像头
    #[arg(long)]
    camera_mode: bool,

    /// 摄像头索引
    #[arg(long, default_value_t = 0)]
    camera_index: usize,

    #[arg(long, default_value_t = 1920)]
    camera_width: u32,

    #[arg(long, default_value_t = 1080)]
    camera_height: u32,

    /// 输出画面宽度
    #[arg(long, default_value_t = 1920)]
    screen_width: u32,

    /// 输出画面高度
    #[arg(long, default_value_t = 1080)]
    screen_height: u32,

    /// 文件模式按源帧率处理
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    realistic: bool,

    /// 在GPU上推理 (cuda:0)
    #[arg(long)]
    gpu: bool,

    /// 保存所有原始帧
    #[arg(long)]
    save_all_frames: bool,

    /// 保存结果视频
    #[arg(long)]
    save_results: bool,

    /// 出现新目标时保存截图
    #[arg(long)]
    save_new_objects: bool,

    /// 每隔 N 分钟清零统计, 0 表示关闭
    #[arg(long, default_value_t = 0.0)]
    reset_stats_min: f64,

    /// 跳过开头的帧数 (文件模式)
    #[arg(long, default_value_t = 0)]
    skip_frames: usize,

    /// 输入帧率 (图片目录/视频文件)
    #[arg(long)]
    fps: Option<f64>,

    /// 输出目录, 默认 ~/Downloads
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 结果视频格式: gif 或 mp4
    #[arg(long, default_value = "gif")]
    video_format: VideoFormat,

    /// JSON 配置档
    #[arg(long, default_value = "sentinel.json")]
    profile: PathBuf,

    /// 每帧检测结果 (JSON Lines)
    #[arg(short, long)]
    detections: PathBuf,

    /// 文本字体 (TTF/OTF), 不指定则不绘制文字
    #[arg(long)]
    font: Option<PathBuf>,

    /// 逐项修改设置: --set box_threshold=0.5
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    overrides: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("🚀 目标计数启动");

    // ========== 配置 ==========
    let profile = Profile::load(&args.profile);
    profile.print_summary();

    let session = Session::default().shared();
    let orchestrator = SettingOrchestrator::new(session.clone());
    profile.apply(&orchestrator).context("配置档无效")?;
    apply_args(&orchestrator, &args)?;
    for item in &args.overrides {
        let Some((field, value)) = item.split_once('=') else {
            bail!("--set 需要 FIELD=VALUE 格式: {}", item);
        };
        orchestrator
            .apply(field, value)
            .with_context(|| format!("无法应用 --set {}", item))?;
    }
    let general = orchestrator.snapshot().general;

    // ========== 检测器 / 字体 ==========
    let detector = ReplayDetector::open(&args.detections)
        .with_context(|| format!("无法加载检测结果 {}", args.detections.display()))?;
    info!("📦 检测回放: {} 帧", detector.len());
    orchestrator.load_detector(Box::new(detector));

    let font = match &args.font {
        Some(path) => match load_font(path) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("⚠️ 字体加载失败, 不绘制文字: {:#}", e);
                None
            }
        },
        None => None,
    };

    // ========== 实时画面 ==========
    let live_dir = general.output_folder.join("output");
    fs::create_dir_all(&live_dir)
        .with_context(|| format!("无法创建输出目录 {}", live_dir.display()))?;
    let live_path = live_dir.join("live.jpg");
    let stream = FrameStream::new();
    let consumer = spawn_stream_consumer(stream.clone(), move |msg| {
        if let StreamMessage::Frame(bytes) = msg {
            if let Err(e) = fs::write(&live_path, bytes.as_slice()) {
                warn!("⚠️ 写入实时画面失败: {}", e);
            }
        }
        true
    });

    // ========== 运行 ==========
    let source = open_source(&general, &args)?;
    let mut pipeline = FramePipeline::new(session, Arc::new(DefaultTrackerFactory))
        .with_font(font)
        .with_stream(stream);
    let summary = pipeline.run(source).context("运行失败")?;

    if consumer.join().is_err() {
        warn!("⚠️ 推送线程异常退出");
    }

    if let Some(counts) = &summary.counts {
        for (class, n) in counts.non_zero() {
            info!("📊 {}: {}", class, n);
        }
        info!("📊 合计: {}", counts.total());
    }
    if let Some(video) = &summary.video {
        info!("💾 结果视频: {}", video.display());
    }
    Ok(())
}

/// 命令行参数同样经过设置协调器校验
fn apply_args(orchestrator: &SettingOrchestrator, args: &Args) -> anyhow::Result<()> {
    orchestrator.set_camera_mode(args.camera_mode)?;
    orchestrator.set_camera_index(args.camera_index)?;
    orchestrator.set_camera_dimensions(args.camera_width, args.camera_height)?;
    orchestrator.set_screen_dimensions(args.screen_width, args.screen_height)?;
    orchestrator.set_realistic_processing(args.realistic)?;
    orchestrator.set_save_all_frames(args.save_all_frames)?;
    orchestrator.set_save_results(args.save_results)?;
    orchestrator.set_save_new_objects(args.save_new_objects)?;
    orchestrator.set_reset_stats_min(args.reset_stats_min)?;
    orchestrator.set_skip_frames(args.skip_frames)?;
    orchestrator.set_video_format(args.video_format)?;
    if let Some(output) = &args.output {
        orchestrator.set_output_folder(output.clone())?;
    }
    if args.gpu {
        orchestrator.set_device(GPU_DEVICE)?;
    }
    Ok(())
}

fn open_source(general: &GeneralSettings, args: &Args) -> anyhow::Result<Box<dyn FrameSource>> {
    if general.camera_mode {
        return open_camera(general);
    }
    let Some(input) = &args.input else {
        bail!("需要 --input 或 --camera-mode");
    };
    if input.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(input, args.fps)?));
    }
    open_video_file(input, args.fps)
}

#[cfg(feature = "ffmpeg")]
fn open_camera(general: &GeneralSettings) -> anyhow::Result<Box<dyn FrameSource>> {
    let camera = sentinel_counter::input::FfmpegSource::open_camera(
        general.camera_index,
        general.camera_width,
        general.camera_height,
    )?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_camera(_general: &GeneralSettings) -> anyhow::Result<Box<dyn FrameSource>> {
    bail!("摄像头模式需要启用 `ffmpeg` 功能")
}

#[cfg(feature = "ffmpeg")]
fn open_video_file(input: &Path, fps: Option<f64>) -> anyhow::Result<Box<dyn FrameSource>> {
    let fps = fps.unwrap_or(sentinel_counter::input::DEFAULT_SEQUENCE_FPS);
    Ok(Box::new(sentinel_counter::input::FfmpegSource::open_file(input, fps)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video_file(input: &Path, _fps: Option<f64>) -> anyhow::Result<Box<dyn FrameSource>> {
    bail!("视频文件输入需要启用 `ffmpeg` 功能: {}", input.display())
}
