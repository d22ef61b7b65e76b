// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 通用设置 (General settings)

use std::path::PathBuf;

use crate::output::VideoFormat;

/// 流水线各处使用的通用参数
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSettings {
    // === 类别 ===
    pub classes: Vec<String>,         // 模型类别表, 下标即 class_id
    pub tracked_classes: Vec<String>, // 跟踪/计数白名单
    pub box_threshold: f32,           // 检测框置信度阈值

    // === 尺寸 ===
    pub input_width: u32, // 推理输入
    pub input_height: u32,
    pub screen_width: u32, // 显示/输出
    pub screen_height: u32,

    // === 输入 ===
    pub camera_mode: bool,
    pub camera_index: usize,
    pub camera_width: u32,
    pub camera_height: u32,
    pub skip_frames: usize,
    pub realistic_processing: bool, // 文件模式按源帧率节奏处理

    // === 输出 ===
    pub output_folder: PathBuf,
    pub save_results: bool,     // 保存结果视频
    pub save_new_objects: bool, // 出现新目标时保存截图
    pub save_all_frames: bool,  // 保存所有原始帧
    pub video_format: VideoFormat,

    /// 自动清零周期 (分钟), 0 表示关闭
    pub reset_stats_min: f64,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            classes: Vec::new(),
            tracked_classes: Vec::new(),
            box_threshold: 0.6,

            input_width: 640,
            input_height: 640,
            screen_width: 1920,
            screen_height: 1080,

            camera_mode: false,
            camera_index: 0,
            camera_width: 1920,
            camera_height: 1080,
            skip_frames: 0,
            realistic_processing: true,

            output_folder: default_output_folder(),
            save_results: false,
            save_new_objects: false,
            save_all_frames: false,
            video_format: VideoFormat::default(),

            reset_stats_min: 0.0,
        }
    }
}

impl GeneralSettings {
    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    /// 自动清零是否开启
    pub fn auto_reset_enabled(&self) -> bool {
        self.reset_stats_min > 0.0
    }
}

/// `~/Downloads`, 找不到用户目录时退回当前目录
pub fn default_output_folder() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}
