// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 运行配置 - 通过JSON文件调整类别、阈值与跟踪器参数

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::settings::{SettingOrchestrator, DEFAULT_DEVICE};
use crate::tracking::{TrackerKind, TrackerParams};

/// 模型/跟踪相关的配置档
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    // === 类别 ===
    pub classes: Vec<String>,         // 模型类别表 (顺序即 class_id)
    pub tracked_classes: Vec<String>, // 计数白名单
    pub box_threshold: f32,           // 检测框置信度阈值

    // === 推理尺寸 ===
    pub input_width: u32,
    pub input_height: u32,

    // === 跟踪器 ===
    pub tracker: TrackerKind,
    pub tracker_params: TrackerParams,

    /// 推理设备, 原样交给检测器
    pub device: String,
}

impl Default for Profile {
    fn default() -> Self {
        let classes: Vec<String> = ["person", "bicycle", "car", "motorcycle", "bus", "truck"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            tracked_classes: classes[1..].to_vec(),
            classes,
            box_threshold: 0.6,
            input_width: 640,
            input_height: 640,
            tracker: TrackerKind::ByteTrack,
            tracker_params: TrackerKind::ByteTrack.default_params(),
            device: DEFAULT_DEVICE.to_string(),
        }
    }
}

impl Profile {
    /// 从JSON文件加载; 文件不存在时写出默认配置, 解析失败时使用默认值
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(profile) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    profile
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在, 创建默认配置...");
                let profile = Self::default();
                if let Err(e) = profile.save(path) {
                    warn!("⚠️ 无法写出默认配置: {}", e);
                }
                profile
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 通过设置协调器写入会话; 任一字段非法时返回错误, 已写入的字段保留
    pub fn apply(&self, orchestrator: &SettingOrchestrator) -> Result<()> {
        orchestrator.set_classes(self.classes.clone())?;
        orchestrator.set_tracked_classes(self.tracked_classes.clone())?;
        orchestrator.set_box_threshold(self.box_threshold)?;
        orchestrator.set_input_width(self.input_width)?;
        orchestrator.set_input_height(self.input_height)?;
        orchestrator.set_tracker(self.tracker)?;
        orchestrator.set_tracker_params(self.tracker_params)?;
        orchestrator.set_device(&self.device)?;
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前配置:");
        info!("  类别: {}", self.classes.join(", "));
        info!("  计数类别: {}", self.tracked_classes.join(", "));
        info!("  置信度阈值: {:.2}", self.box_threshold);
        info!("  推理尺寸: {}x{}", self.input_width, self.input_height);
        info!(
            "  跟踪器: {} (min_hits={}, max_age={}, det={:.2})",
            self.tracker,
            self.tracker_params.min_hits,
            self.tracker_params.max_age,
            self.tracker_params.detection_threshold
        );
        info!("  设备: {}", self.device);
    }
}
