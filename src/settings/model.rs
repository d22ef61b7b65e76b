// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 模型设置 (Model settings)

/// 默认推理设备
pub const DEFAULT_DEVICE: &str = "cpu";
/// `--gpu` 对应的设备
pub const GPU_DEVICE: &str = "cuda:0";

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// 不透明的设备描述, 原样交给检测器
    pub device: String,
    /// 最近一次加载的检测器名称
    pub detector_name: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            detector_name: None,
        }
    }
}
