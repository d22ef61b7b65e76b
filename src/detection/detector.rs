// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器接口 (Detector)
//! 职责: 推理尺寸图像 → 原始预测框

use image::RgbImage;

use super::types::RawPrediction;

/// 外部检测模型
///
/// `conf_hint` 为置信度下限提示 (模型可在内部提前过滤);
/// `device` 是不透明的设备描述 ("cpu" / "cuda:0" ...), 原样透传给实现。
pub trait Detector: Send {
    fn name(&self) -> &str;

    fn predict(
        &mut self,
        image: &RgbImage,
        conf_hint: f32,
        device: &str,
    ) -> anyhow::Result<Vec<RawPrediction>>;
}
