// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测框过滤 (Box processor)
//!
//! 模型原始输出 → 统一的 `Detection` 列表:
//! 置信度严格大于阈值, 且类别名在跟踪白名单内。顺序与模型输出一致, 不去重。

use super::types::{Detection, RawPrediction};

/// 构建时拷贝一份配置, 之后只读; 配置变化时由流水线整体重建
#[derive(Clone, Debug)]
pub struct BoxProcessor {
    classes: Vec<String>,
    tracked_classes: Vec<String>,
    box_threshold: f32,
}

impl BoxProcessor {
    pub fn new(classes: &[String], tracked_classes: &[String], box_threshold: f32) -> Self {
        Self {
            classes: classes.to_vec(),
            tracked_classes: tracked_classes.to_vec(),
            box_threshold,
        }
    }

    pub fn box_threshold(&self) -> f32 {
        self.box_threshold
    }

    /// 类别ID → 类别名
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.classes.get(class_id).map(String::as_str)
    }

    pub fn is_tracked(&self, class_id: usize) -> bool {
        self.class_name(class_id)
            .map(|name| self.tracked_classes.iter().any(|t| t == name))
            .unwrap_or(false)
    }

    pub fn extract(&self, predictions: &[RawPrediction]) -> Vec<Detection> {
        predictions
            .iter()
            .filter(|p| p.confidence > self.box_threshold && self.is_tracked(p.class_id))
            .map(Detection::from)
            .collect()
    }
}
