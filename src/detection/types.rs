// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测/跟踪数据结构定义
/// Data structures shared by detection and tracking
use serde::{Deserialize, Serialize};

// ========== 模型原始输出 ==========

/// 模型原始预测 (推理尺寸坐标系)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(alias = "conf")]
    pub confidence: f32,
    #[serde(alias = "cls")]
    pub class_id: usize,
}

// ========== 检测框 ==========

/// 检测框 (Detection bounding box), 每帧产生一次, 只消费一次
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn rect(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<&RawPrediction> for Detection {
    fn from(p: &RawPrediction) -> Self {
        Self {
            x1: p.x1,
            y1: p.y1,
            x2: p.x2,
            y2: p.y2,
            confidence: p.confidence,
            class_id: p.class_id,
        }
    }
}

// ========== 跟踪结果 ==========

/// 跟踪器输出的一行: `[x1, y1, x2, y2, track_id, confidence, class_id]`
#[derive(Clone, Debug, PartialEq)]
pub struct TrackRow {
    pub rect: [f32; 4],
    pub track_id: u64,
    pub confidence: f32,
    pub class_id: usize,
}

impl TrackRow {
    pub fn to_array(&self) -> [f32; 7] {
        [
            self.rect[0],
            self.rect[1],
            self.rect[2],
            self.rect[3],
            self.track_id as f32,
            self.confidence,
            self.class_id as f32,
        ]
    }

    /// 从数组解析, id/类别为负数或非有限值时返回 None
    pub fn from_array(row: [f32; 7]) -> Option<Self> {
        if row.iter().any(|v| !v.is_finite()) || row[4] < 0.0 || row[6] < 0.0 {
            return None;
        }
        Some(Self {
            rect: [row[0], row[1], row[2], row[3]],
            track_id: row[4] as u64,
            confidence: row[5],
            class_id: row[6] as usize,
        })
    }
}

/// 带持久ID的检测框
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub track_id: u64,
    pub confidence: f32,
    pub class_id: usize,
}

impl TrackedBox {
    /// 坐标从 `from` (宽, 高) 缩放到 `to` (宽, 高)
    pub fn rescaled(&self, from: (u32, u32), to: (u32, u32)) -> Self {
        let sx = to.0 as f32 / from.0.max(1) as f32;
        let sy = to.1 as f32 / from.1.max(1) as f32;
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
            ..self.clone()
        }
    }
}

impl From<&TrackRow> for TrackedBox {
    fn from(row: &TrackRow) -> Self {
        Self {
            x1: row.rect[0],
            y1: row.rect[1],
            x2: row.rect[2],
            y2: row.rect[3],
            track_id: row.track_id,
            confidence: row.confidence,
            class_id: row.class_id,
        }
    }
}

/// 批量缩放 (推理尺寸 → 显示尺寸)
pub fn resize_boxes(boxes: &[TrackedBox], from: (u32, u32), to: (u32, u32)) -> Vec<TrackedBox> {
    boxes.iter().map(|b| b.rescaled(from, to)).collect()
}
