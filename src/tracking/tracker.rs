// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 多目标跟踪公共组件
//! Common components for multi-object tracking

use image::RgbImage;

use crate::detection::{Detection, TrackRow};

// ========== 跟踪器统一接口 ==========

/// 活跃轨迹快照
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveTrack {
    pub track_id: u64,
    pub class_id: usize,
    /// 轨迹被命中的帧数
    pub age: u32,
}

/// 多目标跟踪器 Trait
///
/// 内置变体 (ByteTrack, IoU) 与测试用的脚本跟踪器都实现此接口
pub trait MultiObjectTracker: Send {
    fn name(&self) -> &'static str;

    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: 当前帧的检测框 (推理尺寸坐标系)
    /// - `frame`:      推理尺寸图像
    ///
    /// # 返回
    /// 本帧输出的轨迹行 `[x1, y1, x2, y2, track_id, confidence, class_id]`
    fn update(&mut self, detections: &[Detection], frame: &RgbImage) -> anyhow::Result<Vec<TrackRow>>;

    /// 当前所有活跃轨迹 (含 age)
    fn active_tracks(&self) -> Vec<ActiveTrack>;
}

// ========== 卡尔曼滤波器 ==========

/// 简化卡尔曼滤波器 (单个边界框的位置和尺寸平滑)
/// 状态向量: [x_center, y_center, width, height, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],

    /// 估计误差协方差 (简化为对角阵)
    p: [f32; 8],

    /// 过程噪声
    q: f32,

    /// 观测噪声
    r: f32,

    /// 速度衰减因子
    velocity_decay: f32,
}

impl KalmanBoxFilter {
    /// - `q`: 过程噪声 (0.1-1.0, 越小越平滑)
    /// - `r`: 观测噪声 (越大越平滑)
    pub fn new(rect: &[f32; 4], q: f32, r: f32) -> Self {
        let [cx, cy, w, h] = to_cxcywh(rect);
        Self {
            state: [cx, cy, w, h, 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
        }
    }

    /// 匀速模型预测
    pub fn predict(&mut self) {
        for v in &mut self.state[4..6] {
            *v *= self.velocity_decay;
        }
        // 尺寸变化更慢
        for v in &mut self.state[6..8] {
            *v *= 0.98;
        }
        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }
        for p in &mut self.p {
            *p += self.q;
        }
    }

    /// 融合观测值
    pub fn update(&mut self, rect: &[f32; 4]) {
        let z = to_cxcywh(rect);
        let y = [
            z[0] - self.state[0],
            z[1] - self.state[1],
            z[2] - self.state[2],
            z[3] - self.state[3],
        ];

        // K = P / (P + R), 速度分量的观测噪声放大 10 倍
        let mut k = [0.0f32; 8];
        for i in 0..8 {
            let r = if i < 4 { self.r } else { self.r * 10.0 };
            k[i] = self.p[i] / (self.p[i] + r);
        }

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
            self.state[i + 4] += k[i + 4] * y[i];
        }
        for i in 0..8 {
            self.p[i] *= 1.0 - k[i];
        }
    }

    /// 当前状态的边界框
    pub fn state_rect(&self) -> [f32; 4] {
        from_cxcywh(self.state[0], self.state[1], self.state[2], self.state[3])
    }

    /// 下一帧预测框 (用于匹配)
    pub fn predicted_rect(&self) -> [f32; 4] {
        from_cxcywh(
            self.state[0] + self.state[4],
            self.state[1] + self.state[5],
            self.state[2] + self.state[6],
            self.state[3] + self.state[7],
        )
    }
}

fn to_cxcywh(rect: &[f32; 4]) -> [f32; 4] {
    [
        (rect[0] + rect[2]) / 2.0,
        (rect[1] + rect[3]) / 2.0,
        rect[2] - rect[0],
        rect[3] - rect[1],
    ]
}

fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    let w = w.max(1.0);
    let h = h.max(1.0);
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let area1 = (a[2] - a[0]) * (a[3] - a[1]);
    let area2 = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area1 + area2 - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

/// 贪心 IoU 匹配: 返回 (检测下标, 轨迹下标)
///
/// `pairs` 中每个候选为 (检测下标, 轨迹下标, iou), 低于阈值的候选被丢弃
pub fn greedy_assign(mut pairs: Vec<(usize, usize, f32)>, iou_threshold: f32) -> Vec<(usize, usize)> {
    pairs.retain(|&(_, _, iou)| iou >= iou_threshold);
    // 按 IoU 降序, NaN 视为相等
    pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut used_det = Vec::new();
    let mut used_track = Vec::new();
    let mut assignments = Vec::new();
    for (det, track, _) in pairs {
        if !used_det.contains(&det) && !used_track.contains(&track) {
            used_det.push(det);
            used_track.push(track);
            assignments.push((det, track));
        }
    }
    assignments
}
