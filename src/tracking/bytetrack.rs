// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ByteTrack 算法实现
//! ByteTrack: Simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU)
//! 3. 低分框救援丢失的轨迹
//! 4. 纯运动模型,无需外观特征
//!
//! 检测框只会与同类别的轨迹匹配。

use image::RgbImage;

use super::factory::TrackerParams;
use super::tracker::{compute_iou, greedy_assign, ActiveTrack, KalmanBoxFilter, MultiObjectTracker};
use crate::detection::{Detection, TrackRow};

/// 低分检测下限 (救援用)
const LOW_SCORE_THRESHOLD: f32 = 0.1;
/// 高分匹配 IOU 阈值
const HIGH_IOU_THRESHOLD: f32 = 0.4;
/// 低分匹配 IOU 阈值 (救援更宽松)
const LOW_IOU_THRESHOLD: f32 = 0.3;

/// ByteTrack 跟踪对象
#[derive(Clone, Debug)]
struct ByteTrackedObject {
    id: u64,
    class_id: usize,
    kalman: KalmanBoxFilter,
    rect: [f32; 4],
    score: f32,
    /// 连续丢失帧数
    frames_lost: u32,
    /// 总共被命中的帧数
    hits: u32,
}

impl ByteTrackedObject {
    fn new(id: u64, det: &Detection) -> Self {
        // 低观测噪声(r=0.5): 更信任检测结果, 快速响应移动
        let kalman = KalmanBoxFilter::new(&det.rect(), 0.1, 0.5);
        Self {
            id,
            class_id: det.class_id,
            rect: kalman.state_rect(),
            kalman,
            score: det.confidence,
            frames_lost: 0,
            hits: 1,
        }
    }

    fn predict(&mut self) {
        self.kalman.predict();
        self.rect = self.kalman.state_rect();
    }

    fn update(&mut self, det: &Detection) {
        self.kalman.update(&det.rect());
        self.rect = self.kalman.state_rect();
        self.score = det.confidence;
        self.frames_lost = 0;
        self.hits += 1;
    }

    fn row(&self) -> TrackRow {
        TrackRow {
            rect: self.rect,
            track_id: self.id,
            confidence: self.score,
            class_id: self.class_id,
        }
    }
}

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracks: Vec<ByteTrackedObject>,
    next_id: u64,
    /// 最大允许丢失帧数
    max_age: u32,
    /// 高分检测阈值
    high_score_threshold: f32,
    /// 新建轨迹所需的最低置信度
    new_track_threshold: f32,
}

impl ByteTracker {
    pub fn new(params: &TrackerParams, box_threshold: f32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_age: params.max_age,
            high_score_threshold: params.detection_threshold,
            new_track_threshold: box_threshold.max(params.detection_threshold),
        }
    }

    /// 同类别候选对 (检测下标, 轨迹下标, iou)
    fn candidates(&self, dets: &[(usize, &Detection)], track_indices: &[usize]) -> Vec<(usize, usize, f32)> {
        let mut pairs = Vec::new();
        for &(det_idx, det) in dets {
            for &track_idx in track_indices {
                let track = &self.tracks[track_idx];
                if track.class_id != det.class_id {
                    continue;
                }
                let iou = compute_iou(&det.rect(), &track.kalman.predicted_rect());
                pairs.push((det_idx, track_idx, iou));
            }
        }
        pairs
    }
}

impl MultiObjectTracker for ByteTracker {
    fn name(&self) -> &'static str {
        "bytetrack"
    }

    /// ByteTrack 两轮匹配
    fn update(&mut self, detections: &[Detection], _frame: &RgbImage) -> anyhow::Result<Vec<TrackRow>> {
        // 1. 分离高低分检测框
        let mut high_dets = Vec::new();
        let mut low_dets = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.confidence >= self.high_score_threshold {
                high_dets.push((idx, det));
            } else if det.confidence >= LOW_SCORE_THRESHOLD {
                low_dets.push((idx, det));
            }
        }

        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];

        // 2. 第一轮匹配: 高分检测 + 所有轨迹
        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        let first = greedy_assign(self.candidates(&high_dets, &all_tracks), HIGH_IOU_THRESHOLD);
        for &(det_idx, track_idx) in &first {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
        }

        // 3. 第二轮匹配: 低分检测 + 未匹配的轨迹 (救援)
        let unmatched: Vec<usize> = all_tracks.iter().copied().filter(|&i| !matched_track[i]).collect();
        let second = greedy_assign(self.candidates(&low_dets, &unmatched), LOW_IOU_THRESHOLD);
        for &(det_idx, track_idx) in &second {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
        }

        // 4. 匹配成功的轨迹: 预测 + 更新; 未匹配: 只预测, 记一次丢失
        let mut output = Vec::new();
        for (det_idx, track_idx) in first.into_iter().chain(second) {
            let track = &mut self.tracks[track_idx];
            track.predict();
            track.update(&detections[det_idx]);
            output.push(track.row());
        }
        for (track_idx, &matched) in matched_track.iter().enumerate() {
            if !matched {
                let track = &mut self.tracks[track_idx];
                track.predict();
                track.frames_lost += 1;
            }
        }

        // 5. 未匹配的高分检测 → 新建轨迹
        for (det_idx, det) in detections.iter().enumerate() {
            if !matched_det[det_idx] && det.confidence >= self.new_track_threshold {
                let track = ByteTrackedObject::new(self.next_id, det);
                output.push(track.row());
                self.tracks.push(track);
                self.next_id += 1;
            }
        }

        // 6. 删除丢失太久的轨迹
        let max_age = self.max_age;
        self.tracks.retain(|t| t.frames_lost <= max_age);

        Ok(output)
    }

    fn active_tracks(&self) -> Vec<ActiveTrack> {
        self.tracks
            .iter()
            .map(|t| ActiveTrack {
                track_id: t.id,
                class_id: t.class_id,
                age: t.hits,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, confidence: f32, class_id: usize) -> Detection {
        Detection {
            x1: x,
            y1: 10.0,
            x2: x + 40.0,
            y2: 90.0,
            confidence,
            class_id,
        }
    }

    fn params(max_age: u32) -> TrackerParams {
        TrackerParams {
            min_hits: 0,
            max_age,
            detection_threshold: 0.4,
        }
    }

    #[test]
    fn keeps_identity_across_small_motion() {
        let mut t = ByteTracker::new(&params(30), 0.5);
        let img = RgbImage::new(4, 4);
        let mut ids = Vec::new();
        for step in 0..5 {
            let rows = t.update(&[det(100.0 + step as f32 * 3.0, 0.9, 0)], &img).unwrap();
            assert_eq!(rows.len(), 1);
            ids.push(rows[0].track_id);
        }
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(t.active_tracks()[0].age, 5);
    }

    #[test]
    fn classes_never_share_a_track() {
        let mut t = ByteTracker::new(&params(30), 0.5);
        let img = RgbImage::new(4, 4);
        let first = t.update(&[det(100.0, 0.9, 0)], &img).unwrap();
        let second = t.update(&[det(100.0, 0.9, 1)], &img).unwrap();
        assert_ne!(first[0].track_id, second[0].track_id);
        assert_eq!(second[0].class_id, 1);
    }

    #[test]
    fn low_score_detection_rescues_track() {
        let mut t = ByteTracker::new(&params(30), 0.5);
        let img = RgbImage::new(4, 4);
        let id = t.update(&[det(100.0, 0.9, 0)], &img).unwrap()[0].track_id;
        let rows = t.update(&[det(101.0, 0.2, 0)], &img).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].track_id, id);
        // 低分检测不会新建轨迹
        let rows = t.update(&[det(400.0, 0.2, 0)], &img).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn lost_tracks_expire_after_max_age() {
        let mut t = ByteTracker::new(&params(2), 0.5);
        let img = RgbImage::new(4, 4);
        t.update(&[det(100.0, 0.9, 0)], &img).unwrap();
        for _ in 0..2 {
            t.update(&[], &img).unwrap();
            assert_eq!(t.active_tracks().len(), 1);
        }
        t.update(&[], &img).unwrap();
        assert!(t.active_tracks().is_empty());
        assert!(t.tracks.is_empty());
        assert_eq!(t.next_id, 2);
    }
}
