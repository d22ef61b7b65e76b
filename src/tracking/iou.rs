// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! IoU 跟踪器: 无运动模型, 按上一帧框位置贪心匹配

use image::RgbImage;

use super::factory::TrackerParams;
use super::tracker::{compute_iou, greedy_assign, ActiveTrack, MultiObjectTracker};
use crate::detection::{Detection, TrackRow};

const IOU_THRESHOLD: f32 = 0.3;

#[derive(Clone, Debug)]
struct IouTrack {
    id: u64,
    class_id: usize,
    rect: [f32; 4],
    frames_lost: u32,
    hits: u32,
}

pub struct IouTracker {
    tracks: Vec<IouTrack>,
    next_id: u64,
    max_age: u32,
    new_track_threshold: f32,
}

impl IouTracker {
    pub fn new(params: &TrackerParams, box_threshold: f32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_age: params.max_age,
            new_track_threshold: box_threshold.max(params.detection_threshold),
        }
    }
}

impl MultiObjectTracker for IouTracker {
    fn name(&self) -> &'static str {
        "iou"
    }

    fn update(&mut self, detections: &[Detection], _frame: &RgbImage) -> anyhow::Result<Vec<TrackRow>> {
        let mut pairs = Vec::new();
        for (det_idx, det) in detections.iter().enumerate() {
            for (track_idx, track) in self.tracks.iter().enumerate() {
                if track.class_id == det.class_id {
                    pairs.push((det_idx, track_idx, compute_iou(&det.rect(), &track.rect)));
                }
            }
        }

        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];
        let mut output = Vec::new();

        for (det_idx, track_idx) in greedy_assign(pairs, IOU_THRESHOLD) {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            let det = &detections[det_idx];
            let track = &mut self.tracks[track_idx];
            track.rect = det.rect();
            track.hits += 1;
            track.frames_lost = 0;
            output.push(TrackRow {
                rect: track.rect,
                track_id: track.id,
                confidence: det.confidence,
                class_id: track.class_id,
            });
        }

        for (track, matched) in self.tracks.iter_mut().zip(&matched_track) {
            if !matched {
                track.frames_lost += 1;
            }
        }

        for (det, matched) in detections.iter().zip(&matched_det) {
            if *matched || det.confidence < self.new_track_threshold {
                continue;
            }
            let track = IouTrack {
                id: self.next_id,
                class_id: det.class_id,
                rect: det.rect(),
                frames_lost: 0,
                hits: 1,
            };
            self.next_id += 1;
            output.push(TrackRow {
                rect: track.rect,
                track_id: track.id,
                confidence: det.confidence,
                class_id: track.class_id,
            });
            self.tracks.push(track);
        }

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

    fn det(x: f32, class_id: usize) -> Detection {
        Detection {
            x1: x,
            y1: 0.0,
            x2: x + 20.0,
            y2: 20.0,
            confidence: 0.9,
            class_id,
        }
    }

    #[test]
    fn matches_overlapping_boxes_and_ages_them() {
        let params = TrackerParams {
            min_hits: 0,
            max_age: 5,
            detection_threshold: 0.4,
        };
        let mut t = IouTracker::new(&params, 0.5);
        let img = RgbImage::new(1, 1);

        let a = t.update(&[det(0.0, 0), det(100.0, 0)], &img).unwrap();
        let b = t.update(&[det(2.0, 0), det(102.0, 0)], &img).unwrap();
        let mut ids_a: Vec<u64> = a.iter().map(|r| r.track_id).collect();
        let mut ids_b: Vec<u64> = b.iter().map(|r| r.track_id).collect();
        ids_a.sort();
        ids_b.sort();
        assert_eq!(ids_a, ids_b);
        assert!(t.active_tracks().iter().all(|tr| tr.age == 2));
    }
}
