// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 目标计数 (Track identity counter)
//!
//! 包装跟踪器实例:
//! 1. 检测框送入跟踪器, 只保留 age > min_hits 的已确认轨迹
//! 2. 每个 track_id 在账本生命周期内最多计数一次
//! 3. 计数叠加到显示帧
//!
//! 类别以首次出现时为准, 同一 ID 之后即使类别变化也不会重新计数。

use std::collections::{BTreeMap, HashMap, HashSet};

use image::RgbImage;
use log::{debug, error, info, warn};

use super::tracker::MultiObjectTracker;
use crate::detection::{Detection, TrackRow, TrackedBox};
use crate::render::FrameAnnotator;

/// 账本条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    /// 首次出现时的类别
    pub class_id: usize,
    pub counted: bool,
}

/// 按配置顺序排列的各类别计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCounts {
    entries: Vec<(String, u64)>,
}

impl ClassCounts {
    /// 每个配置的类别初始化为 0 (重名只保留第一个)
    pub fn zeroed(classes: &[String]) -> Self {
        let mut entries: Vec<(String, u64)> = Vec::with_capacity(classes.len());
        for name in classes {
            if !entries.iter().any(|(n, _)| n == name) {
                entries.push((name.clone(), 0));
            }
        }
        Self { entries }
    }

    pub fn get(&self, class: &str) -> Option<u64> {
        self.entries.iter().find(|(n, _)| n == class).map(|(_, c)| *c)
    }

    fn increment(&mut self, class: &str) -> bool {
        match self.entries.iter_mut().find(|(n, _)| n == class) {
            Some((_, c)) => {
                *c += 1;
                true
            }
            None => false,
        }
    }

    fn zero(&mut self) {
        for (_, c) in &mut self.entries {
            *c = 0;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    /// 非零计数 (日志/摘要用)
    pub fn non_zero(&self) -> BTreeMap<String, u64> {
        self.entries
            .iter()
            .filter(|(_, c)| *c > 0)
            .map(|(n, c)| (n.clone(), *c))
            .collect()
    }
}

pub struct TrackIdentityCounter {
    tracker: Box<dyn MultiObjectTracker>,
    min_hits: u32,
    classes: Vec<String>,
    tracked_classes: Vec<String>,
    ledger: HashMap<u64, LedgerEntry>,
    counts: ClassCounts,
}

impl TrackIdentityCounter {
    pub fn new(
        tracker: Box<dyn MultiObjectTracker>,
        min_hits: u32,
        classes: &[String],
        tracked_classes: &[String],
    ) -> Self {
        Self {
            tracker,
            min_hits,
            classes: classes.to_vec(),
            tracked_classes: tracked_classes.to_vec(),
            ledger: HashMap::new(),
            counts: ClassCounts::zeroed(classes),
        }
    }

    pub fn tracker_name(&self) -> &'static str {
        self.tracker.name()
    }

    pub fn min_hits(&self) -> u32 {
        self.min_hits
    }

    /// 检测框送入跟踪器, 返回已确认轨迹的行
    ///
    /// 跟踪器报错时本帧不跟踪任何目标, 错误只记录日志
    pub fn update_boxes(&mut self, detections: &[Detection], frame: &RgbImage) -> Vec<TrackRow> {
        let rows = match self.tracker.update(detections, frame) {
            Ok(rows) => rows,
            Err(e) => {
                error!("❌ 跟踪器 {} 更新失败: {:#}", self.tracker.name(), e);
                return Vec::new();
            }
        };

        let min_hits = self.min_hits;
        let confirmed: HashSet<u64> = self
            .tracker
            .active_tracks()
            .into_iter()
            .filter(|t| t.age > min_hits)
            .map(|t| t.track_id)
            .collect();

        rows.into_iter()
            .filter(|row| confirmed.contains(&row.track_id))
            .collect()
    }

    pub fn to_bounding_boxes(rows: &[TrackRow]) -> Vec<TrackedBox> {
        rows.iter().map(TrackedBox::from).collect()
    }

    /// 更新账本与计数; 本帧出现新目标时返回 true
    pub fn update_counts(&mut self, boxes: &[TrackedBox], verbose: bool) -> bool {
        let mut new_object = false;
        for b in boxes {
            if self.ledger.contains_key(&b.track_id) {
                continue;
            }
            let Some(class) = self.classes.get(b.class_id) else {
                warn!("⚠️ 轨迹 {} 的类别ID {} 超出类别表, 不计数", b.track_id, b.class_id);
                continue;
            };

            self.ledger.insert(
                b.track_id,
                LedgerEntry {
                    class_id: b.class_id,
                    counted: true,
                },
            );
            self.counts.increment(class);
            new_object = true;

            if verbose {
                info!("🎯 新目标: {} #{} (累计 {})", class, b.track_id, self.counts.get(class).unwrap_or(0));
            } else {
                debug!("新目标: {} #{}", class, b.track_id);
            }
        }
        new_object
    }

    /// 清空账本并将所有计数归零 (不重建跟踪器)
    pub fn reset_counts(&mut self) {
        info!("📊 重置计数 (已记录 {} 个目标)", self.ledger.len());
        self.ledger.clear();
        self.counts.zero();
    }

    pub fn counts(&self) -> &ClassCounts {
        &self.counts
    }

    pub fn ledger_entry(&self, track_id: u64) -> Option<LedgerEntry> {
        self.ledger.get(&track_id).copied()
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    /// 只包含跟踪白名单内的类别, 按类别表顺序
    pub fn formatted_counts(&self) -> Vec<(String, u64)> {
        self.counts
            .iter()
            .filter(|(name, _)| self.tracked_classes.iter().any(|t| t.as_str() == *name))
            .map(|(name, c)| (name.to_string(), c))
            .collect()
    }

    pub fn formatted_count_text(&self) -> String {
        self.formatted_counts()
            .iter()
            .map(|(name, c)| format!("{}: {}\n", name, c))
            .collect()
    }

    /// 返回叠加了计数的副本
    pub fn render_overlay(&self, frame: &RgbImage, annotator: &FrameAnnotator) -> RgbImage {
        let mut out = frame.clone();
        annotator.draw_counts(&mut out, &self.formatted_counts());
        out
    }
}
