// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 设置协调器 (Setting orchestrator)
//!
//! 每个修改入口: 先校验 → 进入互斥区 → 记录 旧值 -> 新值 → 写入。
//! 影响跟踪器构建的字段额外置位 `needs_reset`, 由流水线在下一帧开始前重建。
//! 非法输入直接拒绝, 旧值保持不变。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use log::{info, warn};

use super::general::GeneralSettings;
use super::model::ModelSettings;
use super::session::{Session, SharedSession};
use super::tracking::TrackingSettings;
use crate::cycling_timer::period_from_minutes;
use crate::detection::Detector;
use crate::error::{Result, SentinelError};
use crate::output::VideoFormat;
use crate::tracking::{ClassCounts, TrackerKind, TrackerParams};

/// 可通过 `apply` 按名称修改的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    Classes,
    TrackedClasses,
    BoxThreshold,
    InputWidth,
    InputHeight,
    ScreenDimensions,
    CameraDimensions,
    CameraIndex,
    CameraMode,
    ResetStatsMin,
    SaveAllFrames,
    SaveResults,
    SaveNewObjects,
    RealisticProcessing,
    OutputFolder,
    VideoFormat,
    SkipFrames,
    Device,
    Tracker,
    MinHits,
    MaxAge,
    DetectionThreshold,
}

impl SettingField {
    pub const ALL: [SettingField; 22] = [
        SettingField::Classes,
        SettingField::TrackedClasses,
        SettingField::BoxThreshold,
        SettingField::InputWidth,
        SettingField::InputHeight,
        SettingField::ScreenDimensions,
        SettingField::CameraDimensions,
        SettingField::CameraIndex,
        SettingField::CameraMode,
        SettingField::ResetStatsMin,
        SettingField::SaveAllFrames,
        SettingField::SaveResults,
        SettingField::SaveNewObjects,
        SettingField::RealisticProcessing,
        SettingField::OutputFolder,
        SettingField::VideoFormat,
        SettingField::SkipFrames,
        SettingField::Device,
        SettingField::Tracker,
        SettingField::MinHits,
        SettingField::MaxAge,
        SettingField::DetectionThreshold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingField::Classes => "classes",
            SettingField::TrackedClasses => "tracked_classes",
            SettingField::BoxThreshold => "box_threshold",
            SettingField::InputWidth => "input_width",
            SettingField::InputHeight => "input_height",
            SettingField::ScreenDimensions => "screen_dimensions",
            SettingField::CameraDimensions => "camera_dimensions",
            SettingField::CameraIndex => "camera_index",
            SettingField::CameraMode => "camera_mode",
            SettingField::ResetStatsMin => "reset_stats_min",
            SettingField::SaveAllFrames => "save_all_frames",
            SettingField::SaveResults => "save_results",
            SettingField::SaveNewObjects => "save_new_objects",
            SettingField::RealisticProcessing => "realistic_processing",
            SettingField::OutputFolder => "output_folder",
            SettingField::VideoFormat => "video_format",
            SettingField::SkipFrames => "skip_frames",
            SettingField::Device => "device",
            SettingField::Tracker => "tracker",
            SettingField::MinHits => "min_hits",
            SettingField::MaxAge => "max_age",
            SettingField::DetectionThreshold => "detection_threshold",
        }
    }
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingField {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase().replace('-', "_");
        SettingField::ALL
            .into_iter()
            .find(|f| f.as_str() == key)
            .ok_or_else(|| SentinelError::invalid("field", s, "unknown setting"))
    }
}

/// 互斥区内取出的只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsSnapshot {
    pub general: GeneralSettings,
    pub tracking: TrackingSettings,
    pub model: ModelSettings,
    pub needs_reset: bool,
    pub aborting: bool,
    pub model_loaded: bool,
}

/// 控制面入口, 可克隆 (共享同一个会话)
#[derive(Clone)]
pub struct SettingOrchestrator {
    session: SharedSession,
}

impl SettingOrchestrator {
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// 进入互斥区写入; `rebuild` 为 true 时同时置位 `needs_reset`
    fn commit<F>(&self, field: &str, rebuild: bool, write: F)
    where
        F: FnOnce(&mut Session) -> (String, String),
    {
        let mut session = self.session.lock();
        let (old, new) = write(&mut session);
        if rebuild {
            session.needs_reset = true;
        }
        drop(session);
        info!("🔧 {}: {} -> {}", field, old, new);
    }

    fn reject(err: SentinelError) -> Result<()> {
        warn!("⚠️ 设置被拒绝: {}", err);
        Err(err)
    }

    // ========== 类别 ==========

    pub fn set_classes(&self, classes: Vec<String>) -> Result<()> {
        let classes = clean_list(classes);
        if classes.is_empty() {
            return Self::reject(SentinelError::invalid("classes", "", "class list must not be empty"));
        }
        self.commit("classes", true, |s| {
            let old = s.general.classes.join(",");
            // 白名单中已不存在的类别一并移除
            s.general.tracked_classes.retain(|t| classes.contains(t));
            s.general.classes = classes;
            (old, s.general.classes.join(","))
        });
        Ok(())
    }

    pub fn set_tracked_classes(&self, tracked: Vec<String>) -> Result<()> {
        let tracked = clean_list(tracked);
        let mut session = self.session.lock();
        if let Some(unknown) = tracked.iter().find(|t| !session.general.classes.contains(t)) {
            let err = SentinelError::invalid("tracked_classes", unknown, "not in the class list");
            drop(session);
            return Self::reject(err);
        }
        let old = std::mem::replace(&mut session.general.tracked_classes, tracked);
        session.needs_reset = true;
        let new = session.general.tracked_classes.join(",");
        drop(session);
        info!("🔧 tracked_classes: {} -> {}", old.join(","), new);
        Ok(())
    }

    pub fn set_box_threshold(&self, value: f32) -> Result<()> {
        if !(value > 0.0 && value < 1.0) {
            return Self::reject(SentinelError::invalid(
                "box_threshold",
                value,
                "must be between 0 and 1 (exclusive)",
            ));
        }
        self.commit("box_threshold", true, |s| {
            let old = std::mem::replace(&mut s.general.box_threshold, value);
            (old.to_string(), value.to_string())
        });
        Ok(())
    }

    // ========== 尺寸 ==========

    pub fn set_input_width(&self, width: u32) -> Result<()> {
        if width == 0 {
            return Self::reject(SentinelError::invalid("input_width", width, "must be positive"));
        }
        self.commit("input_width", false, |s| {
            let old = std::mem::replace(&mut s.general.input_width, width);
            (old.to_string(), width.to_string())
        });
        Ok(())
    }

    pub fn set_input_height(&self, height: u32) -> Result<()> {
        if height == 0 {
            return Self::reject(SentinelError::invalid("input_height", height, "must be positive"));
        }
        self.commit("input_height", false, |s| {
            let old = std::mem::replace(&mut s.general.input_height, height);
            (old.to_string(), height.to_string())
        });
        Ok(())
    }

    pub fn set_screen_dimensions(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Self::reject(SentinelError::invalid(
                "screen_dimensions",
                format!("{}x{}", width, height),
                "both sides must be positive",
            ));
        }
        self.commit("screen_dimensions", false, |s| {
            let old = format!("{}x{}", s.general.screen_width, s.general.screen_height);
            s.general.screen_width = width;
            s.general.screen_height = height;
            (old, format!("{}x{}", width, height))
        });
        Ok(())
    }

    pub fn set_camera_dimensions(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Self::reject(SentinelError::invalid(
                "camera_dimensions",
                format!("{}x{}", width, height),
                "both sides must be positive",
            ));
        }
        self.commit("camera_dimensions", false, |s| {
            let old = format!("{}x{}", s.general.camera_width, s.general.camera_height);
            s.general.camera_width = width;
            s.general.camera_height = height;
            (old, format!("{}x{}", width, height))
        });
        Ok(())
    }

    // ========== 输入 ==========

    pub fn set_camera_index(&self, index: usize) -> Result<()> {
        self.commit("camera_index", false, |s| {
            let old = std::mem::replace(&mut s.general.camera_index, index);
            (old.to_string(), index.to_string())
        });
        Ok(())
    }

    pub fn set_camera_mode(&self, enabled: bool) -> Result<()> {
        self.commit("camera_mode", false, |s| {
            let old = std::mem::replace(&mut s.general.camera_mode, enabled);
            (old.to_string(), enabled.to_string())
        });
        Ok(())
    }

    pub fn set_skip_frames(&self, skip: usize) -> Result<()> {
        self.commit("skip_frames", false, |s| {
            let old = std::mem::replace(&mut s.general.skip_frames, skip);
            (old.to_string(), skip.to_string())
        });
        Ok(())
    }

    pub fn set_realistic_processing(&self, enabled: bool) -> Result<()> {
        self.commit("realistic_processing", false, |s| {
            let old = std::mem::replace(&mut s.general.realistic_processing, enabled);
            (old.to_string(), enabled.to_string())
        });
        Ok(())
    }

    /// 0 关闭自动清零, 其余取值须是定时器能接受的周期; 新周期在下一次运行生效
    pub fn set_reset_stats_min(&self, minutes: f64) -> Result<()> {
        if minutes != 0.0 {
            if let Err(e) = period_from_minutes(minutes) {
                return Self::reject(e);
            }
        }
        self.commit("reset_stats_min", false, |s| {
            let old = std::mem::replace(&mut s.general.reset_stats_min, minutes);
            (old.to_string(), minutes.to_string())
        });
        Ok(())
    }

    // ========== 输出 ==========

    pub fn set_save_all_frames(&self, enabled: bool) -> Result<()> {
        self.commit("save_all_frames", false, |s| {
            let old = std::mem::replace(&mut s.general.save_all_frames, enabled);
            (old.to_string(), enabled.to_string())
        });
        Ok(())
    }

    pub fn set_save_results(&self, enabled: bool) -> Result<()> {
        self.commit("save_results", false, |s| {
            let old = std::mem::replace(&mut s.general.save_results, enabled);
            (old.to_string(), enabled.to_string())
        });
        Ok(())
    }

    pub fn set_save_new_objects(&self, enabled: bool) -> Result<()> {
        self.commit("save_new_objects", false, |s| {
            let old = std::mem::replace(&mut s.general.save_new_objects, enabled);
            (old.to_string(), enabled.to_string())
        });
        Ok(())
    }

    pub fn set_output_folder(&self, folder: PathBuf) -> Result<()> {
        if folder.as_os_str().is_empty() {
            return Self::reject(SentinelError::invalid("output_folder", "", "path must not be empty"));
        }
        self.commit("output_folder", false, |s| {
            let old = std::mem::replace(&mut s.general.output_folder, folder);
            (old.display().to_string(), s.general.output_folder.display().to_string())
        });
        Ok(())
    }

    pub fn set_video_format(&self, format: VideoFormat) -> Result<()> {
        self.commit("video_format", false, |s| {
            let old = std::mem::replace(&mut s.general.video_format, format);
            (old.to_string(), format.to_string())
        });
        Ok(())
    }

    // ========== 模型 ==========

    pub fn set_device(&self, device: &str) -> Result<()> {
        let device = device.trim();
        if device.is_empty() {
            return Self::reject(SentinelError::invalid("device", device, "must not be empty"));
        }
        self.commit("device", false, |s| {
            let old = std::mem::replace(&mut s.model.device, device.to_string());
            (old, device.to_string())
        });
        Ok(())
    }

    /// 装入检测器, 等待中的流水线随即开始处理
    pub fn load_detector(&self, detector: Box<dyn Detector>) {
        let name = detector.name().to_string();
        self.commit("detector", false, |s| {
            let old = s.model.detector_name.clone().unwrap_or_else(|| "-".to_string());
            s.model.detector_name = Some(name.clone());
            s.detector = Some(detector);
            (old, name.clone())
        });
        info!("✅ 检测器已加载: {}", name);
    }

    // ========== 跟踪 ==========

    /// 切换跟踪器并套用其默认参数
    pub fn set_tracker(&self, kind: TrackerKind) -> Result<()> {
        self.commit("tracker", true, |s| {
            let old = s.tracking.kind;
            s.tracking = TrackingSettings::for_kind(kind);
            (old.to_string(), kind.to_string())
        });
        Ok(())
    }

    pub fn set_tracker_params(&self, params: TrackerParams) -> Result<()> {
        if let Err(e) = params.validate() {
            return Self::reject(e);
        }
        self.commit("tracker_params", true, |s| {
            let old = std::mem::replace(&mut s.tracking.params, params);
            (format!("{:?}", old), format!("{:?}", params))
        });
        Ok(())
    }

    pub fn set_min_hits(&self, min_hits: u32) -> Result<()> {
        self.update_params(|p| p.min_hits = min_hits)
    }

    pub fn set_max_age(&self, max_age: u32) -> Result<()> {
        self.update_params(|p| p.max_age = max_age)
    }

    pub fn set_detection_threshold(&self, threshold: f32) -> Result<()> {
        self.update_params(|p| p.detection_threshold = threshold)
    }

    /// 校验与写入在同一个临界区内, 避免与其他参数修改交错
    fn update_params(&self, edit: impl FnOnce(&mut TrackerParams)) -> Result<()> {
        let mut session = self.session.lock();
        let old = session.tracking.params;
        let mut params = old;
        edit(&mut params);
        if let Err(e) = params.validate() {
            drop(session);
            return Self::reject(e);
        }
        session.tracking.params = params;
        session.needs_reset = true;
        drop(session);
        info!("🔧 tracker_params: {:?} -> {:?}", old, params);
        Ok(())
    }

    // ========== 控制 ==========

    /// 按字段名解析文本值并修改
    pub fn apply(&self, field: &str, raw: &str) -> Result<()> {
        let field = match field.parse::<SettingField>() {
            Ok(f) => f,
            Err(e) => return Self::reject(e),
        };
        let name = field.as_str();
        let raw = raw.trim();
        match field {
            SettingField::Classes => self.set_classes(parse_list(raw)),
            SettingField::TrackedClasses => self.set_tracked_classes(parse_list(raw)),
            SettingField::BoxThreshold => self.set_box_threshold(parse_num(name, raw)?),
            SettingField::InputWidth => self.set_input_width(parse_num(name, raw)?),
            SettingField::InputHeight => self.set_input_height(parse_num(name, raw)?),
            SettingField::ScreenDimensions => {
                let (w, h) = parse_dims(name, raw)?;
                self.set_screen_dimensions(w, h)
            }
            SettingField::CameraDimensions => {
                let (w, h) = parse_dims(name, raw)?;
                self.set_camera_dimensions(w, h)
            }
            SettingField::CameraIndex => self.set_camera_index(parse_num(name, raw)?),
            SettingField::CameraMode => self.set_camera_mode(parse_bool(name, raw)?),
            SettingField::ResetStatsMin => self.set_reset_stats_min(parse_num(name, raw)?),
            SettingField::SaveAllFrames => self.set_save_all_frames(parse_bool(name, raw)?),
            SettingField::SaveResults => self.set_save_results(parse_bool(name, raw)?),
            SettingField::SaveNewObjects => self.set_save_new_objects(parse_bool(name, raw)?),
            SettingField::RealisticProcessing => {
                self.set_realistic_processing(parse_bool(name, raw)?)
            }
            SettingField::OutputFolder => self.set_output_folder(PathBuf::from(raw)),
            SettingField::VideoFormat => match raw.parse::<VideoFormat>() {
                Ok(f) => self.set_video_format(f),
                Err(e) => Self::reject(e),
            },
            SettingField::SkipFrames => self.set_skip_frames(parse_num(name, raw)?),
            SettingField::Device => self.set_device(raw),
            SettingField::Tracker => match raw.parse::<TrackerKind>() {
                Ok(k) => self.set_tracker(k),
                Err(e) => Self::reject(e),
            },
            SettingField::MinHits => self.set_min_hits(parse_num(name, raw)?),
            SettingField::MaxAge => self.set_max_age(parse_num(name, raw)?),
            SettingField::DetectionThreshold => self.set_detection_threshold(parse_num(name, raw)?),
        }
    }

    /// 清空账本与计数, 不重建跟踪器
    pub fn reset_counts(&self) {
        if self.session.lock().reset_counts() {
            info!("📊 计数已清零");
        } else {
            warn!("⚠️ 处理器尚未创建, 无需清零");
        }
    }

    /// 请求中止当前运行
    pub fn abort(&self) {
        self.session.lock().aborting = true;
        info!("🛑 已请求中止");
    }

    pub fn counts(&self) -> Option<ClassCounts> {
        self.session.lock().counts()
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        let s = self.session.lock();
        SettingsSnapshot {
            general: s.general.clone(),
            tracking: s.tracking,
            model: s.model.clone(),
            needs_reset: s.needs_reset,
            aborting: s.aborting,
            model_loaded: s.is_model_loaded(),
        }
    }
}

// ========== 文本解析 ==========

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

fn parse_num<T>(field: &'static str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>().map_err(|e| {
        let err = SentinelError::invalid(field, raw, e.to_string());
        warn!("⚠️ 设置被拒绝: {}", err);
        err
    })
}

fn parse_bool(field: &'static str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => {
            let err = SentinelError::invalid(field, raw, "expected true/false");
            warn!("⚠️ 设置被拒绝: {}", err);
            Err(err)
        }
    }
}

/// "1920x1080"
fn parse_dims(field: &'static str, raw: &str) -> Result<(u32, u32)> {
    let Some((w, h)) = raw.to_lowercase().split_once('x').map(|(w, h)| (w.to_string(), h.to_string())) else {
        let err = SentinelError::invalid(field, raw, "expected WIDTHxHEIGHT");
        warn!("⚠️ 设置被拒绝: {}", err);
        return Err(err);
    };
    Ok((parse_num(field, w.trim())?, parse_num(field, h.trim())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Session;

    fn orchestrator() -> SettingOrchestrator {
        let mut general = GeneralSettings::default();
        general.classes = vec!["car".into(), "bike".into(), "person".into()];
        general.tracked_classes = vec!["car".into(), "bike".into()];
        let session = Session::new(general, TrackingSettings::default(), ModelSettings::default());
        let orch = SettingOrchestrator::new(session.shared());
        orch.session().lock().needs_reset = false;
        orch
    }

    #[test]
    fn box_threshold_rejects_out_of_range_and_keeps_prior() {
        let o = orchestrator();
        for bad in [0.0, 1.0, -0.5, 1.5, f32::NAN] {
            assert!(matches!(
                o.set_box_threshold(bad),
                Err(SentinelError::InvalidSetting { field: "box_threshold", .. })
            ));
        }
        let snap = o.snapshot();
        assert_eq!(snap.general.box_threshold, 0.6);
        assert!(!snap.needs_reset);

        o.set_box_threshold(0.45).unwrap();
        let snap = o.snapshot();
        assert_eq!(snap.general.box_threshold, 0.45);
        assert!(snap.needs_reset);
    }

    #[test]
    fn unparsable_text_never_coerces_to_zero() {
        let o = orchestrator();
        assert!(o.apply("box_threshold", "abc").is_err());
        assert!(o.apply("input_width", "-3").is_err());
        assert!(o.apply("max_age", "").is_err());
        let snap = o.snapshot();
        assert_eq!(snap.general.box_threshold, 0.6);
        assert_eq!(snap.general.input_width, 640);
        assert_eq!(snap.tracking.params.max_age, 1000);
        assert!(!snap.needs_reset);
    }

    #[test]
    fn tracker_affecting_fields_raise_reset() {
        let o = orchestrator();
        o.set_save_results(true).unwrap();
        o.set_screen_dimensions(1280, 720).unwrap();
        assert!(!o.snapshot().needs_reset);

        o.set_min_hits(2).unwrap();
        let snap = o.snapshot();
        assert!(snap.needs_reset);
        assert_eq!(snap.tracking.params.min_hits, 2);
    }

    #[test]
    fn switching_tracker_applies_its_defaults() {
        let o = orchestrator();
        o.apply("tracker", "IOU").unwrap();
        let snap = o.snapshot();
        assert_eq!(snap.tracking.kind, TrackerKind::Iou);
        assert_eq!(snap.tracking.params, TrackerKind::Iou.default_params());
        assert!(o.apply("tracker", "deepsort").is_err());
        assert_eq!(o.snapshot().tracking.kind, TrackerKind::Iou);
    }

    #[test]
    fn tracked_classes_must_exist() {
        let o = orchestrator();
        assert!(o.set_tracked_classes(vec!["truck".into()]).is_err());
        assert_eq!(o.snapshot().general.tracked_classes, vec!["car", "bike"]);

        o.apply("tracked_classes", " person , car ,car").unwrap();
        assert_eq!(o.snapshot().general.tracked_classes, vec!["person", "car"]);
    }

    #[test]
    fn shrinking_classes_prunes_tracked() {
        let o = orchestrator();
        o.set_classes(vec!["bike".into(), "bus".into()]).unwrap();
        let snap = o.snapshot();
        assert_eq!(snap.general.classes, vec!["bike", "bus"]);
        assert_eq!(snap.general.tracked_classes, vec!["bike"]);
        assert!(o.set_classes(vec![" ".into()]).is_err());
    }

    #[test]
    fn text_fields_parse() {
        let o = orchestrator();
        o.apply("screen-dimensions", "800x600").unwrap();
        o.apply("save_new_objects", "yes").unwrap();
        o.apply("reset_stats_min", "1.5").unwrap();
        o.apply("video_format", "gif").unwrap();
        let snap = o.snapshot();
        assert_eq!(snap.general.screen_size(), (800, 600));
        assert!(snap.general.save_new_objects);
        assert_eq!(snap.general.reset_stats_min, 1.5);

        assert!(o.apply("screen_dimensions", "800").is_err());
        assert!(o.apply("save_results", "maybe").is_err());
        assert!(o.apply("reset_stats_min", "-1").is_err());
        assert!(o.apply("no_such_field", "1").is_err());
    }

    #[test]
    fn reset_period_must_fit_the_timer() {
        let o = orchestrator();
        o.set_reset_stats_min(30.0).unwrap();
        assert!(o.set_reset_stats_min(1e18).is_err());
        assert!(o.set_reset_stats_min(f64::INFINITY).is_err());
        assert!(o.apply("reset_stats_min", "20000").is_err());
        assert_eq!(o.snapshot().general.reset_stats_min, 30.0);
        o.set_reset_stats_min(0.0).unwrap();
        assert!(!o.snapshot().general.auto_reset_enabled());
    }

    #[test]
    fn abort_and_reset_without_processors() {
        let o = orchestrator();
        o.reset_counts();
        assert_eq!(o.counts(), None);
        o.abort();
        assert!(o.snapshot().aborting);
    }

    #[test]
    fn field_names_round_trip() {
        for f in SettingField::ALL {
            assert_eq!(f.as_str().parse::<SettingField>().unwrap(), f);
        }
    }
}
