// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 设置系统 (Settings)
///
/// - General / Tracking / Model: 配置快照
/// - Session:      互斥区保护的会话状态
/// - Orchestrator: 带校验的修改入口
pub mod general;
pub mod model;
pub mod orchestrator;
pub mod session;
pub mod tracking;

pub use general::{default_output_folder, GeneralSettings};
pub use model::{ModelSettings, DEFAULT_DEVICE, GPU_DEVICE};
pub use orchestrator::{SettingField, SettingOrchestrator, SettingsSnapshot};
pub use session::{Session, SharedSession};
pub use tracking::TrackingSettings;
