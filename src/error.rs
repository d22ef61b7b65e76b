// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型 (Error types)
//!
//! - `Setup`:          运行启动失败 (摄像头不可用、输出目录不可写), 终止本次运行
//! - `InvalidSetting`: 配置校验失败, 在修改入口处拒绝, 保留旧值
//! - `Frame`:          单帧处理失败, 跳过该帧继续运行

use thiserror::Error;

/// 库内统一的 Result 别名
pub type Result<T> = std::result::Result<T, SentinelError>;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("run setup failed: {0}")]
    Setup(String),

    #[error("invalid value {value:?} for setting `{field}`: {reason}")]
    InvalidSetting {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("frame {index} skipped: {reason}")]
    Frame { index: usize, reason: String },

    #[error("detector error: {0}")]
    Detector(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SentinelError {
    pub fn setup<S: Into<String>>(msg: S) -> Self {
        Self::Setup(msg.into())
    }

    pub fn invalid<V: ToString, R: Into<String>>(field: &'static str, value: V, reason: R) -> Self {
        Self::InvalidSetting {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// 是否为致命错误 (终止运行)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Setup(_) | Self::Io(_))
    }
}
