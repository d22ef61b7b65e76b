// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 输入模块 (Input)
///
/// - source:          帧源接口, 跳帧/存帧适配器
/// - image_sequence:  图片目录
/// - memory:          内存帧 (测试)
/// - ffmpeg:          视频文件 / 摄像头 (需启用 `ffmpeg` feature)
pub mod image_sequence;
pub mod memory;
pub mod source;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use image_sequence::{ImageSequenceSource, DEFAULT_SEQUENCE_FPS};
pub use memory::MemorySource;
pub use source::{FrameSource, SaveEachFrame, SkipFrames};

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegSource, CAMERA_FPS_GUESS};
