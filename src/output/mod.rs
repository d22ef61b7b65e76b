// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 输出系统 (Output)
///
/// - ResultSaver:  视频容器 + 截图, 运行结束时关闭并复制
/// - VideoWriter:  GIF / MP4 写入器
/// - FrameStream:  最新帧单槽推送
pub mod result_saver;
pub mod stream;
pub mod video_writer;

pub use result_saver::ResultSaver;
pub use stream::{encode_jpeg, spawn_stream_consumer, FrameStream, StreamMessage};
pub use video_writer::{open_writer, GifVideoWriter, VideoFormat, VideoWriter};
