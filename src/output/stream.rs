// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 实时画面推送 (Latest-frame stream)
//!
//! 单槽位交接: 发布方覆盖旧值, 消费方按自己的节奏读取最新一帧。
//! 这是有损通道, 不是队列; 没有消费者时数据被直接丢弃, 发布永不阻塞。

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use log::{debug, info, warn};

/// 推送 JPEG 的质量
pub const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// 编码后的当前帧
    Frame(Arc<Vec<u8>>),
    /// 本次运行结束
    Finished,
}

#[derive(Clone)]
pub struct FrameStream {
    tx: Sender<StreamMessage>,
    rx: Receiver<StreamMessage>,
    published: Arc<AtomicU64>,
    replaced: Arc<AtomicU64>,
}

impl FrameStream {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            tx,
            rx,
            published: Arc::new(AtomicU64::new(0)),
            replaced: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 发布一条消息, 覆盖尚未被取走的旧值
    pub fn publish(&self, msg: StreamMessage) {
        let mut msg = msg;
        loop {
            match self.tx.try_send(msg) {
                Ok(()) => {
                    self.published.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(TrySendError::Full(back)) => {
                    // 丢掉旧值后重试
                    if self.rx.try_recv().is_ok() {
                        self.replaced.fetch_add(1, Ordering::Relaxed);
                    }
                    msg = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// 编码为 JPEG 并发布; 编码失败只记录日志
    pub fn publish_frame(&self, frame: &RgbImage) {
        match encode_jpeg(frame, JPEG_QUALITY) {
            Ok(bytes) => self.publish(StreamMessage::Frame(Arc::new(bytes))),
            Err(e) => warn!("⚠️ 推送帧编码失败: {}", e),
        }
    }

    pub fn finish(&self) {
        self.publish(StreamMessage::Finished);
    }

    /// 非阻塞读取最新值
    pub fn latest(&self) -> Option<StreamMessage> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<StreamMessage> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// 未被读取就被覆盖的帧数
    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }
}

impl Default for FrameStream {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(frame)?;
    Ok(buf.into_inner())
}

/// 在独立线程运行消费循环, 直到收到 `Finished`
///
/// `sink` 返回 false 时提前退出
pub fn spawn_stream_consumer<F>(stream: FrameStream, mut sink: F) -> JoinHandle<u64>
where
    F: FnMut(&StreamMessage) -> bool + Send + 'static,
{
    thread::spawn(move || {
        info!("📡 推送消费线程启动");
        let mut delivered = 0u64;
        loop {
            match stream.rx.recv_timeout(Duration::from_millis(200)) {
                Ok(msg) => {
                    let finished = msg == StreamMessage::Finished;
                    delivered += 1;
                    if !sink(&msg) || finished {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("推送消费线程退出, 共 {} 条", delivered);
        delivered
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> StreamMessage {
        StreamMessage::Frame(Arc::new(vec![tag]))
    }

    #[test]
    fn latest_value_wins() {
        let s = FrameStream::new();
        s.publish(frame(1));
        s.publish(frame(2));
        s.publish(frame(3));
        assert_eq!(s.latest(), Some(frame(3)));
        assert_eq!(s.latest(), None);
        assert_eq!(s.published(), 3);
        assert_eq!(s.replaced(), 2);
    }

    #[test]
    fn publish_without_consumer_never_blocks() {
        let s = FrameStream::new();
        for i in 0..1000u32 {
            s.publish(frame(i as u8));
        }
        s.finish();
        assert_eq!(s.latest(), Some(StreamMessage::Finished));
    }

    #[test]
    fn jpeg_payload_decodes() {
        let s = FrameStream::new();
        s.publish_frame(&RgbImage::from_pixel(16, 8, image::Rgb([200, 10, 10])));
        let Some(StreamMessage::Frame(bytes)) = s.latest() else {
            panic!("expected a frame");
        };
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
    }

    #[test]
    fn consumer_stops_on_finished() {
        let s = FrameStream::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let handle = spawn_stream_consumer(s.clone(), move |msg| {
            sink_seen.lock().unwrap().push(msg.clone());
            true
        });
        s.publish(frame(1));
        s.finish();
        let delivered = handle.join().unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&StreamMessage::Finished));
        assert_eq!(delivered as usize, seen.len());
    }
}
