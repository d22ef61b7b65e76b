// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 绘制系统 (Rendering)
///
/// - Annotator: 检测框/标签/计数
/// - Overlay:   FPS 文本、倒计时进度条、字体加载
/// - Palette:   类别颜色
pub mod annotator;
pub mod overlay;
pub mod palette;

pub use annotator::FrameAnnotator;
pub use overlay::{draw_fps_text, draw_progress_bar, load_font, CountLayout};
pub use palette::ColorMap;
