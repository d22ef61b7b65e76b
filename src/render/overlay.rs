// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧上叠加元素: 文字、FPS、倒计时进度条
//!
//! 字号按 OpenCV `FONT_HERSHEY_SIMPLEX` 的 font scale 计, 乘以 `PX_PER_FONT_SCALE` 换算成像素。
//! 没有加载字体时只画图形, 文字跳过。

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

/// font scale 1.0 对应的像素高度
pub const PX_PER_FONT_SCALE: f32 = 30.0;

pub fn load_font<P: AsRef<Path>>(path: P) -> anyhow::Result<FontArc> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("读取字体失败: {}", path.display()))?;
    FontArc::try_from_vec(bytes).map_err(|e| anyhow!("无效字体 {}: {}", path.display(), e))
}

/// 在基线 (x, y) 处绘制文字, 粗细通过偏移重绘模拟; 无字体时返回 false
pub fn draw_text(
    img: &mut RgbImage,
    font: Option<&FontArc>,
    text: &str,
    x: i32,
    y: i32,
    font_scale: f32,
    thickness: u32,
    color: Rgb<u8>,
) -> bool {
    let Some(font) = font else {
        return false;
    };
    let px = (font_scale * PX_PER_FONT_SCALE).max(1.0);
    let top = y - px as i32;
    let scale = PxScale::from(px);
    for d in 0..thickness.max(1) as i32 {
        draw_text_mut(img, color, x + d, top, scale, font, text);
    }
    true
}

/// 文字像素宽度 (无字体时按每字符半个字号估算)
pub fn text_width(font: Option<&FontArc>, text: &str, font_scale: f32) -> u32 {
    let px = (font_scale * PX_PER_FONT_SCALE).max(1.0);
    match font {
        Some(font) => text_size(PxScale::from(px), font, text).0,
        None => (text.chars().count() as f32 * px * 0.5) as u32,
    }
}

/// 裁剪到图像范围内的实心矩形
pub fn fill_rect(img: &mut RgbImage, x: i32, y: i32, w: i32, h: i32, color: Rgb<u8>) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(img.width() as i32);
    let y1 = (y + h).min(img.height() as i32);
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let rect = Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32);
    draw_filled_rect_mut(img, rect, color);
}

// ========== 计数叠加布局 ==========

/// 计数文字布局, 随分辨率缩放
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountLayout {
    pub font_scale: f32,
    pub thickness: u32,
    pub x: i32,
    pub start_y: i32,
    /// 每行向上移动的像素
    pub line_step: i32,
}

impl CountLayout {
    pub fn for_frame(width: u32, height: u32) -> Self {
        let short = width.min(height) as f32;
        let font_scale = short * 2e-3;
        Self {
            font_scale,
            thickness: (short * 1e-3).ceil().max(1.0) as u32,
            x: (width as f32 / 1.5) as i32,
            start_y: (height as f32 / 1.05) as i32,
            line_step: (50.0 * font_scale) as i32,
        }
    }

    /// 第 i 行的基线位置 (自下而上)
    pub fn line_origin(&self, i: usize) -> (i32, i32) {
        (self.x, self.start_y - self.line_step * i as i32)
    }
}

// ========== FPS / 进度条 ==========

pub fn draw_fps_text(img: &mut RgbImage, font: Option<&FontArc>, fps: f64) {
    let text = format!("FPS: {:.1}", fps);
    draw_text(img, font, &text, 50, 50, 0.6, 2, Rgb([255, 255, 40]));
}

/// 底部进度条 + 上方居中说明文字; `percentage` 为 0-100
pub fn draw_progress_bar(img: &mut RgbImage, font: Option<&FontArc>, text: &str, percentage: f64) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let bar_width = (0.7 * w as f64) as i32;
    let bar_height = (0.05 * h as f64) as i32;
    let bar_x = 50;
    let bar_y = h - bar_height - (0.05 * h as f64) as i32;

    fill_rect(img, bar_x, bar_y, bar_width, bar_height, Rgb([50, 50, 50]));
    let progress = ((percentage.clamp(0.0, 100.0) / 100.0) * bar_width as f64) as i32;
    fill_rect(img, bar_x, bar_y, progress, bar_height, Rgb([0, 255, 0]));

    let text_x = bar_x + bar_width / 2 - text_width(font, text, 0.6) as i32 / 2;
    draw_text(img, font, text, text_x, bar_y - 10, 0.6, 2, Rgb([255, 255, 255]));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_scales_with_resolution() {
        let l = CountLayout::for_frame(1920, 1080);
        assert!((l.font_scale - 2.16).abs() < 1e-4);
        assert_eq!(l.thickness, 2);
        assert_eq!(l.x, 1280);
        assert_eq!(l.start_y, 1028);
        assert_eq!(l.line_step, 108);
        assert_eq!(l.line_origin(1), (1280, 920));

        let small = CountLayout::for_frame(640, 480);
        assert!(small.font_scale < l.font_scale);
        assert_eq!(small.thickness, 1);
    }

    #[test]
    fn progress_bar_fill_tracks_percentage() {
        let mut img = RgbImage::new(200, 100);
        draw_progress_bar(&mut img, None, "Resetting statistics in: 30", 50.0);
        // bar: x 50..190, y 90..95 (h=5)
        let bar_y = 100 - 5 - 5;
        assert_eq!(*img.get_pixel(55, bar_y as u32), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(185, bar_y as u32), Rgb([50, 50, 50]));
        assert_eq!(*img.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn text_without_font_is_skipped() {
        let mut img = RgbImage::new(10, 10);
        assert!(!draw_text(&mut img, None, "x", 0, 5, 1.0, 1, Rgb([255, 0, 0])));
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn fill_rect_clips_to_image() {
        let mut img = RgbImage::new(4, 4);
        fill_rect(&mut img, -2, -2, 4, 4, Rgb([9, 9, 9]));
        assert_eq!(*img.get_pixel(1, 1), Rgb([9, 9, 9]));
        assert_eq!(*img.get_pixel(2, 2), Rgb([0, 0, 0]));
        fill_rect(&mut img, 10, 10, 4, 4, Rgb([9, 9, 9]));
    }
}
