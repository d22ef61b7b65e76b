// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测框与计数绘制 (Frame annotator)

use ab_glyph::FontArc;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::overlay::{draw_text, fill_rect, text_width, CountLayout};
use super::palette::ColorMap;
use crate::detection::TrackedBox;

/// 检测框线宽
const BOX_THICKNESS: i32 = 4;

pub struct FrameAnnotator {
    classes: Vec<String>,
    tracked_classes: Vec<String>,
    colors: ColorMap,
    font: Option<FontArc>,
}

impl FrameAnnotator {
    pub fn new(classes: &[String], tracked_classes: &[String], font: Option<FontArc>) -> Self {
        Self {
            classes: classes.to_vec(),
            tracked_classes: tracked_classes.to_vec(),
            colors: ColorMap::spring(classes.len()),
            font,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn font(&self) -> Option<&FontArc> {
        self.font.as_ref()
    }

    fn class_index(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == name)
    }

    fn is_tracked(&self, class_id: usize) -> bool {
        self.classes
            .get(class_id)
            .map(|name| self.tracked_classes.contains(name))
            .unwrap_or(false)
    }

    /// 画框 + 标签 "置信度 类别 id: N"; 不在白名单内的类别跳过
    pub fn draw_boxes(&self, img: &mut RgbImage, boxes: &[TrackedBox]) {
        for b in boxes {
            if !self.is_tracked(b.class_id) {
                continue;
            }
            let color = self.colors.color(b.class_id);
            let (x1, y1) = (b.x1.round() as i32, b.y1.round() as i32);
            let (x2, y2) = (b.x2.round() as i32, b.y2.round() as i32);
            draw_thick_rect(img, x1, y1, x2, y2, color, BOX_THICKNESS);

            let label = format!(
                "{:.2} {} id: {}",
                b.confidence,
                self.classes[b.class_id],
                b.track_id
            );
            draw_text(img, self.font.as_ref(), &label, x1 + 10, y1 + 60, 2.0, 2, color);
        }
    }

    /// 右下角按类别颜色绘制计数, 自下而上每类一行, 带半透明底色
    pub fn draw_counts(&self, img: &mut RgbImage, counts: &[(String, u64)]) {
        if self.font.is_none() || counts.is_empty() {
            return;
        }
        let layout = CountLayout::for_frame(img.width(), img.height());
        let line_h = (layout.font_scale * super::overlay::PX_PER_FONT_SCALE) as i32;

        for (i, (name, count)) in counts.iter().enumerate() {
            if !self.tracked_classes.contains(name) {
                continue;
            }
            let Some(idx) = self.class_index(name) else {
                continue;
            };
            let text = format!("{}: {}", name, count);
            let (x, y) = layout.line_origin(i);
            let w = text_width(self.font.as_ref(), &text, layout.font_scale) as i32;
            darken(img, x - 4, y - line_h - 4, w + 8, line_h + 8);
            fill_rect(img, x - 4, y + 2, w + 8, 2, self.colors.color(idx));
            draw_text(
                img,
                self.font.as_ref(),
                &text,
                x,
                y,
                layout.font_scale,
                layout.thickness,
                self.colors.color(idx),
            );
        }
    }
}

/// 线宽通过向外扩展多层空心矩形实现
fn draw_thick_rect(img: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb<u8>, thickness: i32) {
    let (w, h) = (x2 - x1, y2 - y1);
    if w <= 0 || h <= 0 {
        return;
    }
    for offset in 0..thickness {
        let rect = Rect::at(x1 - offset, y1 - offset)
            .of_size((w + offset * 2) as u32, (h + offset * 2) as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// 区域亮度减半
fn darken(img: &mut RgbImage, x: i32, y: i32, w: i32, h: i32) {
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = ((x + w).max(0) as u32).min(img.width());
    let y1 = ((y + h).max(0) as u32).min(img.height());
    for py in y0..y1 {
        for px in x0..x1 {
            let p = img.get_pixel_mut(px, py);
            p.0 = [p.0[0] / 2, p.0[1] / 2, p.0[2] / 2];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn tbox(class_id: usize) -> TrackedBox {
        TrackedBox {
            x1: 10.0,
            y1: 10.0,
            x2: 50.0,
            y2: 50.0,
            track_id: 1,
            confidence: 0.9,
            class_id,
        }
    }

    #[test]
    fn draws_tracked_boxes_only() {
        let ann = FrameAnnotator::new(&names(&["bike", "car"]), &names(&["bike"]), None);
        let mut img = RgbImage::new(64, 64);
        ann.draw_boxes(&mut img, &[tbox(1)]);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));

        ann.draw_boxes(&mut img, &[tbox(0)]);
        assert_eq!(*img.get_pixel(10, 10), ColorMap::spring(2).color(0));
        assert_eq!(*img.get_pixel(7, 7), ColorMap::spring(2).color(0));
        assert_eq!(*img.get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn out_of_range_class_is_ignored() {
        let ann = FrameAnnotator::new(&names(&["bike"]), &names(&["bike"]), None);
        let mut img = RgbImage::new(64, 64);
        ann.draw_boxes(&mut img, &[tbox(5)]);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn counts_without_font_leave_frame_untouched() {
        let ann = FrameAnnotator::new(&names(&["bike"]), &names(&["bike"]), None);
        let mut img = RgbImage::from_pixel(64, 64, Rgb([100, 100, 100]));
        ann.draw_counts(&mut img, &[("bike".to_string(), 3)]);
        assert!(img.pixels().all(|p| *p == Rgb([100, 100, 100])));
    }
}
