// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 类别颜色表

use image::Rgb;

/// 每个类别一个颜色, 沿 "spring" 色带 (品红 → 黄) 均匀取样
#[derive(Debug, Clone)]
pub struct ColorMap {
    colors: Vec<Rgb<u8>>,
}

impl ColorMap {
    pub fn spring(n: usize) -> Self {
        let colors = (0..n)
            .map(|i| {
                let v = ((i as f32 / n as f32) * 255.0) as u8;
                Rgb([255, v, 255 - v])
            })
            .collect();
        Self { colors }
    }

    /// 越界时回退到白色
    pub fn color(&self, class_id: usize) -> Rgb<u8> {
        self.colors.get(class_id).copied().unwrap_or(Rgb([255, 255, 255]))
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
