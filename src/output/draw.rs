// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 检测与分割结果可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use tracing::warn;

use crate::model::{DetectResult, SegmentResult, WithLabel};

const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: i32 = 2;
const OVERLAY_ALPHA: f32 = 0.8;

pub struct Draw {
  box_color: [u8; 3],
  box_thickness: i32,
  overlay_alpha: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      box_color: BOX_COLOR,
      box_thickness: BOX_THICKNESS,
      overlay_alpha: OVERLAY_ALPHA,
    }
  }
}

impl Draw {
  /// `image = clip(image + overlay * alpha, 0, 255)`
  pub fn blend_overlay(&self, image: &mut RgbImage, overlay: &RgbImage) {
    if image.dimensions() != overlay.dimensions() {
      warn!(
        "分割掩码尺寸 {:?} 与图像尺寸 {:?} 不一致，跳过叠加",
        overlay.dimensions(),
        image.dimensions()
      );
      return;
    }

    for (dst, src) in image.pixels_mut().zip(overlay.pixels()) {
      for c in 0..3 {
        let v = dst[c] as f32 + src[c] as f32 * self.overlay_alpha;
        dst[c] = v.clamp(0.0, 255.0) as u8;
      }
    }
  }

  // bbox 为原图像素坐标 [x_min, y_min, x_max, y_max]
  pub fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    // 由外向内逐层绘制，加粗边框
    for t in 0..self.box_thickness {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }
  }

  pub fn draw_result(&self, image: &mut RgbImage, result: &SegmentResult) {
    self.blend_overlay(image, &result.overlay);
    for item in result.detections.items.iter() {
      self.draw_bbox(image, &item.bbox);
    }
  }
}

/// 把检测结果写成文本，每行 `label, score, x_min, y_min, x_max, y_max`
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn format<T: WithLabel>(&self, result: &DetectResult) -> String {
    let mut records = Vec::with_capacity(result.items.len());
    for item in result.items.iter() {
      let kind = T::from_label_id(item.class_id);
      let name = if self.label_with_name {
        kind.to_label_str()
      } else {
        format!("{}", kind.to_label_id())
      };
      records.push(format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        name, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
      ));
    }
    records.join("\n")
  }

  pub fn record<T: WithLabel>(
    &self,
    result: &DetectResult,
    path: &std::path::Path,
  ) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format::<T>(result))
  }
}
