// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/mask.rs - 实例掩码合成
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

use image::{Rgb, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::{
  model::DetectItem,
  postprocess::{PostprocessError, check_image_size, sigmoid},
};

const MASK_THRESH: f32 = 0.5;

/// 原型张量 C x Mh x Mw
#[derive(Debug, Clone, Copy)]
pub struct Prototypes<'a> {
  data: &'a [f32],
  channels: usize,
  height: usize,
  width: usize,
}

impl<'a> Prototypes<'a> {
  pub fn new(
    data: &'a [f32],
    channels: usize,
    height: usize,
    width: usize,
  ) -> Result<Self, PostprocessError> {
    if height == 0 || width == 0 {
      return Err(PostprocessError::mismatch(
        "原型张量空间大小",
        1,
        height * width,
      ));
    }
    let expected = channels * height * width;
    if data.len() != expected {
      return Err(PostprocessError::mismatch(
        "原型张量大小",
        expected,
        data.len(),
      ));
    }
    Ok(Self {
      data,
      channels,
      height,
      width,
    })
  }

  /// 从张量形状构造，形状取最后三维 (C, Mh, Mw)，前面的维度必须为 1
  pub fn from_shape(data: &'a [f32], shape: &[usize]) -> Result<Self, PostprocessError> {
    if shape.len() < 3 || shape[..shape.len() - 3].iter().any(|&d| d != 1) {
      return Err(PostprocessError::mismatch("原型张量维度", 3, shape.len()));
    }
    let [c, h, w] = [shape[shape.len() - 3], shape[shape.len() - 2], shape[shape.len() - 1]];
    Self::new(data, c, h, w)
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  /// 系数向量与各通道的线性组合，结果写入 `out`（Mh x Mw）
  fn combine(&self, coeff: &[f32], out: &mut [f32]) {
    let spatial = self.height * self.width;
    out.fill(0.0);
    for (c, &k) in coeff.iter().enumerate() {
      let plane = &self.data[c * spatial..(c + 1) * spatial];
      for (acc, &p) in out.iter_mut().zip(plane) {
        *acc += k * p;
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct MaskSynthesizer {
  colors: Box<[Rgb<u8>]>,
}

impl MaskSynthesizer {
  pub fn new(colors: &[[u8; 3]]) -> Result<Self, PostprocessError> {
    if colors.is_empty() {
      return Err(PostprocessError::EmptyColorTable);
    }
    Ok(Self {
      colors: colors.iter().map(|&c| Rgb(c)).collect(),
    })
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 在原型分辨率上按检测顺序依次合成，后合成的掩码覆盖先前的像素，
  /// 最后一次性缩放到原图尺寸。
  pub fn synthesize(
    &self,
    detections: &[DetectItem],
    protos: &Prototypes,
    image_height: u32,
    image_width: u32,
  ) -> Result<RgbImage, PostprocessError> {
    check_image_size(image_height, image_width)?;

    let (mh, mw) = (protos.height, protos.width);
    let mut canvas = RgbImage::new(mw as u32, mh as u32);
    let mut field = vec![0.0f32; mh * mw];

    let to_proto = |v: f32, full: u32, size: usize| -> usize {
      ((v / full as f32 * size as f32 + 0.5) as usize).min(size)
    };

    for (idx, item) in detections.iter().enumerate() {
      if item.mask_coeff.len() != protos.channels {
        return Err(PostprocessError::mismatch(
          format!("检测 {} 掩码系数维度", idx),
          protos.channels,
          item.mask_coeff.len(),
        ));
      }

      protos.combine(&item.mask_coeff, &mut field);

      let x_min = to_proto(item.bbox[0], image_width, mw);
      let y_min = to_proto(item.bbox[1], image_height, mh);
      let x_max = to_proto(item.bbox[2], image_width, mw);
      let y_max = to_proto(item.bbox[3], image_height, mh);
      let color = self.color_of(item.class_id);

      for h in y_min..y_max {
        for w in x_min..x_max {
          if sigmoid(field[h * mw + w]) > MASK_THRESH {
            canvas.put_pixel(w as u32, h as u32, color);
          }
        }
      }
    }

    debug!(
      "掩码合成: {} 个检测, 原型 {}x{} -> 原图 {}x{}",
      detections.len(),
      mh,
      mw,
      image_height,
      image_width
    );

    Ok(image::imageops::resize(
      &canvas,
      image_width,
      image_height,
      FilterType::Nearest,
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, bbox: [f32; 4], coeff: &[f32]) -> DetectItem {
    DetectItem {
      class_id,
      score: 0.9,
      bbox,
      mask_coeff: coeff.into(),
    }
  }

  /// 两通道 4x4 原型：通道 0 全为正，通道 1 左半为正、右半为负
  fn protos_data() -> Vec<f32> {
    let mut data = vec![1.0; 16];
    data.extend((0..16).map(|i| if i % 4 < 2 { 1.0 } else { -1.0 }));
    data
  }

  fn colors() -> MaskSynthesizer {
    MaskSynthesizer::new(&[[10, 0, 0], [0, 20, 0], [0, 0, 30]]).unwrap()
  }

  #[test]
  fn paints_inside_box_where_mask_is_positive() {
    let data = protos_data();
    let protos = Prototypes::new(&data, 2, 4, 4).unwrap();
    let det = item(1, [0.0, 0.0, 8.0, 8.0], &[0.0, 1.0]);

    let overlay = colors().synthesize(&[det], &protos, 8, 8).unwrap();
    assert_eq!(overlay.dimensions(), (8, 8));

    // 框覆盖整个原型，掩码只在左半边为正
    for y in 0..8 {
      for x in 0..8 {
        let expected = if x < 4 { Rgb([0, 20, 0]) } else { Rgb([0, 0, 0]) };
        assert_eq!(*overlay.get_pixel(x, y), expected, "pixel ({}, {})", x, y);
      }
    }
  }

  #[test]
  fn negative_mask_region_stays_background() {
    let data = protos_data();
    let protos = Prototypes::new(&data, 2, 4, 4).unwrap();
    let det = item(0, [0.0, 0.0, 4.0, 4.0], &[0.0, 1.0]);

    let overlay = colors().synthesize(&[det], &protos, 4, 4).unwrap();
    assert_eq!(*overlay.get_pixel(1, 1), Rgb([10, 0, 0]));
    assert_eq!(*overlay.get_pixel(2, 1), Rgb([0, 0, 0]));
    assert_eq!(*overlay.get_pixel(3, 3), Rgb([0, 0, 0]));
  }

  #[test]
  fn later_detection_overwrites_earlier() {
    let data = protos_data();
    let protos = Prototypes::new(&data, 2, 4, 4).unwrap();
    let first = item(0, [0.0, 0.0, 4.0, 4.0], &[1.0, 0.0]);
    let second = item(2, [1.0, 1.0, 3.0, 3.0], &[1.0, 0.0]);

    let overlay = colors()
      .synthesize(&[first.clone(), second.clone()], &protos, 4, 4)
      .unwrap();
    assert_eq!(*overlay.get_pixel(0, 0), Rgb([10, 0, 0]));
    assert_eq!(*overlay.get_pixel(1, 1), Rgb([0, 0, 30]));
    assert_eq!(*overlay.get_pixel(2, 2), Rgb([0, 0, 30]));

    let overlay = colors().synthesize(&[second, first], &protos, 4, 4).unwrap();
    assert_eq!(*overlay.get_pixel(1, 1), Rgb([10, 0, 0]));
  }

  #[test]
  fn colors_wrap_around_table() {
    let synth = colors();
    assert_eq!(synth.color_of(3), synth.color_of(0));
    assert_eq!(synth.color_of(5), Rgb([0, 0, 30]));
  }

  #[test]
  fn empty_color_table_is_rejected() {
    assert_eq!(
      MaskSynthesizer::new(&[]).unwrap_err(),
      PostprocessError::EmptyColorTable
    );
  }

  #[test]
  fn box_edges_round_half_up_in_prototype_space() {
    let data = vec![1.0; 16];
    let protos = Prototypes::new(&data, 1, 4, 4).unwrap();
    // x: 1.49 -> 1, 2.5 -> 3；y: 0.5 -> 1, 3.49 -> 3
    let det = item(1, [1.49, 0.5, 2.5, 3.49], &[1.0]);

    let overlay = colors().synthesize(&[det], &protos, 4, 4).unwrap();
    for y in 0..4 {
      for x in 0..4 {
        let inside = (1..3).contains(&x) && (1..3).contains(&y);
        let expected = if inside { Rgb([0, 20, 0]) } else { Rgb([0, 0, 0]) };
        assert_eq!(*overlay.get_pixel(x, y), expected, "pixel ({}, {})", x, y);
      }
    }
  }

  #[test]
  fn box_edges_are_scaled_before_rounding() {
    let data = vec![1.0; 16];
    let protos = Prototypes::new(&data, 1, 4, 4).unwrap();
    // 原图 8x8 -> 原型 4x4：x 2.98 -> 1.49 -> 1，5.0 -> 2.5 -> 3
    let det = item(1, [2.98, 0.0, 5.0, 8.0], &[1.0]);

    let overlay = colors().synthesize(&[det], &protos, 8, 8).unwrap();
    for x in 0..8 {
      let expected = if (2..6).contains(&x) { Rgb([0, 20, 0]) } else { Rgb([0, 0, 0]) };
      assert_eq!(*overlay.get_pixel(x, 3), expected, "column {}", x);
    }
  }

  #[test]
  fn no_detections_gives_blank_overlay() {
    let data = protos_data();
    let protos = Prototypes::new(&data, 2, 4, 4).unwrap();
    let overlay = colors().synthesize(&[], &protos, 30, 50).unwrap();
    assert_eq!(overlay.dimensions(), (50, 30));
    assert!(overlay.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn zero_area_box_paints_nothing() {
    let data = protos_data();
    let protos = Prototypes::new(&data, 2, 4, 4).unwrap();
    let det = item(0, [2.0, 2.0, 2.0, 2.0], &[1.0, 1.0]);
    let overlay = colors().synthesize(&[det], &protos, 4, 4).unwrap();
    assert!(overlay.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn shape_checks() {
    let data = protos_data();
    assert!(Prototypes::new(&data, 3, 4, 4).is_err());
    assert!(Prototypes::new(&[], 2, 0, 4).is_err());

    let protos = Prototypes::from_shape(&data, &[1, 2, 4, 4]).unwrap();
    assert_eq!((protos.channels(), protos.height(), protos.width()), (2, 4, 4));
    assert!(Prototypes::from_shape(&data, &[2, 1, 4, 4]).is_err());
    assert!(Prototypes::from_shape(&data, &[32]).is_err());

    let det = item(0, [0.0, 0.0, 4.0, 4.0], &[1.0, 1.0, 1.0]);
    let err = colors().synthesize(&[det], &protos, 4, 4).unwrap_err();
    assert!(matches!(
      err,
      PostprocessError::ConfigurationMismatch {
        expected: 2,
        actual: 3,
        ..
      }
    ));
  }
}
