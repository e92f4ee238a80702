// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/decode.rs - 检测框解码
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

use tracing::{debug, error};

use crate::{
  config::SegConfig,
  model::DetectItem,
  postprocess::{AnchorGrid, PostprocessError, check_image_size, sigmoid},
};

pub(crate) const REG_CHANNELS: usize = 4;

/// 单个检测头的三组输出，均为 CHW 展开
#[derive(Debug, Clone, Copy)]
pub struct HeadOutputs<'a> {
  /// 4 x H x W，左/上/右/下距离，单位为特征图格子
  pub reg: &'a [f32],
  /// class_num x H x W，sigmoid 之前的分类 logit
  pub cls: &'a [f32],
  /// mask_num x H x W，掩码系数
  pub mask: &'a [f32],
}

#[derive(Debug, Clone)]
pub struct BoxDecoder {
  class_num: usize,
  mask_num: usize,
  object_thresh: f32,
  input_width: f32,
  input_height: f32,
}

impl BoxDecoder {
  pub fn from_config(config: &SegConfig) -> Self {
    Self {
      class_num: config.class_num,
      mask_num: config.mask_num,
      object_thresh: config.object_thresh,
      input_width: config.input_width as f32,
      input_height: config.input_height as f32,
    }
  }

  fn check_head(
    &self,
    head_idx: usize,
    head: &HeadOutputs,
    spatial: usize,
  ) -> Result<(), PostprocessError> {
    let expected = [
      ("回归", head.reg.len(), REG_CHANNELS * spatial),
      ("分类", head.cls.len(), self.class_num * spatial),
      ("掩码系数", head.mask.len(), self.mask_num * spatial),
    ];
    for (name, actual, expected) in expected {
      if actual != expected {
        error!(
          "检测头 {}: {}输出大小不匹配 - 期望 {}, 实际 {}",
          head_idx, name, expected, actual
        );
        return Err(PostprocessError::mismatch(
          format!("检测头 {} {}输出大小", head_idx, name),
          expected,
          actual,
        ));
      }
    }
    Ok(())
  }

  /// 对每个 (单元, 类别) 独立做阈值判断，同一单元可以产生多个类别的候选框。
  /// 返回的框已映射到原图坐标并裁剪到图像范围内。
  pub fn decode(
    &self,
    heads: &[HeadOutputs],
    anchors: &AnchorGrid,
    image_height: u32,
    image_width: u32,
  ) -> Result<Vec<DetectItem>, PostprocessError> {
    check_image_size(image_height, image_width)?;

    if heads.len() != anchors.num_heads() {
      return Err(PostprocessError::mismatch(
        "检测头数量",
        anchors.num_heads(),
        heads.len(),
      ));
    }

    let img_w = image_width as f32;
    let img_h = image_height as f32;
    let scale_w = img_w / self.input_width;
    let scale_h = img_h / self.input_height;

    let mut items = Vec::new();

    for (head_idx, (head, config)) in heads.iter().zip(anchors.heads()).enumerate() {
      let spatial = config.spatial();
      self.check_head(head_idx, head, spatial)?;

      let stride = config.stride;
      let points = anchors.head_points(head_idx);
      let before = items.len();

      for (idx, anchor) in points.iter().enumerate() {
        for cl in 0..self.class_num {
          let score = sigmoid(head.cls[cl * spatial + idx]);
          if score.is_nan() || score <= self.object_thresh {
            continue;
          }

          let l = head.reg[idx];
          let t = head.reg[spatial + idx];
          let r = head.reg[2 * spatial + idx];
          let b = head.reg[3 * spatial + idx];

          let x1 = (anchor.x - l) * stride * scale_w;
          let y1 = (anchor.y - t) * stride * scale_h;
          let x2 = (anchor.x + r) * stride * scale_w;
          let y2 = (anchor.y + b) * stride * scale_h;

          let mask_coeff = (0..self.mask_num)
            .map(|m| head.mask[m * spatial + idx])
            .collect();

          items.push(DetectItem {
            class_id: cl as u32,
            score,
            bbox: [x1.max(0.0), y1.max(0.0), x2.min(img_w), y2.min(img_h)],
            mask_coeff,
          });
        }
      }

      debug!("检测头 {}: {} 个候选框", head_idx, items.len() - before);
    }

    Ok(items)
  }
}
