// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess.rs - 检测与分割后处理
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

use thiserror::Error;

pub mod anchor;
pub mod decode;
pub mod mask;
pub mod nms;

pub use self::anchor::{AnchorGrid, AnchorPoint};
pub use self::decode::{BoxDecoder, HeadOutputs};
pub use self::mask::{MaskSynthesizer, Prototypes};
pub use self::nms::{iou, suppress};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PostprocessError {
  #[error("配置不匹配: {what} 期望 {expected}, 实际 {actual}")]
  ConfigurationMismatch {
    what: String,
    expected: usize,
    actual: usize,
  },
  #[error("图像尺寸无效: {width}x{height}")]
  InvalidImageDimensions { width: u32, height: u32 },
  #[error("颜色表为空")]
  EmptyColorTable,
}

impl PostprocessError {
  pub fn mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
    PostprocessError::ConfigurationMismatch {
      what: what.into(),
      expected,
      actual,
    }
  }
}

pub(crate) fn check_image_size(image_height: u32, image_width: u32) -> Result<(), PostprocessError> {
  if image_height == 0 || image_width == 0 {
    return Err(PostprocessError::InvalidImageDimensions {
      width: image_width,
      height: image_height,
    });
  }
  Ok(())
}

pub(crate) fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
