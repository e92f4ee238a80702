// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use image::RgbImage;

use crate::postprocess::PostprocessError;

/// 推理后端。模型本身对后处理不透明，只需按固定顺序交出输出张量。
pub trait Model {
  type Input;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<ModelOutput, Self::Error>;
}

/// 单个输出张量，`data` 按 `shape` 行优先展开
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  pub shape: Box<[usize]>,
  pub data: Box<[f32]>,
}

impl Tensor {
  pub fn new(shape: impl Into<Box<[usize]>>, data: impl Into<Box<[f32]>>) -> Self {
    Self {
      shape: shape.into(),
      data: data.into(),
    }
  }

  /// 取最后三维 (C, H, W)，前面的维度必须为 1
  pub fn chw(&self) -> Option<[usize; 3]> {
    let rank = self.shape.len();
    if rank < 3 || self.shape[..rank - 3].iter().any(|&d| d != 1) {
      return None;
    }
    Some([
      self.shape[rank - 3],
      self.shape[rank - 2],
      self.shape[rank - 1],
    ])
  }
}

/// 模型一次推理的全部输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutput {
  pub tensors: Vec<Tensor>,
}

impl ModelOutput {
  pub fn new(tensors: Vec<Tensor>) -> Self {
    Self { tensors }
  }

  pub fn num_outputs(&self) -> usize {
    self.tensors.len()
  }

  pub fn get(&self, index: usize) -> Result<&Tensor, PostprocessError> {
    self
      .tensors
      .get(index)
      .ok_or_else(|| PostprocessError::mismatch("模型输出数量", index + 1, self.tensors.len()))
  }

  pub fn get_f32(&self, index: usize) -> Result<&[f32], PostprocessError> {
    self.get(index).map(|tensor| &tensor.data[..])
  }
}

/// 检测结果。解码得到的候选框与 NMS 之后保留的检测框共用此结构。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
  pub mask_coeff: Box<[f32]>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

/// 一张图像的检测与分割结果
#[derive(Debug, Clone)]
pub struct SegmentResult {
  pub detections: DetectResult,
  /// 与原图等大的彩色分割掩码，背景为 0
  pub overlay: RgbImage,
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn from_label_id(id: u32) -> Self;
  fn to_label_id(&self) -> u32;
}

mod label;
pub use self::label::{COCO_CLASSES, CocoLabel};

mod yolov8_seg;
pub use self::yolov8_seg::SegPostprocess;

#[cfg(feature = "model_dump")]
mod dump;
#[cfg(feature = "model_dump")]
pub use self::dump::{TensorDump, TensorDumpError};
