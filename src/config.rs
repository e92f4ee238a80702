// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 后处理参数配置
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

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

pub const YOLOV8_SEG_CLASS_NUM: usize = 80;
pub const YOLOV8_SEG_MASK_NUM: usize = 32;
pub const YOLOV8_SEG_INPUT_W: u32 = 640;
pub const YOLOV8_SEG_INPUT_H: u32 = 640;
pub const YOLOV8_SEG_OBJECT_THRESH: f32 = 0.5;
pub const YOLOV8_SEG_NMS_THRESH: f32 = 0.45;
pub const YOLOV8_SEG_HEADS: [HeadConfig; 3] = [
  HeadConfig::new(8.0, 80, 80),
  HeadConfig::new(16.0, 40, 40),
  HeadConfig::new(32.0, 20, 20),
];

/// 分割掩码调色板（RGB），按 `class_id % len` 取色
pub const SEG_MASK_COLORS: [[u8; 3]; 9] = [
  [255, 0, 0],
  [0, 128, 255],
  [0, 255, 255],
  [0, 255, 0],
  [255, 255, 0],
  [0, 0, 255],
  [255, 0, 128],
  [255, 0, 255],
  [0, 0, 128],
];

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 检测头配置
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HeadConfig {
  /// 特征图一个单元对应的网络输入像素数
  pub stride: f32,
  /// 特征图行数
  pub rows: usize,
  /// 特征图列数
  pub cols: usize,
}

impl HeadConfig {
  pub const fn new(stride: f32, rows: usize, cols: usize) -> Self {
    Self { stride, rows, cols }
  }

  pub fn spatial(&self) -> usize {
    self.rows * self.cols
  }
}

/// YOLOv8-seg 后处理配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SegConfig {
  /// 检测头，按步长从小到大排列
  pub heads: Vec<HeadConfig>,
  pub input_width: u32,
  pub input_height: u32,
  pub class_num: usize,
  /// 掩码系数维度，同时也是原型张量的通道数
  pub mask_num: usize,
  pub object_thresh: f32,
  pub nms_thresh: f32,
  pub colors: Vec<[u8; 3]>,
}

impl Default for SegConfig {
  fn default() -> Self {
    Self {
      heads: YOLOV8_SEG_HEADS.to_vec(),
      input_width: YOLOV8_SEG_INPUT_W,
      input_height: YOLOV8_SEG_INPUT_H,
      class_num: YOLOV8_SEG_CLASS_NUM,
      mask_num: YOLOV8_SEG_MASK_NUM,
      object_thresh: YOLOV8_SEG_OBJECT_THRESH,
      nms_thresh: YOLOV8_SEG_NMS_THRESH,
      colors: SEG_MASK_COLORS.to_vec(),
    }
  }
}

impl SegConfig {
  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载后处理配置: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
    let config: SegConfig = serde_json::from_str(text)?;
    config.validate()?;
    debug!("后处理配置: {:?}", config);
    Ok(config)
  }

  pub fn with_heads(mut self, heads: Vec<HeadConfig>) -> Self {
    self.heads = heads;
    self
  }

  pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn with_class_num(mut self, class_num: usize) -> Self {
    self.class_num = class_num;
    self
  }

  pub fn with_mask_num(mut self, mask_num: usize) -> Self {
    self.mask_num = mask_num;
    self
  }

  pub fn with_object_thresh(mut self, thresh: f32) -> Self {
    self.object_thresh = thresh;
    self
  }

  pub fn with_nms_thresh(mut self, thresh: f32) -> Self {
    self.nms_thresh = thresh;
    self
  }

  pub fn with_colors(mut self, colors: Vec<[u8; 3]>) -> Self {
    self.colors = colors;
    self
  }

  /// 模型输出张量数量：每个检测头回归、分类、掩码系数各一个，再加一个原型张量
  pub fn num_outputs(&self) -> usize {
    self.heads.len() * 3 + 1
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.heads.is_empty() {
      return Err(ConfigError::Invalid("至少需要一个检测头".to_string()));
    }
    for (idx, head) in self.heads.iter().enumerate() {
      if !(head.stride > 0.0) || head.rows == 0 || head.cols == 0 {
        return Err(ConfigError::Invalid(format!(
          "检测头 {} 参数无效: 步长={}, 特征图={}x{}",
          idx, head.stride, head.rows, head.cols
        )));
      }
    }
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::Invalid(format!(
        "网络输入尺寸无效: {}x{}",
        self.input_width, self.input_height
      )));
    }
    if self.class_num == 0 {
      return Err(ConfigError::Invalid("类别数量不能为 0".to_string()));
    }
    if self.mask_num == 0 {
      return Err(ConfigError::Invalid("掩码系数维度不能为 0".to_string()));
    }
    if !(0.0..1.0).contains(&self.object_thresh) {
      return Err(ConfigError::Invalid(format!(
        "置信度阈值必须在 [0, 1) 内: {}",
        self.object_thresh
      )));
    }
    if !(self.nms_thresh > 0.0 && self.nms_thresh <= 1.0) {
      return Err(ConfigError::Invalid(format!(
        "NMS 阈值必须在 (0, 1] 内: {}",
        self.nms_thresh
      )));
    }
    if self.colors.is_empty() {
      return Err(ConfigError::Invalid("调色板不能为空".to_string()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_is_yolov8_seg() {
    let config = SegConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.num_outputs(), 10);
    assert_eq!(config.heads[0], HeadConfig::new(8.0, 80, 80));
    assert_eq!(config.heads[2].spatial(), 400);
    assert_eq!(config.colors.len(), 9);
  }

  #[test]
  fn json_overrides_keep_defaults() {
    let config = SegConfig::from_json_str(
      r#"{ "object_thresh": 0.25, "heads": [{ "stride": 8, "rows": 2, "cols": 3 }] }"#,
    )
    .unwrap();
    assert_eq!(config.object_thresh, 0.25);
    assert_eq!(config.heads, vec![HeadConfig::new(8.0, 2, 3)]);
    assert_eq!(config.nms_thresh, YOLOV8_SEG_NMS_THRESH);
    assert_eq!(config.class_num, YOLOV8_SEG_CLASS_NUM);
    assert_eq!(config.num_outputs(), 4);
  }

  #[test]
  fn invalid_values_are_rejected() {
    assert!(SegConfig::default().with_heads(vec![]).validate().is_err());
    assert!(
      SegConfig::default()
        .with_heads(vec![HeadConfig::new(0.0, 2, 2)])
        .validate()
        .is_err()
    );
    assert!(SegConfig::default().with_object_thresh(1.0).validate().is_err());
    assert!(SegConfig::default().with_nms_thresh(0.0).validate().is_err());
    assert!(SegConfig::default().with_colors(vec![]).validate().is_err());
    assert!(SegConfig::default().with_mask_num(0).validate().is_err());
    assert!(SegConfig::default().with_input_size(0, 640).validate().is_err());
  }

  #[test]
  fn malformed_json_is_an_error() {
    assert!(matches!(
      SegConfig::from_json_str("{ not json"),
      Err(ConfigError::JsonError(_))
    ));
  }
}
