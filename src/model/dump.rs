// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/dump.rs - 从 JSON 回放已记录的模型输出
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

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Model, ModelOutput, Tensor},
};

#[derive(Error, Debug)]
pub enum TensorDumpError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("第 {index} 个张量形状与数据长度不符: 形状 {shape:?}, 数据长度 {len}")]
  ShapeMismatch {
    index: usize,
    shape: Vec<usize>,
    len: usize,
  },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Deserialize)]
struct TensorRecord {
  shape: Vec<usize>,
  data: Vec<f32>,
}

#[derive(Deserialize)]
struct DumpFile {
  outputs: Vec<TensorRecord>,
}

/// 记录下来的模型输出，每次推理都返回同一组张量。
/// 文件格式: `{ "outputs": [ { "shape": [1, 4, 80, 80], "data": [...] }, ... ] }`
pub struct TensorDump<Frame> {
  output: ModelOutput,
  _phantom: std::marker::PhantomData<Frame>,
}

impl<Frame> FromUrlWithScheme for TensorDump<Frame> {
  const SCHEME: &'static str = "dump";
}

impl<Frame> FromUrl for TensorDump<Frame> {
  type Error = TensorDumpError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TensorDumpError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    info!("加载模型输出记录: {}", url.path());
    let text = std::fs::read_to_string(url.path())?;
    Self::from_json_str(&text)
  }
}

impl<Frame> TensorDump<Frame> {
  pub fn from_output(output: ModelOutput) -> Self {
    Self {
      output,
      _phantom: std::marker::PhantomData,
    }
  }

  pub fn from_json_str(text: &str) -> Result<Self, TensorDumpError> {
    let dump: DumpFile = serde_json::from_str(text)?;

    let mut tensors = Vec::with_capacity(dump.outputs.len());
    for (index, record) in dump.outputs.into_iter().enumerate() {
      let expected: usize = record.shape.iter().product();
      if expected != record.data.len() {
        error!(
          "第 {} 个张量: 形状 {:?} 需要 {} 个元素, 实际 {}",
          index,
          record.shape,
          expected,
          record.data.len()
        );
        return Err(TensorDumpError::ShapeMismatch {
          index,
          shape: record.shape,
          len: record.data.len(),
        });
      }
      debug!("第 {} 个张量: 形状 {:?}", index, record.shape);
      tensors.push(Tensor::new(record.shape, record.data));
    }

    info!("模型输出数量: {}", tensors.len());
    Ok(Self::from_output(ModelOutput::new(tensors)))
  }
}

impl<Frame> Model for TensorDump<Frame> {
  type Input = Frame;
  type Error = TensorDumpError;

  fn infer(&self, _input: &Self::Input) -> Result<ModelOutput, Self::Error> {
    debug!("回放模型输出");
    Ok(self.output.clone())
  }
}
