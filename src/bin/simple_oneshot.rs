// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 简单的单张图像分割后处理
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use image::RgbImage;
use url::Url;

use shanan_seg::{
  FromUrl,
  config::SegConfig,
  input::ImageFileInput,
  model::{CocoLabel, SegPostprocess, TensorDump},
  output::SaveImageFileOutput,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Shanan 分割后处理参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型输出记录，例如 dump:///data/outputs.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///data/test.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///data/result.jpg?record=name
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 后处理配置文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型输出记录: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut config = match &args.config {
    Some(path) => SegConfig::from_json_file(path)?,
    None => SegConfig::default(),
  };
  if let Some(thresh) = args.confidence {
    config = config.with_object_thresh(thresh);
  }
  if let Some(thresh) = args.nms_threshold {
    config = config.with_nms_thresh(thresh);
  }

  let input_image = ImageFileInput::from_url(&args.input)?;
  let model: TensorDump<RgbImage> = TensorDump::from_url(&args.model)?;
  let output: SaveImageFileOutput<CocoLabel> = SaveImageFileOutput::from_url(&args.output)?;

  OneShotTask::new(SegPostprocess::new(config)?).run_task(input_image, model, output)?;

  Ok(())
}
