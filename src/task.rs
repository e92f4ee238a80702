// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 推理任务
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

use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{info, warn};

use crate::{
  model::{Model, SegPostprocess, SegmentResult},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

fn infer_and_postprocess<M, ME>(
  post: &SegPostprocess,
  model: &M,
  frame: &RgbImage,
) -> anyhow::Result<(SegmentResult, Duration, Duration)>
where
  ME: std::error::Error + Sync + Send + 'static,
  M: Model<Input = RgbImage, Error = ME>,
{
  let now = Instant::now();
  let output = model.infer(frame)?;
  let infer_elapsed = now.elapsed();

  let now = Instant::now();
  let (width, height) = frame.dimensions();
  let result = post.postprocess(&output, height, width)?;
  Ok((result, infer_elapsed, now.elapsed()))
}

pub struct OneShotTask {
  postprocess: SegPostprocess,
}

impl OneShotTask {
  pub fn new(postprocess: SegPostprocess) -> Self {
    Self { postprocess }
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Input = RgbImage, Error = ME>,
  O: Render<RgbImage, SegmentResult, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let (result, infer_elapsed, post_elapsed) =
      infer_and_postprocess(&self.postprocess, &model, &frame)?;
    info!(
      "推理完成，耗时: {:.2?}，后处理耗时: {:.2?}",
      infer_elapsed, post_elapsed
    );
    let now = Instant::now();
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

pub struct RepeatShotTask {
  postprocess: SegPostprocess,
  repeat: usize,
}

impl RepeatShotTask {
  pub const DEFAULT_REPEAT_TIMES: usize = 1000;

  pub fn new(postprocess: SegPostprocess) -> Self {
    Self {
      postprocess,
      repeat: Self::DEFAULT_REPEAT_TIMES,
    }
  }

  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Input = RgbImage, Error = ME>,
  O: Render<RgbImage, SegmentResult, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let (result, infer_elapsed, post_elapsed) =
        infer_and_postprocess(&self.postprocess, &model, &frame)?;
      info!(
        "({})推理完成，耗时: {:.2?}，后处理耗时: {:.2?}",
        i, infer_elapsed, post_elapsed
      );
      times.push(post_elapsed);
      last = Some(result);
    }

    // 前两次用于预热，不计入平均值
    if times.len() > 2 {
      warn!(
        "平均后处理时间: {:.2?}",
        times.iter().skip(2).sum::<Duration>() / (times.len() - 2) as u32
      );
    }

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
      info!("渲染完成");
    }

    Ok(())
  }
}
