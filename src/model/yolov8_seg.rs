// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolov8_seg.rs - YOLOv8-seg 后处理流程
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

use tracing::{debug, error, info};

use crate::{
  config::{ConfigError, HeadConfig, SegConfig},
  model::{DetectResult, ModelOutput, SegmentResult},
  postprocess::{
    AnchorGrid, BoxDecoder, HeadOutputs, MaskSynthesizer, PostprocessError, Prototypes,
    check_image_size, decode::REG_CHANNELS, suppress,
  },
};

/// 模型输出顺序:
/// `[reg0, cls0, reg1, cls1, ..., mask0, mask1, ..., protos]`
///
/// 锚点网格在构造时生成一次，之后只读，可以在多个线程间共享。
#[derive(Debug, Clone)]
pub struct SegPostprocess {
  config: SegConfig,
  anchors: AnchorGrid,
  decoder: BoxDecoder,
  synthesizer: MaskSynthesizer,
}

impl SegPostprocess {
  pub fn new(config: SegConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    info!(
      "初始化 YOLOv8-seg 后处理: {} 个检测头, {} 类, 掩码维度 {}",
      config.heads.len(),
      config.class_num,
      config.mask_num
    );

    let anchors = AnchorGrid::new(&config.heads);
    let decoder = BoxDecoder::from_config(&config);
    let synthesizer =
      MaskSynthesizer::new(&config.colors).map_err(|e| ConfigError::Invalid(e.to_string()))?;

    Ok(Self {
      config,
      anchors,
      decoder,
      synthesizer,
    })
  }

  pub fn config(&self) -> &SegConfig {
    &self.config
  }

  pub fn anchors(&self) -> &AnchorGrid {
    &self.anchors
  }

  pub fn postprocess(
    &self,
    output: &ModelOutput,
    image_height: u32,
    image_width: u32,
  ) -> Result<SegmentResult, PostprocessError> {
    check_image_size(image_height, image_width)?;

    let num_heads = self.config.heads.len();
    let expected = self.config.num_outputs();
    if output.num_outputs() != expected {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        expected,
        output.num_outputs()
      );
      return Err(PostprocessError::mismatch(
        "模型输出数量",
        expected,
        output.num_outputs(),
      ));
    }

    let mut heads = Vec::with_capacity(num_heads);
    for (head_idx, head) in self.config.heads.iter().enumerate() {
      heads.push(HeadOutputs {
        reg: head_tensor(output, head_idx * 2, head_idx, "回归", REG_CHANNELS, head)?,
        cls: head_tensor(
          output,
          head_idx * 2 + 1,
          head_idx,
          "分类",
          self.config.class_num,
          head,
        )?,
        mask: head_tensor(
          output,
          num_heads * 2 + head_idx,
          head_idx,
          "掩码系数",
          self.config.mask_num,
          head,
        )?,
      });
    }

    let protos_tensor = output.get(expected - 1)?;
    let protos = Prototypes::from_shape(&protos_tensor.data, &protos_tensor.shape)?;
    if protos.channels() != self.config.mask_num {
      return Err(PostprocessError::mismatch(
        "原型张量通道数",
        self.config.mask_num,
        protos.channels(),
      ));
    }

    let now = std::time::Instant::now();
    let candidates = self
      .decoder
      .decode(&heads, &self.anchors, image_height, image_width)?;
    debug!("解码得到 {} 个候选框", candidates.len());

    let items = suppress(candidates, self.config.nms_thresh);
    debug!("检测结果: {:?}", items);

    let overlay = self
      .synthesizer
      .synthesize(&items, &protos, image_height, image_width)?;
    debug!("后处理耗时: {:.2?}", now.elapsed());
    info!("检测到 {} 个物体", items.len());

    Ok(SegmentResult {
      detections: DetectResult {
        items: items.into_boxed_slice(),
      },
      overlay,
    })
  }
}

/// 检测头输出必须是 (C, rows, cols)，不接受 NHWC 或行列互换的布局
fn head_tensor<'a>(
  output: &'a ModelOutput,
  index: usize,
  head_idx: usize,
  name: &str,
  channels: usize,
  head: &HeadConfig,
) -> Result<&'a [f32], PostprocessError> {
  let tensor = output.get(index)?;
  let Some([c, h, w]) = tensor.chw() else {
    error!("检测头 {}: {}输出形状无效 {:?}", head_idx, name, tensor.shape);
    return Err(PostprocessError::mismatch(
      format!("检测头 {} {}输出维度", head_idx, name),
      3,
      tensor.shape.len(),
    ));
  };

  let dims = [
    ("通道数", channels, c),
    ("行数", head.rows, h),
    ("列数", head.cols, w),
  ];
  for (dim, expected, actual) in dims {
    if expected != actual {
      error!(
        "检测头 {}: {}输出{}不匹配 - 期望 {}, 实际 {}",
        head_idx, name, dim, expected, actual
      );
      return Err(PostprocessError::mismatch(
        format!("检测头 {} {}输出{}", head_idx, name, dim),
        expected,
        actual,
      ));
    }
  }
  Ok(&tensor.data)
}
