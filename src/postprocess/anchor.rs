// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/anchor.rs - 锚点网格
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

use tracing::debug;

use crate::config::HeadConfig;

/// 特征图单元中心，单位为特征图格子
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPoint {
  pub x: f32,
  pub y: f32,
}

/// 所有检测头的锚点，按 检测头 -> 行 -> 列 的顺序展开，
/// 与模型输出张量的展开顺序一致。构造后只读。
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorGrid {
  heads: Box<[HeadConfig]>,
  offsets: Box<[usize]>,
  points: Box<[AnchorPoint]>,
}

impl AnchorGrid {
  pub fn new(heads: &[HeadConfig]) -> Self {
    let total = heads.iter().map(HeadConfig::spatial).sum();
    let mut points = Vec::with_capacity(total);
    let mut offsets = Vec::with_capacity(heads.len());

    for head in heads {
      offsets.push(points.len());
      for row in 0..head.rows {
        for col in 0..head.cols {
          points.push(AnchorPoint {
            x: col as f32 + 0.5,
            y: row as f32 + 0.5,
          });
        }
      }
    }

    debug!("生成锚点网格: {} 个检测头, {} 个锚点", heads.len(), points.len());

    Self {
      heads: heads.into(),
      offsets: offsets.into_boxed_slice(),
      points: points.into_boxed_slice(),
    }
  }

  pub fn heads(&self) -> &[HeadConfig] {
    &self.heads
  }

  pub fn num_heads(&self) -> usize {
    self.heads.len()
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn points(&self) -> &[AnchorPoint] {
    &self.points
  }

  /// 单个检测头的锚点，下标为 `row * cols + col`
  pub fn head_points(&self, head_idx: usize) -> &[AnchorPoint] {
    let start = self.offsets[head_idx];
    &self.points[start..start + self.heads[head_idx].spatial()]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::YOLOV8_SEG_HEADS;

  #[test]
  fn enumerates_head_then_row_then_col() {
    let grid = AnchorGrid::new(&[HeadConfig::new(8.0, 2, 3), HeadConfig::new(16.0, 1, 2)]);
    assert_eq!(grid.len(), 8);
    assert_eq!(grid.num_heads(), 2);

    let first = grid.head_points(0);
    assert_eq!(first[0], AnchorPoint { x: 0.5, y: 0.5 });
    assert_eq!(first[1], AnchorPoint { x: 1.5, y: 0.5 });
    assert_eq!(first[3], AnchorPoint { x: 0.5, y: 1.5 });
    assert_eq!(first[5], AnchorPoint { x: 2.5, y: 1.5 });

    let second = grid.head_points(1);
    assert_eq!(second, &[AnchorPoint { x: 0.5, y: 0.5 }, AnchorPoint { x: 1.5, y: 0.5 }]);
    assert_eq!(&grid.points()[6..], second);
  }

  #[test]
  fn default_heads_cover_all_cells() {
    let grid = AnchorGrid::new(&YOLOV8_SEG_HEADS);
    assert_eq!(grid.len(), 80 * 80 + 40 * 40 + 20 * 20);
    assert_eq!(grid.head_points(2).len(), 400);
    assert_eq!(
      grid.head_points(2).last(),
      Some(&AnchorPoint { x: 19.5, y: 19.5 })
    );
  }

  #[test]
  fn identical_config_gives_identical_grid() {
    let a = AnchorGrid::new(&YOLOV8_SEG_HEADS);
    let b = AnchorGrid::new(&YOLOV8_SEG_HEADS);
    assert!(
      a.points()
        .iter()
        .zip(b.points())
        .all(|(p, q)| p.x.to_bits() == q.x.to_bits() && p.y.to_bits() == q.y.to_bits())
    );
    assert_eq!(a, b);
  }
}
