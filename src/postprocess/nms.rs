// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/nms.rs - 按类别的非极大值抑制
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

use crate::model::DetectItem;

/// 计算两个边界框的 IoU，框格式为 [x_min, y_min, x_max, y_max]
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let inner_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let inner_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let intersection = inner_w * inner_h;

  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 贪心 NMS：按分数降序（稳定排序），保留的框只抑制同类别且 IoU 超过阈值的后续框。
/// 输出顺序即保留顺序，掩码合成依赖这一顺序。
pub fn suppress(mut candidates: Vec<DetectItem>, iou_thresh: f32) -> Vec<DetectItem> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut active = vec![true; candidates.len()];
  for i in 0..candidates.len() {
    if !active[i] {
      continue;
    }
    let keep = &candidates[i];
    for j in (i + 1)..candidates.len() {
      if !active[j] || candidates[j].class_id != keep.class_id {
        continue;
      }
      if iou(&keep.bbox, &candidates[j].bbox) > iou_thresh {
        active[j] = false;
      }
    }
  }

  let before = candidates.len();
  let kept: Vec<DetectItem> = candidates
    .into_iter()
    .zip(active)
    .filter_map(|(item, active)| active.then_some(item))
    .collect();

  debug!("NMS: {} 个候选框, 保留 {} 个", before, kept.len());
  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::{Rng, SeedableRng, rngs::StdRng};

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
      mask_coeff: Box::new([]),
    }
  }

  fn random_box(rng: &mut StdRng) -> [f32; 4] {
    let x0 = rng.random_range(0.0f32..100.0);
    let y0 = rng.random_range(0.0f32..100.0);
    let w = rng.random_range(0.0f32..50.0);
    let h = rng.random_range(0.0f32..50.0);
    [x0, y0, x0 + w, y0 + h]
  }

  #[test]
  fn iou_is_symmetric_and_bounded() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..1000 {
      let a = random_box(&mut rng);
      let b = random_box(&mut rng);
      let ab = iou(&a, &b);
      assert_eq!(ab, iou(&b, &a));
      assert!((0.0..=1.0).contains(&ab), "iou {} out of range", ab);
    }
  }

  #[test]
  fn iou_of_box_with_itself_is_one() {
    let a = [3.0, 4.0, 10.0, 20.0];
    assert_eq!(iou(&a, &a), 1.0);
  }

  #[test]
  fn iou_edge_cases() {
    // 不相交
    assert_eq!(iou(&[0.0, 0.0, 1.0, 1.0], &[2.0, 2.0, 3.0, 3.0]), 0.0);
    // 退化的零面积框
    assert_eq!(iou(&[5.0, 5.0, 5.0, 5.0], &[5.0, 5.0, 5.0, 5.0]), 0.0);
    let v = iou(&[0.0, 0.0, 10.0, 10.0], &[1.0, 1.0, 11.0, 11.0]);
    assert!((v - 81.0 / 119.0).abs() < 1e-6);
  }

  #[test]
  fn overlapping_same_class_keeps_highest() {
    let kept = suppress(
      vec![
        item(0, 0.8, [1.0, 1.0, 11.0, 11.0]),
        item(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[0].bbox, [0.0, 0.0, 10.0, 10.0]);
  }

  #[test]
  fn different_classes_never_suppress() {
    let bbox = [0.0, 0.0, 10.0, 10.0];
    let kept = suppress(vec![item(0, 0.9, bbox), item(1, 0.8, bbox)], 0.45);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].class_id, 0);
    assert_eq!(kept[1].class_id, 1);
  }

  #[test]
  fn empty_input_gives_empty_output() {
    assert!(suppress(Vec::new(), 0.45).is_empty());
  }

  #[test]
  fn ties_keep_insertion_order() {
    let kept = suppress(
      vec![
        item(2, 0.7, [0.0, 0.0, 1.0, 1.0]),
        item(1, 0.7, [5.0, 5.0, 6.0, 6.0]),
        item(3, 0.9, [9.0, 9.0, 10.0, 10.0]),
      ],
      0.45,
    );
    let classes: Vec<u32> = kept.iter().map(|k| k.class_id).collect();
    assert_eq!(classes, vec![3, 2, 1]);
  }

  #[test]
  fn suppressed_box_does_not_suppress_others() {
    // b 被 a 抑制后不再作为抑制源，c 只与 b 重叠，应被保留
    let a = item(0, 0.9, [0.0, 0.0, 10.0, 10.0]);
    let b = item(0, 0.8, [2.0, 0.0, 12.0, 10.0]);
    let c = item(0, 0.7, [5.0, 0.0, 15.0, 10.0]);
    assert!(iou(&a.bbox, &b.bbox) > 0.45);
    assert!(iou(&b.bbox, &c.bbox) > 0.45);
    assert!(iou(&a.bbox, &c.bbox) <= 0.45);

    let kept = suppress(vec![c, b, a], 0.45);
    let scores: Vec<f32> = kept.iter().map(|k| k.score).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
  }

  #[test]
  fn random_suppression_properties() {
    let mut rng = StdRng::seed_from_u64(42);
    let candidates: Vec<DetectItem> = (0..200)
      .map(|_| {
        let class_id = rng.random_range(0..3);
        let score = rng.random_range(0.5f32..1.0);
        item(class_id, score, random_box(&mut rng))
      })
      .collect();

    let kept = suppress(candidates.clone(), 0.45);

    // 再次抑制不改变结果
    assert_eq!(suppress(kept.clone(), 0.45), kept);

    // 同类别内保留框两两 IoU 不超过阈值
    for (i, a) in kept.iter().enumerate() {
      for b in &kept[i + 1..] {
        if a.class_id == b.class_id {
          assert!(iou(&a.bbox, &b.bbox) <= 0.45);
        }
      }
    }

    // 每个被抑制的框都存在同类别、分数不低于它且重叠超过阈值的保留框
    for cand in candidates.iter().filter(|c| !kept.contains(c)) {
      assert!(kept.iter().any(|k| {
        k.class_id == cand.class_id
          && k.score >= cand.score
          && iou(&k.bbox, &cand.bbox) > 0.45
      }));
    }
  }
}
