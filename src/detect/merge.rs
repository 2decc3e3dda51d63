// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/detect/merge.rs - 候选过滤与近邻合并
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

use crate::detect::config::DetectParams;
use crate::report::{Candidate, CandidateKind};

/// 过滤、合并并截断候选列表
///
/// 先按置信度下限过滤（未配置时按候选各自产出策略的默认下限），再把
/// 圆心间距小于 `merge_distance` 的候选并成一个，最后按置信度降序截断
/// 到 `max_candidates`（`None` 表示不限）。汇总模式下不同策略对同一
/// 物体的命中就在这一步收敛成单个候选。
pub fn merge_candidates(candidates: Vec<Candidate>, params: &DetectParams) -> Vec<Candidate> {
  let before = candidates.len();
  let mut kept: Vec<Candidate> = candidates
    .into_iter()
    .filter(|c| {
      let floor = params.min_confidence.unwrap_or(c.method.min_confidence());
      c.confidence >= floor
    })
    .collect();
  if kept.len() != before {
    debug!("置信度过滤: {} -> {}", before, kept.len());
  }
  if kept.is_empty() {
    return kept;
  }

  // 置信度降序，使合并种子总是簇内最可信的一个
  kept.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

  let mut merged: Vec<Candidate> = Vec::new();
  let mut consumed = vec![false; kept.len()];
  for seed_idx in 0..kept.len() {
    if consumed[seed_idx] {
      continue;
    }
    consumed[seed_idx] = true;

    let mut cluster = vec![seed_idx];
    let seed_center = kept[seed_idx].center;
    for other_idx in (seed_idx + 1)..kept.len() {
      if consumed[other_idx] {
        continue;
      }
      let dx = kept[other_idx].center[0] - seed_center[0];
      let dy = kept[other_idx].center[1] - seed_center[1];
      if (dx * dx + dy * dy).sqrt() <= params.merge_distance {
        consumed[other_idx] = true;
        cluster.push(other_idx);
      }
    }

    if cluster.len() == 1 {
      merged.push(kept[seed_idx].clone());
    } else {
      merged.push(fuse_cluster(&kept, &cluster));
    }
  }

  merged.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
  if let Some(cap) = params.max_candidates {
    merged.truncate(cap);
  }
  merged
}

/// 把一个簇并成单个候选：边界框取并集，面积求和，置信度取最大
///
/// 产出策略沿用簇种子（最可信来源）的策略。
fn fuse_cluster(candidates: &[Candidate], cluster: &[usize]) -> Candidate {
  let mut x0 = u32::MAX;
  let mut y0 = u32::MAX;
  let mut x1 = 0u32;
  let mut y1 = 0u32;
  let mut area = 0.0f64;
  let mut confidence = 0.0f32;
  for &idx in cluster {
    let c = &candidates[idx];
    x0 = x0.min(c.x);
    y0 = y0.min(c.y);
    x1 = x1.max(c.right());
    y1 = y1.max(c.bottom());
    area += c.area;
    confidence = confidence.max(c.confidence);
  }

  let width = x1 - x0;
  let height = y1 - y0;
  let center = [
    x0 as f32 + width as f32 / 2.0,
    y0 as f32 + height as f32 / 2.0,
  ];
  let mut fused = Candidate::new(
    CandidateKind::Merged,
    candidates[cluster[0]].method,
    x0,
    y0,
    width,
    height,
    area,
    center,
    confidence,
  );
  fused.count = Some(cluster.len());
  fused
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::DetectMethod;

  fn candidate(x: u32, y: u32, size: u32, confidence: f32) -> Candidate {
    candidate_from(DetectMethod::Blob, x, y, size, confidence)
  }

  fn candidate_from(method: DetectMethod, x: u32, y: u32, size: u32, confidence: f32) -> Candidate {
    let kind = match method {
      DetectMethod::Motion => CandidateKind::Motion,
      DetectMethod::Circle => CandidateKind::Circle,
      _ => CandidateKind::Blob,
    };
    Candidate::new(
      kind,
      method,
      x,
      y,
      size,
      size,
      (size * size) as f64,
      [x as f32 + size as f32 / 2.0, y as f32 + size as f32 / 2.0],
      confidence,
    )
  }

  #[test]
  fn nearby_pair_becomes_one_merged_candidate() {
    // 两个 20x20 斑块圆心相距 10 像素，合并距离 50
    let a = candidate(100, 100, 20, 0.7);
    let b = candidate(110, 100, 20, 0.6);
    let params = DetectParams {
      merge_distance: 50.0,
      max_candidates: None,
      ..DetectParams::default()
    };

    let merged = merge_candidates(vec![a.clone(), b.clone()], &params);
    assert_eq!(merged.len(), 1);

    let m = &merged[0];
    assert_eq!(m.kind, CandidateKind::Merged);
    assert_eq!(m.count, Some(2));
    assert_eq!(m.confidence, 0.7);
    assert_eq!(m.area, a.area + b.area);
    // 并集边界框必须盖住两个输入
    assert!(m.x <= a.x && m.x <= b.x);
    assert!(m.right() >= a.right() && m.right() >= b.right());
    assert!(m.y <= a.y && m.bottom() >= a.bottom());
  }

  #[test]
  fn distant_candidates_stay_separate() {
    let a = candidate(10, 10, 20, 0.7);
    let b = candidate(300, 10, 20, 0.6);
    let params = DetectParams {
      merge_distance: 30.0,
      max_candidates: None,
      ..DetectParams::default()
    };

    let merged = merge_candidates(vec![a, b], &params);
    assert_eq!(merged.len(), 2);
    assert!(merged.iter().all(|c| c.kind == CandidateKind::Blob));
    // 输出按置信度降序
    assert!(merged[0].confidence >= merged[1].confidence);
  }

  #[test]
  fn default_floor_follows_producing_strategy() {
    // 同样 0.55 的置信度：斑块下限 0.5 保留，圆形下限 0.6 丢弃
    let weak_blob = candidate_from(DetectMethod::Blob, 10, 10, 20, 0.55);
    let weak_circle = candidate_from(DetectMethod::Circle, 300, 10, 20, 0.55);
    let params = DetectParams {
      merge_distance: 30.0,
      max_candidates: None,
      ..DetectParams::default()
    };

    let out = merge_candidates(vec![weak_blob, weak_circle], &params);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].method, DetectMethod::Blob);
  }

  #[test]
  fn explicit_floor_overrides_strategy_default() {
    let weak = candidate_from(DetectMethod::Circle, 10, 10, 20, 0.3);
    let params = DetectParams {
      min_confidence: Some(0.2),
      max_candidates: None,
      ..DetectParams::default()
    };
    let out = merge_candidates(vec![weak], &params);
    assert_eq!(out.len(), 1);
  }

  #[test]
  fn cross_strategy_hits_collapse_to_one() {
    // 三种策略命中同一个物体，圆形最可信，并簇沿用它的策略
    let motion = candidate_from(DetectMethod::Motion, 98, 102, 22, 0.62);
    let blob = candidate_from(DetectMethod::Blob, 101, 99, 18, 0.6);
    let circle = candidate_from(DetectMethod::Circle, 100, 100, 20, 0.8);
    let params = DetectParams {
      merge_distance: 30.0,
      max_candidates: None,
      ..DetectParams::default()
    };

    let out = merge_candidates(vec![motion, blob, circle], &params);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, CandidateKind::Merged);
    assert_eq!(out[0].method, DetectMethod::Circle);
    assert_eq!(out[0].count, Some(3));
    assert_eq!(out[0].confidence, 0.8);
  }

  #[test]
  fn cap_keeps_highest_confidence() {
    let a = candidate(10, 10, 20, 0.9);
    let b = candidate(300, 10, 20, 0.8);
    let c = candidate(10, 300, 20, 0.7);
    let params = DetectParams {
      merge_distance: 10.0,
      max_candidates: Some(1),
      ..DetectParams::default()
    };

    let out = merge_candidates(vec![c, b, a.clone()], &params);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].confidence, a.confidence);
  }

  #[test]
  fn unlimited_cap_keeps_all() {
    let candidates: Vec<Candidate> = (0..5)
      .map(|i| candidate(i * 100, 10, 20, 0.6 + i as f32 * 0.01))
      .collect();
    let params = DetectParams {
      merge_distance: 10.0,
      max_candidates: None,
      ..DetectParams::default()
    };
    let out = merge_candidates(candidates, &params);
    assert_eq!(out.len(), 5);
  }
}
