// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/detect/blob.rs - 自适应阈值斑点检测
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

use image::GrayImage;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use tracing::debug;

use crate::detect::DetectMethod;
use crate::detect::background::cleanup_mask;
use crate::detect::config::DetectParams;
use crate::detect::contour;
use crate::report::{Candidate, CandidateKind};

/// 局部均值窗口半径（11×11 窗口）
const BLOCK_RADIUS: u32 = 5;

/// 阈值偏移：比局部均值暗超过该值才算目标
const MEAN_OFFSET: f64 = 2.0;

/// 固定置信度：该策略不含实度项
const BLOB_CONFIDENCE: f32 = 0.6;

/// 无状态斑点检测：局部均值阈值加同一套形态学清理
///
/// 不依赖背景模型，对光照变化不敏感，作为运动轮廓的兜底策略。
pub fn detect(gray: &GrayImage, params: &DetectParams) -> Vec<Candidate> {
  let mask = cleanup_mask(&local_mean_threshold(gray));
  let mut candidates = Vec::new();

  for points in contour::outer_contours(&mask) {
    let area = contour::polygon_area(&points);
    if area < params.min_area || area > params.max_area {
      continue;
    }

    let (x, y, width, height) = contour::bounding_box(&points);
    let aspect = width as f32 / height as f32;
    if aspect < params.min_aspect || aspect > params.max_aspect {
      continue;
    }

    let center = [
      x as f32 + width as f32 / 2.0,
      y as f32 + height as f32 / 2.0,
    ];
    let mut candidate = Candidate::new(
      CandidateKind::Blob,
      DetectMethod::Blob,
      x,
      y,
      width,
      height,
      area,
      center,
      BLOB_CONFIDENCE,
    );
    candidate.aspect_ratio = Some(aspect);
    candidates.push(candidate);
  }

  debug!("斑点检测: {} 个候选", candidates.len());
  candidates
}

/// 积分图局部均值阈值，暗于邻域均值的像素输出为白
fn local_mean_threshold(gray: &GrayImage) -> GrayImage {
  let (width, height) = gray.dimensions();
  if width == 0 || height == 0 {
    return gray.clone();
  }
  let integral = integral_image::<_, u64>(gray);

  GrayImage::from_fn(width, height, |x, y| {
    let left = x.saturating_sub(BLOCK_RADIUS);
    let top = y.saturating_sub(BLOCK_RADIUS);
    let right = (x + BLOCK_RADIUS).min(width - 1);
    let bottom = (y + BLOCK_RADIUS).min(height - 1);

    let sum = sum_image_pixels(&integral, left, top, right, bottom)[0];
    let count = ((right - left + 1) * (bottom - top + 1)) as f64;
    let mean = sum as f64 / count;

    if (gray.get_pixel(x, y)[0] as f64) <= mean - MEAN_OFFSET {
      image::Luma([255u8])
    } else {
      image::Luma([0u8])
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;
  use imageproc::drawing::draw_filled_circle_mut;

  #[test]
  fn dark_disk_on_light_belt_is_detected() {
    let mut gray = GrayImage::from_pixel(320, 240, Luma([200u8]));
    draw_filled_circle_mut(&mut gray, (160, 120), 40, Luma([40u8]));

    let candidates = detect(&gray, &DetectParams::default());
    assert_eq!(candidates.len(), 1);

    let c = &candidates[0];
    assert_eq!(c.kind, CandidateKind::Blob);
    assert_eq!(c.confidence, BLOB_CONFIDENCE);
    assert!((c.center[0] - 160.0).abs() < 6.0);
    assert!((c.center[1] - 120.0).abs() < 6.0);
    let aspect = c.aspect_ratio.unwrap();
    assert!(aspect > 0.8 && aspect < 1.25);
  }

  #[test]
  fn uniform_frame_yields_nothing() {
    let gray = GrayImage::from_pixel(320, 240, Luma([128u8]));
    assert!(detect(&gray, &DetectParams::default()).is_empty());
  }

  #[test]
  fn threshold_marks_only_darker_pixels() {
    let mut gray = GrayImage::from_pixel(64, 64, Luma([180u8]));
    for y in 24..40 {
      for x in 24..40 {
        gray.put_pixel(x, y, Luma([60u8]));
      }
    }
    let mask = local_mean_threshold(&gray);
    assert!(mask.get_pixel(31, 31)[0] > 0 || mask.get_pixel(25, 25)[0] > 0);
    assert_eq!(mask.get_pixel(5, 5)[0], 0);
  }
}
