// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/detect/motion.rs - 运动轮廓检测
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
use tracing::debug;

use crate::detect::DetectMethod;
use crate::detect::config::DetectParams;
use crate::detect::contour;
use crate::report::{Candidate, CandidateKind};

/// 从前景掩码提取运动轮廓候选
///
/// 只接受面积与宽高比都在配置区间内的外轮廓；
/// 置信度 = 0.6·归一化面积 + 0.4·实度。
pub fn detect(mask: &GrayImage, params: &DetectParams) -> Vec<Candidate> {
  let contours = contour::outer_contours(mask);
  let mut candidates = Vec::new();

  for points in &contours {
    let area = contour::polygon_area(points);
    if area < params.min_area || area > params.max_area {
      continue;
    }

    let (x, y, width, height) = contour::bounding_box(points);
    let aspect = width as f32 / height as f32;
    if aspect < params.min_aspect || aspect > params.max_aspect {
      continue;
    }

    let solidity = contour::solidity(points) as f32;
    let normalized_area = (area / params.max_area).min(1.0) as f32;
    let confidence = (0.6 * normalized_area + 0.4 * solidity).clamp(0.0, 1.0);
    let center = [
      x as f32 + width as f32 / 2.0,
      y as f32 + height as f32 / 2.0,
    ];

    let mut candidate = Candidate::new(
      CandidateKind::Motion,
      DetectMethod::Motion,
      x,
      y,
      width,
      height,
      area,
      center,
      confidence,
    );
    candidate.aspect_ratio = Some(aspect);
    candidate.solidity = Some(solidity);
    candidates.push(candidate);
  }

  debug!(
    "运动轮廓: {} 个轮廓, {} 个候选",
    contours.len(),
    candidates.len()
  );
  candidates
}
