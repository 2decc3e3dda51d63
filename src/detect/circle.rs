// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/detect/circle.rs - 圆形检测
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

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_scharr, vertical_scharr};
use tracing::debug;

use crate::detect::DetectMethod;
use crate::detect::background::cleanup_mask;
use crate::detect::config::DetectParams;
use crate::detect::contour;
use crate::report::{Candidate, CandidateKind};

/// 输入灰度图的预模糊 σ
const BLUR_SIGMA: f32 = 1.4;

/// 参与投票的梯度幅值下限（相对全图最大幅值）
const MAG_FRACTION: f32 = 0.2;

/// 累加器平滑 σ
const ACCUMULATOR_SIGMA: f32 = 2.0;

/// 峰值下限（相对累加器最大值）
const PEAK_FRACTION: f32 = 0.5;

/// 单帧最多评估的圆心峰值数
const MAX_PEAKS: usize = 8;

/// 第一阶段的固定圆度门槛
const STAGE1_MIN_CIRCULARITY: f64 = 0.65;

/// 第二阶段边界框宽高比区间
const COLOR_ASPECT: (f32, f32) = (0.7, 1.3);

/// 低于该饱和度的像素视为无彩传送带，不参与颜色掩码
const MIN_SATURATION: f32 = 0.1;

/// 圆形检测：梯度投票圆变换，无命中且启用时回退到颜色掩码
///
/// 半径区间由配置面积区间按 √(area/π) 推出。
/// 两个阶段都只在单帧上工作，不依赖背景模型。
pub fn detect(image: &RgbImage, gray: &GrayImage, params: &DetectParams) -> Vec<Candidate> {
  let candidates = hough_stage(gray, params);
  if !candidates.is_empty() {
    return candidates;
  }
  if params.color_fallback {
    debug!("圆变换无命中，回退到颜色掩码");
    return color_stage(image, params);
  }
  candidates
}

/// 由面积区间推出投票半径区间
fn radius_bounds(params: &DetectParams, width: u32, height: u32) -> (f32, f32) {
  let r_min = ((params.min_area / std::f64::consts::PI).sqrt() as f32).max(4.0);
  let r_cap = (width.min(height) as f32) / 2.0;
  let r_max = ((params.max_area / std::f64::consts::PI).sqrt() as f32).min(r_cap);
  (r_min, r_max.max(r_min + 1.0))
}

/// 第一阶段：梯度投票圆变换
fn hough_stage(gray: &GrayImage, params: &DetectParams) -> Vec<Candidate> {
  let (width, height) = gray.dimensions();
  if width < 16 || height < 16 {
    return Vec::new();
  }

  let blurred = gaussian_blur_f32(gray, BLUR_SIGMA);
  let gx = horizontal_scharr(&blurred);
  let gy = vertical_scharr(&blurred);

  let pixel_count = (width * height) as usize;
  let mut magnitudes = vec![0f32; pixel_count];
  let mut max_magnitude = 0f32;
  for (i, (dx, dy)) in gx.as_raw().iter().zip(gy.as_raw().iter()).enumerate() {
    let mag = ((*dx as f32) * (*dx as f32) + (*dy as f32) * (*dy as f32)).sqrt();
    magnitudes[i] = mag;
    max_magnitude = max_magnitude.max(mag);
  }
  if max_magnitude <= f32::EPSILON {
    // 均匀帧没有边缘
    return Vec::new();
  }
  let mag_threshold = max_magnitude * MAG_FRACTION;

  let (r_min, r_max) = radius_bounds(params, width, height);

  // 每个强边缘像素沿梯度两个方向、在整个半径区间内投票
  let mut accumulator = vec![0f32; pixel_count];
  for y in 0..height {
    for x in 0..width {
      let idx = (y * width + x) as usize;
      let mag = magnitudes[idx];
      if mag < mag_threshold {
        continue;
      }
      let ux = gx.as_raw()[idx] as f32 / mag;
      let uy = gy.as_raw()[idx] as f32 / mag;

      let mut r = r_min;
      while r <= r_max {
        deposit(&mut accumulator, width, height, x as f32 + r * ux, y as f32 + r * uy);
        deposit(&mut accumulator, width, height, x as f32 - r * ux, y as f32 - r * uy);
        r += 1.0;
      }
    }
  }

  let Some(accumulator) =
    ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(width, height, accumulator)
  else {
    return Vec::new();
  };
  let smoothed = gaussian_blur_f32(&accumulator, ACCUMULATOR_SIGMA);

  let peaks = find_peaks(&smoothed, r_min);
  let mut candidates = Vec::new();
  for (px, py) in peaks {
    let Some(radius) = estimate_radius(&magnitudes, width, height, mag_threshold, px, py, r_min, r_max)
    else {
      continue;
    };

    let area = std::f64::consts::PI * (radius as f64) * (radius as f64);
    if area < params.min_area || area > params.max_area {
      continue;
    }

    let circ = rim_circularity(gray, px as f32, py as f32, radius);
    if circ < STAGE1_MIN_CIRCULARITY {
      debug!("峰值 ({px}, {py}) 圆度 {circ:.2} 不足，丢弃");
      continue;
    }

    let normalized_area = (area / params.max_area).min(1.0) as f32;
    let confidence = (0.6 + 0.4 * normalized_area).clamp(0.0, 1.0);

    let x0 = ((px as f32 - radius).floor().max(0.0)) as u32;
    let y0 = ((py as f32 - radius).floor().max(0.0)) as u32;
    let x1 = ((px as f32 + radius).ceil() as u32).min(width - 1);
    let y1 = ((py as f32 + radius).ceil() as u32).min(height - 1);

    let mut candidate = Candidate::new(
      CandidateKind::Circle,
      DetectMethod::Circle,
      x0,
      y0,
      x1 - x0 + 1,
      y1 - y0 + 1,
      area,
      [px as f32, py as f32],
      confidence,
    );
    candidate.radius = Some(radius);
    candidate.circularity = Some(circ as f32);
    candidates.push(candidate);
  }

  debug!("圆变换: {} 个候选", candidates.len());
  candidates
}

/// 双线性写入累加器，越界部分丢弃
fn deposit(accumulator: &mut [f32], width: u32, height: u32, x: f32, y: f32) {
  if x < 0.0 || y < 0.0 {
    return;
  }
  let x0 = x.floor() as u32;
  let y0 = y.floor() as u32;
  let fx = x - x0 as f32;
  let fy = y - y0 as f32;

  let mut add = |cx: u32, cy: u32, weight: f32| {
    if cx < width && cy < height && weight > 0.0 {
      accumulator[(cy * width + cx) as usize] += weight;
    }
  };
  add(x0, y0, (1.0 - fx) * (1.0 - fy));
  add(x0 + 1, y0, fx * (1.0 - fy));
  add(x0, y0 + 1, (1.0 - fx) * fy);
  add(x0 + 1, y0 + 1, fx * fy);
}

/// 提取累加器峰值：局部极大且超过相对门槛，按票数降序做近邻抑制
fn find_peaks(accumulator: &ImageBuffer<Luma<f32>, Vec<f32>>, min_distance: f32) -> Vec<(u32, u32)> {
  let (width, height) = accumulator.dimensions();
  let mut max_votes = 0f32;
  for p in accumulator.pixels() {
    max_votes = max_votes.max(p[0]);
  }
  if max_votes <= f32::EPSILON {
    return Vec::new();
  }
  let vote_threshold = max_votes * PEAK_FRACTION;

  let mut raw: Vec<(u32, u32, f32)> = Vec::new();
  for y in 1..height.saturating_sub(1) {
    for x in 1..width.saturating_sub(1) {
      let votes = accumulator.get_pixel(x, y)[0];
      if votes < vote_threshold {
        continue;
      }
      let mut is_peak = true;
      for dy in -1i32..=1 {
        for dx in -1i32..=1 {
          if dx == 0 && dy == 0 {
            continue;
          }
          let neighbor = accumulator.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0];
          if neighbor > votes {
            is_peak = false;
          }
        }
      }
      if is_peak {
        raw.push((x, y, votes));
      }
    }
  }

  // 票数降序，并以坐标决定并列次序保证确定性
  raw.sort_by(|a, b| {
    b.2
      .partial_cmp(&a.2)
      .unwrap()
      .then(a.1.cmp(&b.1))
      .then(a.0.cmp(&b.0))
  });

  let min_sq = min_distance * min_distance;
  let mut peaks: Vec<(u32, u32)> = Vec::new();
  for (x, y, _votes) in raw {
    let far_enough = peaks.iter().all(|&(kx, ky)| {
      let dx = kx as f32 - x as f32;
      let dy = ky as f32 - y as f32;
      dx * dx + dy * dy >= min_sq
    });
    if far_enough {
      peaks.push((x, y));
      if peaks.len() >= MAX_PEAKS {
        break;
      }
    }
  }
  peaks
}

/// 以圆心为基准的径向边缘直方图估计半径
fn estimate_radius(
  magnitudes: &[f32],
  width: u32,
  height: u32,
  mag_threshold: f32,
  cx: u32,
  cy: u32,
  r_min: f32,
  r_max: f32,
) -> Option<f32> {
  let reach = r_max.ceil() as i32 + 2;
  let mut bins = vec![0u32; reach as usize + 1];
  let mut distances: Vec<f32> = Vec::new();

  let x_lo = (cx as i32 - reach).max(0);
  let x_hi = (cx as i32 + reach).min(width as i32 - 1);
  let y_lo = (cy as i32 - reach).max(0);
  let y_hi = (cy as i32 + reach).min(height as i32 - 1);

  for y in y_lo..=y_hi {
    for x in x_lo..=x_hi {
      let mag = magnitudes[(y as u32 * width + x as u32) as usize];
      if mag < mag_threshold {
        continue;
      }
      let dx = x as f32 - cx as f32;
      let dy = y as f32 - cy as f32;
      let dist = (dx * dx + dy * dy).sqrt();
      if dist < r_min - 1.5 || dist > r_max + 1.5 {
        continue;
      }
      let bin = dist.round() as usize;
      if bin < bins.len() {
        bins[bin] += 1;
        distances.push(dist);
      }
    }
  }

  let (best_bin, best_count) = bins
    .iter()
    .enumerate()
    .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;
  if *best_count == 0 {
    return None;
  }

  // 在峰值附近取均值细化
  let center = best_bin as f32;
  let mut sum = 0.0f32;
  let mut count = 0u32;
  for d in &distances {
    if (d - center).abs() <= 1.5 {
      sum += d;
      count += 1;
    }
  }
  if count == 0 {
    return Some(center);
  }
  Some(sum / count as f32)
}

/// 在期望圆掩码内做轮廓拟合并返回圆度
///
/// 以峰值为中心取 ROI，大津阈值二值化并保证目标相一侧为白，
/// 清掉期望圆以外的像素后取最大外轮廓的 4πA/P²。
fn rim_circularity(gray: &GrayImage, cx: f32, cy: f32, radius: f32) -> f64 {
  let (width, height) = gray.dimensions();
  let margin = (radius * 0.3).max(4.0);
  let reach = radius + margin;

  let x_lo = ((cx - reach).floor().max(0.0)) as u32;
  let y_lo = ((cy - reach).floor().max(0.0)) as u32;
  let x_hi = (((cx + reach).ceil()) as u32).min(width - 1);
  let y_hi = (((cy + reach).ceil()) as u32).min(height - 1);
  if x_hi <= x_lo + 2 || y_hi <= y_lo + 2 {
    return 0.0;
  }

  let roi = GrayImage::from_fn(x_hi - x_lo + 1, y_hi - y_lo + 1, |x, y| {
    *gray.get_pixel(x + x_lo, y + y_lo)
  });

  let level = otsu_level(&roi);
  let mut binary = threshold(&roi, level, ThresholdType::Binary);

  // 目标必须覆盖圆心：以圆心像素的相位决定是否取反
  let center_x = (cx as u32).saturating_sub(x_lo).min(binary.width() - 1);
  let center_y = (cy as u32).saturating_sub(y_lo).min(binary.height() - 1);
  if binary.get_pixel(center_x, center_y)[0] == 0 {
    for p in binary.pixels_mut() {
      p[0] = 255 - p[0];
    }
  }

  // 期望圆之外不参与拟合
  for y in 0..binary.height() {
    for x in 0..binary.width() {
      let dx = (x + x_lo) as f32 - cx;
      let dy = (y + y_lo) as f32 - cy;
      if dx * dx + dy * dy > reach * reach {
        binary.put_pixel(x, y, Luma([0u8]));
      }
    }
  }

  let mut best = 0.0f64;
  let mut best_area = 0.0f64;
  for points in contour::outer_contours(&binary) {
    let area = contour::polygon_area(&points);
    if area > best_area {
      best_area = area;
      best = contour::circularity(area, contour::polygon_perimeter(&points));
    }
  }
  best
}

/// 第二阶段：HSV 颜色掩码回退
fn color_stage(image: &RgbImage, params: &DetectParams) -> Vec<Candidate> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Vec::new();
  }
  let [hue_lo, hue_hi] = params.background_hue;

  let raw: Vec<u8> = image
    .pixels()
    .map(|pixel| {
      let (h, s, _v) = rgb_to_hsv(pixel);
      let is_belt = s < MIN_SATURATION || (h >= hue_lo && h <= hue_hi);
      if is_belt { 0 } else { 255 }
    })
    .collect();
  let Some(mask) = GrayImage::from_raw(width, height, raw) else {
    return Vec::new();
  };
  let mask = cleanup_mask(&mask);

  let mut candidates = Vec::new();
  for points in contour::outer_contours(&mask) {
    let area = contour::polygon_area(&points);
    if area < params.min_area || area > params.max_area {
      continue;
    }

    let perimeter = contour::polygon_perimeter(&points);
    let circ = contour::circularity(area, perimeter) as f32;
    if circ < params.min_circularity {
      continue;
    }

    let (x, y, w, h) = contour::bounding_box(&points);
    let aspect = w as f32 / h as f32;
    if aspect < COLOR_ASPECT.0 || aspect > COLOR_ASPECT.1 {
      continue;
    }

    let (center, radius) = contour::enclosing_circle(&points);
    let normalized_area = (area / params.max_area).min(1.0) as f32;
    let confidence = (0.7 * circ + 0.3 * normalized_area).clamp(0.0, 1.0);

    let mut candidate = Candidate::new(
      CandidateKind::Color,
      DetectMethod::Circle,
      x,
      y,
      w,
      h,
      area,
      center,
      confidence,
    );
    candidate.radius = Some(radius);
    candidate.circularity = Some(circ);
    candidate.aspect_ratio = Some(aspect);
    candidates.push(candidate);
  }

  debug!("颜色掩码: {} 个候选", candidates.len());
  candidates
}

/// RGB 转 HSV：h 取 0-360 度，s/v 取 0-1
fn rgb_to_hsv(pixel: &Rgb<u8>) -> (f32, f32, f32) {
  let r = pixel[0] as f32 / 255.0;
  let g = pixel[1] as f32 / 255.0;
  let b = pixel[2] as f32 / 255.0;

  let max = r.max(g).max(b);
  let min = r.min(g).min(b);
  let delta = max - min;

  let h = if delta == 0.0 {
    0.0
  } else if max == r {
    60.0 * (((g - b) / delta).rem_euclid(6.0))
  } else if max == g {
    60.0 * ((b - r) / delta + 2.0)
  } else {
    60.0 * ((r - g) / delta + 4.0)
  };
  let s = if max == 0.0 { 0.0 } else { delta / max };
  (h, s, max)
}
