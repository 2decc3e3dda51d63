// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/detect/contour.rs - 轮廓几何
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
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;

/// 提取掩码中所有外轮廓
pub fn outer_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
  find_contours::<i32>(mask)
    .into_iter()
    .filter(|c| c.border_type == BorderType::Outer)
    .map(|c| c.points)
    .collect()
}

/// 鞋带公式求多边形面积
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
  if points.len() < 3 {
    return 0.0;
  }
  let mut doubled = 0i64;
  for i in 0..points.len() {
    let a = points[i];
    let b = points[(i + 1) % points.len()];
    doubled += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
  }
  (doubled.abs() as f64) / 2.0
}

/// 闭合多边形周长
pub fn polygon_perimeter(points: &[Point<i32>]) -> f64 {
  if points.len() < 2 {
    return 0.0;
  }
  let mut perimeter = 0.0;
  for i in 0..points.len() {
    let a = points[i];
    let b = points[(i + 1) % points.len()];
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    perimeter += (dx * dx + dy * dy).sqrt();
  }
  perimeter
}

/// 实度：轮廓面积 / 凸包面积
pub fn solidity(points: &[Point<i32>]) -> f64 {
  let area = polygon_area(points);
  if area <= 0.0 {
    return 0.0;
  }
  let hull = convex_hull(points.to_vec());
  let hull_area = polygon_area(&hull);
  if hull_area <= 0.0 {
    return 0.0;
  }
  (area / hull_area).min(1.0)
}

/// 圆度 4πA/P²，完美圆为 1.0
pub fn circularity(area: f64, perimeter: f64) -> f64 {
  if perimeter <= 0.0 {
    return 0.0;
  }
  4.0 * std::f64::consts::PI * area / (perimeter * perimeter)
}

/// 轮廓点集的像素边界框 (x, y, width, height)
pub fn bounding_box(points: &[Point<i32>]) -> (u32, u32, u32, u32) {
  if points.is_empty() {
    return (0, 0, 0, 0);
  }
  let mut min_x = points[0].x;
  let mut min_y = points[0].y;
  let mut max_x = points[0].x;
  let mut max_y = points[0].y;
  for p in points.iter().skip(1) {
    min_x = min_x.min(p.x);
    min_y = min_y.min(p.y);
    max_x = max_x.max(p.x);
    max_y = max_y.max(p.y);
  }
  let min_x = min_x.max(0);
  let min_y = min_y.max(0);
  (
    min_x as u32,
    min_y as u32,
    (max_x - min_x + 1).max(1) as u32,
    (max_y - min_y + 1).max(1) as u32,
  )
}

/// 近似最小包围圆：凸包质心加最远包点距离
pub fn enclosing_circle(points: &[Point<i32>]) -> ([f32; 2], f32) {
  if points.is_empty() {
    return ([0.0, 0.0], 0.0);
  }
  let hull = convex_hull(points.to_vec());
  let hull = if hull.is_empty() { points } else { &hull[..] };

  let mut cx = 0.0f64;
  let mut cy = 0.0f64;
  for p in hull {
    cx += p.x as f64;
    cy += p.y as f64;
  }
  cx /= hull.len() as f64;
  cy /= hull.len() as f64;

  let mut radius = 0.0f64;
  for p in hull {
    let dx = p.x as f64 - cx;
    let dy = p.y as f64 - cy;
    radius = radius.max((dx * dx + dy * dy).sqrt());
  }
  ([cx as f32, cy as f32], radius as f32)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;
  use imageproc::drawing::draw_filled_circle_mut;

  fn square_mask(size: u32, side: u32) -> GrayImage {
    let mut mask = GrayImage::new(size, size);
    let origin = (size - side) / 2;
    for y in origin..origin + side {
      for x in origin..origin + side {
        mask.put_pixel(x, y, Luma([255u8]));
      }
    }
    mask
  }

  #[test]
  fn square_contour_geometry() {
    let mask = square_mask(100, 40);
    let contours = outer_contours(&mask);
    assert_eq!(contours.len(), 1);
    let points = &contours[0];

    let area = polygon_area(points);
    let perimeter = polygon_perimeter(points);
    assert!((area - 39.0 * 39.0).abs() < 40.0);
    assert!((perimeter - 4.0 * 39.0).abs() < 8.0);

    let (x, y, w, h) = bounding_box(points);
    assert_eq!((x, y, w, h), (30, 30, 40, 40));

    // 正方形的圆度约为 π/4
    let c = circularity(area, perimeter);
    assert!((c - std::f64::consts::FRAC_PI_4).abs() < 0.05);
    assert!(solidity(points) > 0.95);
  }

  #[test]
  fn disk_contour_is_nearly_circular() {
    let mut mask = GrayImage::new(120, 120);
    draw_filled_circle_mut(&mut mask, (60, 60), 30, Luma([255u8]));
    let contours = outer_contours(&mask);
    assert_eq!(contours.len(), 1);
    let points = &contours[0];

    let c = circularity(polygon_area(points), polygon_perimeter(points));
    assert!(c > 0.8, "圆度 {c} 过低");
    assert!(solidity(points) > 0.9);

    let (center, radius) = enclosing_circle(points);
    assert!((center[0] - 60.0).abs() < 2.0);
    assert!((center[1] - 60.0).abs() < 2.0);
    assert!((radius - 30.0).abs() < 3.0);
  }

  #[test]
  fn degenerate_inputs_yield_zero() {
    assert_eq!(polygon_area(&[]), 0.0);
    assert_eq!(polygon_perimeter(&[Point::new(3, 3)]), 0.0);
    assert_eq!(circularity(10.0, 0.0), 0.0);
    assert_eq!(bounding_box(&[]), (0, 0, 0, 0));
  }
}
