// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use image::{Rgb, RgbImage};

use crate::report::Candidate;

/// 检测框颜色（蓝）
const BOX_COLOR: [u8; 3] = [0, 0, 255];
/// 圆心十字颜色（红）
const CROSS_COLOR: [u8; 3] = [255, 0, 0];
/// 十字臂长的一半
const CROSS_HALF: i32 = 4;

/// 返回画好标注的整帧副本
pub fn annotated_copy(image: &RgbImage, objects: &[Candidate]) -> RgbImage {
  let mut image = image.clone();
  annotate_image(&mut image, objects);
  image
}

/// 在图像上画出所有目标的边框和圆心十字
pub fn annotate_image(image: &mut RgbImage, objects: &[Candidate]) {
  for object in objects {
    draw_box(image, object, BOX_COLOR);
    draw_cross(image, object.center, CROSS_COLOR);
  }
}

// 在图像上绘制一个加粗为 2 像素的矩形边框
fn draw_box(image: &mut RgbImage, object: &Candidate, color: [u8; 3]) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  if w == 0 || h == 0 {
    return;
  }

  let x_min = (object.x as i32).clamp(0, w - 1);
  let y_min = (object.y as i32).clamp(0, h - 1);
  // right/bottom 是不含端点的边界
  let x_max = (object.right() as i32 - 1).clamp(0, w - 1);
  let y_max = (object.bottom() as i32 - 1).clamp(0, h - 1);
  if x_min >= x_max || y_min >= y_max {
    return;
  }

  for thickness in 0..2 {
    let x_min_t = (x_min + thickness).min(w - 1);
    let y_min_t = (y_min + thickness).min(h - 1);
    let x_max_t = (x_max - thickness).max(0);
    let y_max_t = (y_max - thickness).max(0);

    // Top and bottom edges
    for x in x_min_t..=x_max_t {
      *image.get_pixel_mut(x as u32, y_min_t as u32) = Rgb(color);
      *image.get_pixel_mut(x as u32, y_max_t as u32) = Rgb(color);
    }

    // Left and right edges
    for y in y_min_t..=y_max_t {
      *image.get_pixel_mut(x_min_t as u32, y as u32) = Rgb(color);
      *image.get_pixel_mut(x_max_t as u32, y as u32) = Rgb(color);
    }
  }
}

// 在圆心画一个十字
fn draw_cross(image: &mut RgbImage, center: [f32; 2], color: [u8; 3]) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  let cx = center[0].round() as i32;
  let cy = center[1].round() as i32;

  let mut put = |x: i32, y: i32| {
    if x >= 0 && x < w && y >= 0 && y < h {
      *image.get_pixel_mut(x as u32, y as u32) = Rgb(color);
    }
  };
  for d in -CROSS_HALF..=CROSS_HALF {
    put(cx + d, cy);
    put(cx, cy + d);
  }
}
