// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/detect/background.rs - 自适应背景模型
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
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, dilate, open};
use tracing::debug;

/// 背景就绪所需的观测帧数
pub const WARMUP_FRAMES: u64 = 30;

/// 就绪后的混合速率：吸收缓慢光照漂移，但一个检测周期内吸收不掉真实目标
const READY_BLEND_RATE: f32 = 0.001;

/// 前景判定的灰度差阈值
const DIFF_THRESHOLD: f32 = 25.0;

/// 清理核半径，LInf 距离 3 即 7×7 结构元
const CLEANUP_KERNEL: u8 = 3;

/// 背景模型状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundState {
  /// 尚未观测任何帧
  Uninitialized,
  /// 热身中，不产出前景掩码
  Learning,
  /// 可产出前景掩码
  Ready,
}

/// 逐像素指数滑动平均背景模型
///
/// 热身期按 1/n 快速收敛；就绪后以极小速率继续混合。
/// 摄像头释放后必须 `reset`：设备重启后的旧背景无效。
pub struct BackgroundModel {
  mean: Vec<f32>,
  width: u32,
  height: u32,
  frames_seen: u64,
}

impl Default for BackgroundModel {
  fn default() -> Self {
    Self::new()
  }
}

impl BackgroundModel {
  pub fn new() -> Self {
    Self {
      mean: Vec::new(),
      width: 0,
      height: 0,
      frames_seen: 0,
    }
  }

  pub fn state(&self) -> BackgroundState {
    if self.frames_seen == 0 {
      BackgroundState::Uninitialized
    } else if self.frames_seen < WARMUP_FRAMES {
      BackgroundState::Learning
    } else {
      BackgroundState::Ready
    }
  }

  pub fn is_ready(&self) -> bool {
    self.state() == BackgroundState::Ready
  }

  pub fn frames_seen(&self) -> u64 {
    self.frames_seen
  }

  /// 清空统计量，回到未初始化状态
  pub fn reset(&mut self) {
    if self.frames_seen > 0 {
      debug!("背景模型重置（已观测 {} 帧）", self.frames_seen);
    }
    self.mean.clear();
    self.width = 0;
    self.height = 0;
    self.frames_seen = 0;
  }

  /// 用一帧灰度图更新均值
  pub fn update(&mut self, gray: &GrayImage) {
    if self.mean.is_empty() || self.width != gray.width() || self.height != gray.height() {
      if !self.mean.is_empty() {
        debug!(
          "帧尺寸变化 {}x{} -> {}x{}，背景模型重新初始化",
          self.width,
          self.height,
          gray.width(),
          gray.height()
        );
      }
      self.width = gray.width();
      self.height = gray.height();
      self.mean = gray.as_raw().iter().map(|&p| p as f32).collect();
      self.frames_seen = 1;
      return;
    }

    self.frames_seen += 1;
    let rate = if self.frames_seen < WARMUP_FRAMES {
      1.0 / self.frames_seen as f32
    } else {
      READY_BLEND_RATE
    };
    for (mean, &pixel) in self.mean.iter_mut().zip(gray.as_raw().iter()) {
      *mean += rate * (pixel as f32 - *mean);
    }
  }

  /// 计算清理后的前景掩码；未就绪或尺寸不符时返回 `None`
  ///
  /// 调用方应先取掩码再 `update`，这样当前帧里的目标不会先被混入均值。
  pub fn foreground_mask(&self, gray: &GrayImage) -> Option<GrayImage> {
    if !self.is_ready() || self.width != gray.width() || self.height != gray.height() {
      return None;
    }
    let raw: Vec<u8> = gray
      .as_raw()
      .iter()
      .zip(self.mean.iter())
      .map(|(&pixel, &mean)| {
        if (pixel as f32 - mean).abs() > DIFF_THRESHOLD {
          255
        } else {
          0
        }
      })
      .collect();
    let mask = GrayImage::from_raw(self.width, self.height, raw)?;
    Some(cleanup_mask(&mask))
  }
}

/// 掩码清理：闭运算补洞、开运算去斑，再膨胀一次桥接同一目标的碎片
pub fn cleanup_mask(mask: &GrayImage) -> GrayImage {
  let closed = close(mask, Norm::LInf, CLEANUP_KERNEL);
  let opened = open(&closed, Norm::LInf, CLEANUP_KERNEL);
  dilate(&opened, Norm::LInf, 1)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  fn uniform(width: u32, height: u32, level: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([level]))
  }

  fn with_square(width: u32, height: u32, level: u8, square: u8) -> GrayImage {
    let mut image = uniform(width, height, level);
    for y in 20..60 {
      for x in 20..60 {
        image.put_pixel(x, y, Luma([square]));
      }
    }
    image
  }

  #[test]
  fn warmup_gate_is_exactly_thirty_frames() {
    let mut model = BackgroundModel::new();
    assert_eq!(model.state(), BackgroundState::Uninitialized);

    let frame = uniform(80, 80, 100);
    for i in 1..WARMUP_FRAMES {
      model.update(&frame);
      assert_eq!(model.frames_seen(), i);
      assert_eq!(model.state(), BackgroundState::Learning, "帧 {i}");
      assert!(model.foreground_mask(&frame).is_none());
    }

    model.update(&frame);
    assert_eq!(model.frames_seen(), WARMUP_FRAMES);
    assert_eq!(model.state(), BackgroundState::Ready);
    assert!(model.foreground_mask(&frame).is_some());
  }

  #[test]
  fn reset_returns_to_uninitialized() {
    let mut model = BackgroundModel::new();
    let frame = uniform(40, 40, 60);
    for _ in 0..WARMUP_FRAMES {
      model.update(&frame);
    }
    assert!(model.is_ready());
    model.reset();
    assert_eq!(model.state(), BackgroundState::Uninitialized);
    assert!(model.foreground_mask(&frame).is_none());
  }

  #[test]
  fn new_object_stays_in_foreground_mask() {
    let mut model = BackgroundModel::new();
    let belt = uniform(100, 100, 100);
    for _ in 0..WARMUP_FRAMES {
      model.update(&belt);
    }

    let object = with_square(100, 100, 100, 220);
    let mask = model.foreground_mask(&object).unwrap();
    assert!(mask.get_pixel(40, 40)[0] > 0, "目标区域应为前景");
    assert_eq!(mask.get_pixel(80, 80)[0], 0, "空传送带区域应为背景");

    // 就绪后速率极小：混入一帧后目标仍是前景
    model.update(&object);
    let mask = model.foreground_mask(&object).unwrap();
    assert!(mask.get_pixel(40, 40)[0] > 0);
  }

  #[test]
  fn uniform_frame_produces_empty_mask() {
    let mut model = BackgroundModel::new();
    let belt = uniform(60, 60, 90);
    for _ in 0..WARMUP_FRAMES {
      model.update(&belt);
    }
    let mask = model.foreground_mask(&belt).unwrap();
    assert!(mask.pixels().all(|p| p[0] == 0));
  }

  #[test]
  fn cleanup_removes_isolated_speckle() {
    let mut mask = GrayImage::new(50, 50);
    mask.put_pixel(25, 25, Luma([255u8]));
    let cleaned = cleanup_mask(&mask);
    assert!(cleaned.pixels().all(|p| p[0] == 0));
  }

  #[test]
  fn resolution_change_reinitializes() {
    let mut model = BackgroundModel::new();
    for _ in 0..WARMUP_FRAMES {
      model.update(&uniform(40, 40, 80));
    }
    assert!(model.is_ready());
    model.update(&uniform(64, 48, 80));
    assert_eq!(model.state(), BackgroundState::Learning);
    assert_eq!(model.frames_seen(), 1);
  }
}
