// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/camera/replay.rs - 离线回放相机源
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

use std::time::Instant;

use anyhow::{Context, Result, bail};
use image::{ImageReader, RgbImage};

use super::{CameraSource, CameraSourceType};
use crate::frame::Frame;

/// 离线回放相机源
///
/// 把一组静态图片当作无限的帧流循环播放，
/// 没有相机硬件时用来联调检测流水线和做长稳测试。
pub struct ReplayCamera {
  /// 循环播放的帧
  frames: Vec<RgbImage>,
  /// 下一帧在 frames 里的位置
  cursor: usize,
  /// 帧索引
  frame_index: u64,
  /// 帧宽度
  width: u32,
  /// 帧高度
  height: u32,
  /// 开始时间
  start_time: Instant,
}

impl ReplayCamera {
  /// 从单张图片文件创建回放源
  pub fn from_file(path: &str) -> Result<Self> {
    let image = ImageReader::open(path)
      .with_context(|| format!("无法打开图片文件: {}", path))?
      .decode()
      .with_context(|| format!("无法解码图片文件: {}", path))?
      .to_rgb8();
    Self::from_images(vec![image])
  }

  /// 从内存中的一组帧创建回放源
  pub fn from_images(frames: Vec<RgbImage>) -> Result<Self> {
    let Some(first) = frames.first() else {
      bail!("回放源至少需要一帧");
    };
    let (width, height) = first.dimensions();
    if frames.iter().any(|f| f.dimensions() != (width, height)) {
      bail!("回放帧尺寸不一致");
    }

    Ok(Self {
      frames,
      cursor: 0,
      frame_index: 0,
      width,
      height,
      start_time: Instant::now(),
    })
  }
}

impl Iterator for ReplayCamera {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.frames[self.cursor].clone();
    self.cursor = (self.cursor + 1) % self.frames.len();

    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    let frame = Frame::new(image, self.frame_index, timestamp_ms);
    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl CameraSource for ReplayCamera {
  fn source_type(&self) -> CameraSourceType {
    CameraSourceType::Replay
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    None
  }
}
