// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/camera.rs - 相机源模块
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

pub mod replay;
pub mod v4l2;

use anyhow::Result;

pub use replay::ReplayCamera;
pub use v4l2::V4l2Camera;

use crate::frame::Frame;

/// 相机源类型
pub enum CameraSourceType {
  /// V4L2 工业相机
  V4l2,
  /// 离线回放
  Replay,
}

/// 相机源 trait
///
/// 检测会话把相机放在互斥锁里跨线程共享，实现必须是 `Send`。
pub trait CameraSource: Iterator<Item = Result<Frame>> + Send {
  /// 获取相机源类型
  fn source_type(&self) -> CameraSourceType;

  /// 获取帧宽度
  fn width(&self) -> u32;

  /// 获取帧高度
  fn height(&self) -> u32;

  /// 获取帧率（如果适用）
  fn fps(&self) -> Option<f64>;
}

/// 解析 V4L2 设备路径，非 V4L2 源返回 `None`
///
/// 纯数字按设备序号处理，`0` 等价于 `/dev/video0`。
fn v4l2_device_path(source: &str) -> Option<String> {
  if source.starts_with("/dev/video") {
    return Some(source.to_string());
  }
  if is_device_index(source) {
    return Some(format!("/dev/video{source}"));
  }
  if let Some(rest) = source.strip_prefix("v4l2://") {
    let decoded = urlencoding::decode(rest).ok()?;
    if is_device_index(&decoded) {
      return Some(format!("/dev/video{decoded}"));
    }
    return Some(decoded.into_owned());
  }
  None
}

fn is_device_index(source: &str) -> bool {
  !source.is_empty() && source.bytes().all(|b| b.is_ascii_digit())
}

/// 从地址创建相机源
///
/// `v4l2://` 前缀或 `/dev/video*` 路径走 V4L2 相机，
/// 其余地址按离线回放图片处理。
pub fn create_camera(source: &str, width: u32, height: u32) -> Result<Box<dyn CameraSource>> {
  if let Some(device_path) = v4l2_device_path(source) {
    return Ok(Box::new(V4l2Camera::new(&device_path, width, height)?));
  }

  let path = source.strip_prefix("replay://").unwrap_or(source);
  Ok(Box::new(ReplayCamera::from_file(path)?))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn v4l2_sources_are_recognized() {
    assert_eq!(v4l2_device_path("/dev/video2").as_deref(), Some("/dev/video2"));
    assert_eq!(
      v4l2_device_path("v4l2:///dev/video0").as_deref(),
      Some("/dev/video0")
    );
    // 百分号编码的路径被还原
    assert_eq!(
      v4l2_device_path("v4l2:///dev/video%200").as_deref(),
      Some("/dev/video 0")
    );
    assert!(v4l2_device_path("frames/belt.png").is_none());
  }

  #[test]
  fn numeric_sources_are_device_indices() {
    assert_eq!(v4l2_device_path("0").as_deref(), Some("/dev/video0"));
    assert_eq!(v4l2_device_path("v4l2://1").as_deref(), Some("/dev/video1"));
    assert!(v4l2_device_path("0.png").is_none());
  }

  #[test]
  fn plain_paths_become_replay_cameras() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("belt.png");
    RgbImage::from_pixel(64, 48, Rgb([90u8, 90, 90]))
      .save(&path)
      .unwrap();

    let camera = create_camera(path.to_str().unwrap(), 640, 480).unwrap();
    // 回放相机保留文件本身的分辨率
    assert_eq!(camera.width(), 64);
    assert_eq!(camera.height(), 48);
    assert!(matches!(camera.source_type(), CameraSourceType::Replay));
  }
}
