// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/output/archive.rs - 检出目标的裁剪归档
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

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Utc};
use image::imageops;
use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::Frame;
use crate::output::{DiskStore, ImageStore, draw};
use crate::report::{ArchiveOutcome, Candidate};
use crate::{FromUrl, FromUrlWithScheme};

/// 裁剪框在目标边界框外扩的像素数
const CROP_MARGIN: u32 = 20;

#[derive(Error, Debug)]
pub enum ArchiveError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期目录归档检出目标的裁剪图
///
/// 目录布局 `<根>/<年>/<月>/<日>/`，文件名带时间、帧号和目标序号。
/// 归档永远不让检测失败：所有落盘错误都折叠进 [`ArchiveOutcome`]。
pub struct CropArchive {
  directory: PathBuf,
  frame_counters: Arc<Mutex<u16>>,
  annotated: bool,
  record: bool,
  store: Box<dyn ImageStore>,
}

impl FromUrlWithScheme for CropArchive {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for CropArchive {
  type Error = ArchiveError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ArchiveError::SchemeMismatch);
    }

    let annotated = uri.query_pairs().any(|(k, _)| k == "annotated");
    let record = uri.query_pairs().any(|(k, _)| k == "record");

    Ok(CropArchive {
      directory: PathBuf::from(uri.path()),
      frame_counters: Arc::new(Mutex::new(0)),
      annotated,
      record,
      store: Box::new(DiskStore),
    })
  }
}

impl CropArchive {
  pub fn new(directory: PathBuf, annotated: bool) -> Self {
    CropArchive {
      directory,
      frame_counters: Arc::new(Mutex::new(0)),
      annotated,
      record: false,
      store: Box::new(DiskStore),
    }
  }

  /// 每帧额外落一个 JSON 记录文件
  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  /// 换掉落盘实现，联调与测试用
  pub fn with_store(mut self, store: Box<dyn ImageStore>) -> Self {
    self.store = store;
    self
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self.frame_counters.lock().unwrap();
    let id = counter.wrapping_add(1);
    *counter = id;
    id
  }

  fn dated_directory(&self) -> Result<PathBuf, ArchiveError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }
    Ok(directory)
  }

  /// 归档一帧里所有检出目标的裁剪图
  ///
  /// 无目标时什么也不写。裁剪文件名带目标序号；开启标注时额外保存
  /// 一张画了检测框的整帧，开启记录时再落一个 JSON 侧文件。
  pub fn save_crops(&self, frame: &Frame, objects: &[Candidate]) -> ArchiveOutcome {
    if objects.is_empty() {
      return ArchiveOutcome {
        saved: 0,
        skipped: 0,
        reason: None,
      };
    }

    let directory = match self.dated_directory() {
      Ok(directory) => directory,
      Err(error) => {
        warn!("归档目录创建失败: {error}");
        return ArchiveOutcome {
          saved: 0,
          skipped: objects.len(),
          reason: Some("archive_write_failed".to_string()),
        };
      }
    };

    let now = Utc::now();
    let stamp = now.format("%H-%M-%S");
    let frame_id = self.frame_id();

    let mut saved = 0usize;
    let mut skipped = 0usize;
    let mut failed = false;
    for (index, object) in objects.iter().enumerate() {
      let number = object.counter_number.unwrap_or(index as u32 + 1);
      let Some(crop) = crop_region(frame, object) else {
        warn!("目标 {} 的裁剪区域为空，跳过", number);
        skipped += 1;
        continue;
      };

      let path = directory.join(format!("{stamp}-{frame_id:04X}-c{number:02}.png"));
      match self.store.persist_image(&crop, &path) {
        Ok(()) => {
          debug!("已归档 {}", path.display());
          saved += 1;
        }
        Err(error) => {
          warn!("归档 {} 失败: {error}", path.display());
          skipped += 1;
          failed = true;
        }
      }
    }

    if self.annotated {
      let annotated = draw::annotated_copy(&frame.image, objects);
      let path = directory.join(format!("{stamp}-{frame_id:04X}-full.png"));
      match self.store.persist_image(&annotated, &path) {
        Ok(()) => saved += 1,
        Err(error) => {
          warn!("归档整帧 {} 失败: {error}", path.display());
          failed = true;
        }
      }
    }

    if self.record {
      let path = directory.join(format!("{stamp}-{frame_id:04X}.json"));
      match write_record(&path, objects) {
        Ok(()) => saved += 1,
        Err(error) => {
          warn!("记录 {} 失败: {error}", path.display());
          failed = true;
        }
      }
    }

    ArchiveOutcome {
      saved,
      skipped,
      reason: failed.then(|| "archive_write_failed".to_string()),
    }
  }
}

/// 把一帧的候选列表写成 JSON 记录文件
fn write_record(path: &std::path::Path, objects: &[Candidate]) -> Result<(), ArchiveError> {
  let body = serde_json::to_string_pretty(objects).map_err(std::io::Error::other)?;
  std::fs::write(path, body)?;
  Ok(())
}

/// 以外扩过的边界框裁出目标区域，完全越界时返回 `None`
fn crop_region(frame: &Frame, object: &Candidate) -> Option<image::RgbImage> {
  let (width, height) = (frame.width(), frame.height());
  if object.x >= width || object.y >= height || width == 0 || height == 0 {
    return None;
  }

  let x0 = object.x.saturating_sub(CROP_MARGIN);
  let y0 = object.y.saturating_sub(CROP_MARGIN);
  let x1 = (object.right() + CROP_MARGIN).min(width);
  let y1 = (object.bottom() + CROP_MARGIN).min(height);
  if x1 <= x0 || y1 <= y0 {
    return None;
  }

  Some(imageops::crop_imm(&frame.image, x0, y0, x1 - x0, y1 - y0).to_image())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::DetectMethod;
  use crate::report::CandidateKind;
  use image::{Rgb, RgbImage};
  use std::path::Path;
  use url::Url;

  fn frame_with_object() -> (Frame, Candidate) {
    let image = RgbImage::from_pixel(200, 200, Rgb([30u8, 30, 30]));
    let frame = Frame::new(image, 1, 0);
    let candidate = Candidate::new(
      CandidateKind::Circle,
      DetectMethod::Circle,
      80,
      80,
      40,
      40,
      1600.0,
      [100.0, 100.0],
      0.8,
    );
    (frame, candidate)
  }

  fn files_with_suffix(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut matches = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.file_name().is_some_and(|n| n.to_string_lossy().ends_with(suffix)) {
          matches.push(path);
        }
      }
    }
    matches
  }

  fn count_pngs(root: &Path) -> usize {
    files_with_suffix(root, ".png").len()
  }

  #[test]
  fn crops_land_in_dated_directory() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CropArchive::new(dir.path().to_path_buf(), false);
    let (frame, candidate) = frame_with_object();

    let outcome = archive.save_crops(&frame, &[candidate.clone(), candidate]);
    assert_eq!(outcome.saved, 2);
    assert_eq!(outcome.skipped, 0);
    assert!(outcome.reason.is_none());

    let now = Utc::now();
    let dated = dir
      .path()
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    assert!(dated.is_dir());
    assert_eq!(count_pngs(dir.path()), 2);
  }

  #[test]
  fn annotated_mode_saves_extra_full_frame() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CropArchive::new(dir.path().to_path_buf(), true);
    let (frame, candidate) = frame_with_object();

    let outcome = archive.save_crops(&frame, &[candidate]);
    assert_eq!(outcome.saved, 2);
    assert_eq!(count_pngs(dir.path()), 2);
  }

  #[test]
  fn record_mode_writes_json_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CropArchive::new(dir.path().to_path_buf(), false).with_record(true);
    let (frame, mut candidate) = frame_with_object();
    candidate.counter_number = Some(1);

    let outcome = archive.save_crops(&frame, &[candidate]);
    // 一张裁剪加一个 JSON 记录
    assert_eq!(outcome.saved, 2);
    assert!(outcome.reason.is_none());

    let json_paths = files_with_suffix(dir.path(), ".json");
    assert_eq!(json_paths.len(), 1);

    let body = std::fs::read_to_string(&json_paths[0]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value[0]["type"], "circle");
    assert_eq!(value[0]["counterNumber"], 1);
    assert_eq!(value[0]["x"], 80);
  }

  #[test]
  fn crop_filename_carries_counter_number() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CropArchive::new(dir.path().to_path_buf(), false);
    let (frame, mut candidate) = frame_with_object();
    candidate.counter_number = Some(3);

    let outcome = archive.save_crops(&frame, &[candidate]);
    assert_eq!(outcome.saved, 1);
    assert_eq!(files_with_suffix(dir.path(), "-c03.png").len(), 1);
  }

  #[test]
  fn empty_detection_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CropArchive::new(dir.path().to_path_buf(), false);
    let (frame, _) = frame_with_object();

    let outcome = archive.save_crops(&frame, &[]);
    assert_eq!(outcome.saved, 0);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(count_pngs(dir.path()), 0);
  }

  #[test]
  fn store_failure_is_reported_not_raised() {
    struct FailingStore;
    impl ImageStore for FailingStore {
      fn persist_image(&self, _image: &RgbImage, _path: &Path) -> Result<(), ArchiveError> {
        Err(ArchiveError::IoError(std::io::Error::other("盘满")))
      }
    }

    let dir = tempfile::tempdir().unwrap();
    let archive =
      CropArchive::new(dir.path().to_path_buf(), false).with_store(Box::new(FailingStore));
    let (frame, candidate) = frame_with_object();

    let outcome = archive.save_crops(&frame, &[candidate]);
    assert_eq!(outcome.saved, 0);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.reason.as_deref(), Some("archive_write_failed"));
  }

  #[test]
  fn out_of_frame_object_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let archive = CropArchive::new(dir.path().to_path_buf(), false);
    let (frame, _) = frame_with_object();
    let outside = Candidate::new(
      CandidateKind::Blob,
      DetectMethod::Blob,
      500,
      500,
      10,
      10,
      100.0,
      [505.0, 505.0],
      0.7,
    );

    let outcome = archive.save_crops(&frame, &[outside]);
    assert_eq!(outcome.saved, 0);
    assert_eq!(outcome.skipped, 1);
  }

  #[test]
  fn crop_region_clamps_at_frame_edge() {
    let (frame, _) = frame_with_object();
    let corner = Candidate::new(
      CandidateKind::Blob,
      DetectMethod::Blob,
      0,
      0,
      10,
      10,
      100.0,
      [5.0, 5.0],
      0.7,
    );
    let crop = crop_region(&frame, &corner).unwrap();
    // 左上贴边，外扩只向右下生效
    assert_eq!(crop.dimensions(), (30, 30));
  }

  #[test]
  fn url_configures_scheme_and_annotation() {
    let url = Url::parse("folder:///tmp/panshan-archive?annotated").unwrap();
    let archive = CropArchive::from_url(&url).unwrap();
    assert!(archive.annotated);
    assert!(!archive.record);
    assert_eq!(archive.directory, PathBuf::from("/tmp/panshan-archive"));

    let url = Url::parse("folder:///tmp/panshan-archive?record").unwrap();
    let archive = CropArchive::from_url(&url).unwrap();
    assert!(!archive.annotated);
    assert!(archive.record);

    let wrong = Url::parse("rtsp://host/stream").unwrap();
    assert!(matches!(
      CropArchive::from_url(&wrong),
      Err(ArchiveError::SchemeMismatch)
    ));
  }
}
