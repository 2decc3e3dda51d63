// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/detect.rs - 检测策略入口
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

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, RgbImage};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::report::Candidate;

pub mod background;
pub mod blob;
pub mod circle;
pub mod config;
pub mod contour;
pub mod merge;
pub mod motion;

pub use background::{BackgroundModel, BackgroundState, WARMUP_FRAMES};
pub use config::DetectParams;
pub use merge::merge_candidates;

/// 检测相关错误
#[derive(Debug, Error)]
pub enum DetectError {
  /// 策略名无法识别
  #[error("未知的检测策略: {0}")]
  UnknownMethod(String),
}

/// 检测策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectMethod {
  /// 背景差分运动检测
  Motion,
  /// 局部自适应阈值斑块检测
  Blob,
  /// 圆变换加颜色回退
  Circle,
  /// 三种策略在同一帧上汇总后去重
  Combined,
}

impl DetectMethod {
  /// 策略默认的置信度下限
  ///
  /// 汇总模式下候选各自携带产出策略，过滤按产出策略的下限进行，
  /// 所以 `Combined` 的值只作兜底。
  pub fn min_confidence(&self) -> f32 {
    match self {
      DetectMethod::Motion => 0.5,
      DetectMethod::Blob => 0.5,
      DetectMethod::Circle => 0.6,
      DetectMethod::Combined => 0.5,
    }
  }
}

impl FromStr for DetectMethod {
  type Err = DetectError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "motion" => Ok(DetectMethod::Motion),
      "blob" => Ok(DetectMethod::Blob),
      "circle" => Ok(DetectMethod::Circle),
      "combined" => Ok(DetectMethod::Combined),
      other => Err(DetectError::UnknownMethod(other.to_string())),
    }
  }
}

impl fmt::Display for DetectMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DetectMethod::Motion => write!(f, "motion"),
      DetectMethod::Blob => write!(f, "blob"),
      DetectMethod::Circle => write!(f, "circle"),
      DetectMethod::Combined => write!(f, "combined"),
    }
  }
}

/// 按策略在单帧上找候选
///
/// 运动策略需要背景模型给出的前景掩码；模型未就绪时掩码为 `None`，
/// 此时直接返回空列表。汇总模式把三种策略在同一帧上依次跑完，
/// 候选各自保留产出策略，去重交给后续合并。
pub fn detect_candidates(
  image: &RgbImage,
  gray: &GrayImage,
  mask: Option<&GrayImage>,
  method: DetectMethod,
  params: &DetectParams,
) -> Vec<Candidate> {
  match method {
    DetectMethod::Motion => match mask {
      Some(mask) => motion::detect(mask, params),
      None => {
        debug!("背景模型未就绪，运动检测跳过");
        Vec::new()
      }
    },
    DetectMethod::Blob => blob::detect(gray, params),
    DetectMethod::Circle => circle::detect(image, gray, params),
    DetectMethod::Combined => {
      let mut pooled = match mask {
        Some(mask) => motion::detect(mask, params),
        None => {
          debug!("背景模型未就绪，汇总检测跳过运动策略");
          Vec::new()
        }
      };
      pooled.extend(blob::detect(gray, params));
      pooled.extend(circle::detect(image, gray, params));
      pooled
    }
  }
}
