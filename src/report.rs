// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/report.rs - 检测结果数据模型
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

use chrono::Utc;
use serde::Serialize;

use crate::detect::DetectMethod;

/// 候选区域类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
  /// 前景运动轮廓
  Motion,
  /// 自适应阈值斑点
  Blob,
  /// 圆形变换命中
  Circle,
  /// 颜色掩码回退命中
  Color,
  /// 多个候选合并的结果
  Merged,
}

/// 检测候选
///
/// 由单一策略产出的候选区域；合并后派生候选携带 `count`。
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
  /// 候选类别
  #[serde(rename = "type")]
  pub kind: CandidateKind,
  /// 边界框左上角 x 坐标
  pub x: u32,
  /// 边界框左上角 y 坐标
  pub y: u32,
  /// 边界框宽度
  pub width: u32,
  /// 边界框高度
  pub height: u32,
  /// 区域面积（像素）
  pub area: f64,
  /// 中心点 [x, y]
  pub center: [f32; 2],
  /// 置信度 (0.0 - 1.0)
  pub confidence: f32,
  /// 产出该候选的检测方法
  pub method: DetectMethod,
  /// 半径（圆形候选）
  #[serde(skip_serializing_if = "Option::is_none")]
  pub radius: Option<f32>,
  /// 圆度 4πA/P²
  #[serde(skip_serializing_if = "Option::is_none")]
  pub circularity: Option<f32>,
  /// 边界框宽高比
  #[serde(skip_serializing_if = "Option::is_none")]
  pub aspect_ratio: Option<f32>,
  /// 实度（轮廓面积 / 凸包面积）
  #[serde(skip_serializing_if = "Option::is_none")]
  pub solidity: Option<f32>,
  /// 合并来源数量
  #[serde(skip_serializing_if = "Option::is_none")]
  pub count: Option<usize>,
  /// 从左到右的序号（1 起）
  #[serde(rename = "counterNumber", skip_serializing_if = "Option::is_none")]
  pub counter_number: Option<u32>,
}

impl Candidate {
  /// 创建一个无附加形状属性的候选
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    kind: CandidateKind,
    method: DetectMethod,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    area: f64,
    center: [f32; 2],
    confidence: f32,
  ) -> Self {
    Self {
      kind,
      x,
      y,
      width,
      height,
      area,
      center,
      confidence,
      method,
      radius: None,
      circularity: None,
      aspect_ratio: None,
      solidity: None,
      count: None,
      counter_number: None,
    }
  }

  /// 边界框右边界（不含）
  pub fn right(&self) -> u32 {
    self.x + self.width
  }

  /// 边界框下边界（不含）
  pub fn bottom(&self) -> u32 {
    self.y + self.height
  }
}

/// PLC 写入结果注记
#[derive(Debug, Clone, Serialize)]
pub struct PlcWriteOutcome {
  /// 是否写入成功
  pub written: bool,
  /// 失败原因
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

/// 归档结果注记
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
  /// 成功写出的文件数（裁剪、标注整帧、记录）
  pub saved: usize,
  /// 被跳过的裁剪数（零面积等）
  pub skipped: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

/// 单次检测调用的完整结果
///
/// 一经产出即不可变；副作用失败只体现为注记字段，绝不使检测调用失败。
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
  /// 使用的检测方法
  pub method: DetectMethod,
  /// 是否发现目标
  pub objects_found: bool,
  /// 目标数量
  pub object_count: usize,
  /// 按序号排列的候选列表
  pub objects: Vec<Candidate>,
  /// 时间戳（毫秒）
  pub timestamp: i64,
  /// 无帧等设备侧原因
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// PLC 写入注记（启用时）
  #[serde(skip_serializing_if = "Option::is_none")]
  pub plc_write: Option<PlcWriteOutcome>,
  /// 归档注记（启用时）
  #[serde(skip_serializing_if = "Option::is_none")]
  pub archive: Option<ArchiveOutcome>,
}

impl DetectionReport {
  /// 由编号后的候选列表构造结果
  pub fn new(method: DetectMethod, objects: Vec<Candidate>) -> Self {
    Self {
      method,
      objects_found: !objects.is_empty(),
      object_count: objects.len(),
      objects,
      timestamp: Utc::now().timestamp_millis(),
      error: None,
      plc_write: None,
      archive: None,
    }
  }

  /// 设备侧拿不到帧时的空结果
  pub fn no_frame(method: DetectMethod, reason: &str) -> Self {
    let mut report = Self::new(method, Vec::new());
    report.error = Some(reason.to_string());
    report
  }
}

/// 为候选分配从左到右的序号
///
/// 按中心 x 坐标升序排序并赋 1..N；仅在单次结果内有效，不跨调用保持身份。
pub fn assign_counter_numbers(mut objects: Vec<Candidate>) -> Vec<Candidate> {
  objects.sort_by(|a, b| a.center[0].partial_cmp(&b.center[0]).unwrap());
  for (index, object) in objects.iter_mut().enumerate() {
    object.counter_number = Some(index as u32 + 1);
  }
  objects
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate_at(x: f32, confidence: f32) -> Candidate {
    Candidate::new(
      CandidateKind::Blob,
      DetectMethod::Blob,
      x as u32 - 10,
      40,
      20,
      20,
      400.0,
      [x, 50.0],
      confidence,
    )
  }

  #[test]
  fn numbering_is_ascending_in_center_x() {
    let objects = vec![
      candidate_at(300.0, 0.9),
      candidate_at(50.0, 0.6),
      candidate_at(150.0, 0.8),
    ];
    let numbered = assign_counter_numbers(objects);
    let xs: Vec<f32> = numbered.iter().map(|c| c.center[0]).collect();
    let numbers: Vec<u32> = numbered.iter().map(|c| c.counter_number.unwrap()).collect();
    assert_eq!(xs, vec![50.0, 150.0, 300.0]);
    assert_eq!(numbers, vec![1, 2, 3]);
  }

  #[test]
  fn objects_found_tracks_candidate_list() {
    let empty = DetectionReport::new(DetectMethod::Circle, Vec::new());
    assert!(!empty.objects_found);
    assert_eq!(empty.object_count, 0);

    let one = DetectionReport::new(DetectMethod::Circle, vec![candidate_at(60.0, 0.7)]);
    assert!(one.objects_found);
    assert_eq!(one.object_count, 1);
  }

  #[test]
  fn report_serializes_with_camel_case_counter_number() {
    let numbered = assign_counter_numbers(vec![candidate_at(60.0, 0.7)]);
    let report = DetectionReport::new(DetectMethod::Blob, numbered);
    let value = serde_json::to_value(&report).unwrap();
    let object = &value["objects"][0];
    assert_eq!(object["counterNumber"], 1);
    assert_eq!(object["type"], "blob");
    assert_eq!(value["method"], "blob");
    assert!(object.get("radius").is_none());
  }

  #[test]
  fn no_frame_report_is_empty_with_reason() {
    let report = DetectionReport::no_frame(DetectMethod::Motion, "no frame available");
    assert!(!report.objects_found);
    assert_eq!(report.error.as_deref(), Some("no frame available"));
  }
}
