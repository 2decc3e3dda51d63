// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/detect/config.rs - 检测参数配置
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

/// 单次检测调用的参数
///
/// 所有字段都有文档化默认值；越界输入在边界处被钳制而不是报错。
#[derive(Debug, Clone)]
pub struct DetectParams {
  /// 最小候选面积（像素）
  pub min_area: f64,
  /// 最大候选面积（像素）
  pub max_area: f64,
  /// 最小宽高比
  pub min_aspect: f32,
  /// 最大宽高比
  pub max_aspect: f32,
  /// 覆盖策略默认的最低置信度 (0.0 - 1.0)
  pub min_confidence: Option<f32>,
  /// 合并距离（像素）：中心距小于该值的候选会被合并
  pub merge_distance: f32,
  /// 保留的最大候选数；`None` 表示不限制
  pub max_candidates: Option<usize>,
  /// 是否启用背景建模（运动轮廓策略依赖）
  pub use_background: bool,
  /// 圆形检测无命中时是否启用颜色掩码回退
  pub color_fallback: bool,
  /// 背景（传送带）色相区间，单位度 [低, 高]
  pub background_hue: [f32; 2],
  /// 最低圆度 4πA/P²
  pub min_circularity: f32,
}

impl Default for DetectParams {
  fn default() -> Self {
    Self {
      min_area: 500.0,
      max_area: 100_000.0,
      min_aspect: 0.2,
      max_aspect: 5.0,
      min_confidence: None,
      merge_distance: 30.0,
      max_candidates: Some(1),
      use_background: true,
      color_fallback: true,
      background_hue: [35.0, 85.0],
      min_circularity: 0.65,
    }
  }
}

impl DetectParams {
  /// 返回钳制到合法区间后的参数副本
  pub fn sanitized(&self) -> Self {
    let defaults = Self::default();
    let mut params = self.clone();

    if !params.min_area.is_finite() || params.min_area < 1.0 {
      params.min_area = defaults.min_area.min(params.max_area.max(1.0));
    }
    if !params.max_area.is_finite() || params.max_area <= params.min_area {
      params.max_area = defaults.max_area.max(params.min_area + 1.0);
    }

    if !params.min_aspect.is_finite() {
      params.min_aspect = defaults.min_aspect;
    }
    if !params.max_aspect.is_finite() {
      params.max_aspect = defaults.max_aspect;
    }
    params.min_aspect = params.min_aspect.clamp(0.01, 100.0);
    params.max_aspect = params.max_aspect.clamp(params.min_aspect, 100.0);

    params.min_confidence = params
      .min_confidence
      .filter(|c| c.is_finite())
      .map(|c| c.clamp(0.0, 1.0));

    if !params.merge_distance.is_finite() {
      params.merge_distance = defaults.merge_distance;
    }
    params.merge_distance = params.merge_distance.clamp(0.0, 500.0);

    for hue in params.background_hue.iter_mut() {
      if !hue.is_finite() {
        *hue = 0.0;
      }
      *hue = hue.clamp(0.0, 360.0);
    }
    if params.background_hue[0] > params.background_hue[1] {
      params.background_hue.swap(0, 1);
    }

    if !params.min_circularity.is_finite() {
      params.min_circularity = defaults.min_circularity;
    }
    params.min_circularity = params.min_circularity.clamp(0.0, 1.0);

    params
  }
}
