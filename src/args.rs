// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;

/// Panshan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 相机来源
  /// 支持格式:
  /// - V4L2: /dev/video0、v4l2:///dev/video0 或设备序号 0
  /// - 回放: 图片路径 或 replay://frames/belt.png
  #[arg(long, default_value = "v4l2:///dev/video0", value_name = "SOURCE")]
  pub camera: String,

  /// 请求的帧宽度
  #[arg(long, default_value = "640", value_name = "PIXELS")]
  pub width: u32,

  /// 请求的帧高度
  #[arg(long, default_value = "480", value_name = "PIXELS")]
  pub height: u32,

  /// 检测策略 (motion / blob / circle / combined)
  #[arg(long, default_value = "circle", value_name = "METHOD")]
  pub method: String,

  /// 最小候选面积（像素）
  #[arg(long, default_value = "500", value_name = "AREA")]
  pub min_area: f64,

  /// 最大候选面积（像素）
  #[arg(long, default_value = "100000", value_name = "AREA")]
  pub max_area: f64,

  /// 候选合并距离（像素）
  #[arg(long, default_value = "30", value_name = "PIXELS")]
  pub merge_distance: f32,

  /// 覆盖策略默认的最低置信度 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub min_confidence: Option<f32>,

  /// 保留的最大候选数（0 表示不限制）
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub max_candidates: u64,

  /// 关闭背景建模
  #[arg(long)]
  pub no_background: bool,

  /// 关闭圆形检测的颜色掩码回退
  #[arg(long)]
  pub no_color_fallback: bool,

  /// 背景模型预热帧数（运动策略）
  #[arg(long, default_value = "30", value_name = "FRAMES")]
  pub warmup: usize,

  /// 处理帧数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub frames: u64,

  /// 裁剪归档地址，如 folder:///var/lib/panshan?annotated&record
  #[arg(long, value_name = "URL")]
  pub archive: Option<String>,

  /// 检测结论写入的 PLC 控制位，格式 BYTE.BIT（回环控制器）
  #[arg(long, value_name = "BYTE.BIT")]
  pub plc_bit: Option<String>,
}
