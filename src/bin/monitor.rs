// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/bin/monitor.rs - 连续监控程序
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use panshan::detect::{DetectMethod, DetectParams};
use panshan::plc::MemoryPlc;
use panshan::session::InspectionSession;
use panshan::task::MonitorTask;

/// Panshan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 相机来源
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

  /// 检测节拍（毫秒）
  #[arg(long, default_value = "200", value_name = "MS")]
  pub interval: u64,

  /// 背景模型预热帧数（运动策略）
  #[arg(long, default_value = "30", value_name = "FRAMES")]
  pub warmup: usize,

  /// 挂一个回环 PLC 用于联调
  #[arg(long)]
  pub with_plc: bool,

  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("相机来源: {}", args.camera);
  info!("检测策略: {}", args.method);

  let method: DetectMethod = args.method.parse()?;
  let mut session = InspectionSession::new();
  if args.with_plc {
    session = session.with_plc(Arc::new(MemoryPlc::new()));
  }
  let session = Arc::new(session);
  session.open_camera(&args.camera, args.width, args.height)?;

  if matches!(method, DetectMethod::Motion | DetectMethod::Combined) && args.warmup > 0 {
    info!("背景建模预热 {} 帧...", args.warmup);
    session.warm_up(args.warmup);
  }

  let task = MonitorTask::new(method, DetectParams::default())
    .with_interval_ms(args.interval)
    .with_frame_number((args.frame_number > 0).then_some(args.frame_number));
  task.run_task(session)
}
