// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use clap::Parser;

use panshan::FromUrl;
use panshan::detect::{DetectMethod, DetectParams};
use panshan::output::CropArchive;
use panshan::plc::MemoryPlc;
use panshan::session::InspectionSession;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  println!("Panshan 传送带计数检测");
  println!("====================");
  println!("相机来源: {}", args.camera);
  println!("检测策略: {}", args.method);
  println!("面积区间: {} - {}", args.min_area, args.max_area);
  println!("合并距离: {}", args.merge_distance);
  println!();

  let method: DetectMethod = args.method.parse()?;
  let params = DetectParams {
    min_area: args.min_area,
    max_area: args.max_area,
    merge_distance: args.merge_distance,
    min_confidence: args.min_confidence,
    max_candidates: (args.max_candidates > 0).then_some(args.max_candidates as usize),
    use_background: !args.no_background,
    color_fallback: !args.no_color_fallback,
    ..DetectParams::default()
  };

  let mut session = InspectionSession::new();

  if let Some(spec) = &args.plc_bit {
    let (byte_offset, bit_offset) = parse_plc_bit(spec)?;
    println!("PLC 控制位: {}.{}（回环控制器）", byte_offset, bit_offset);
    session = session
      .with_plc(Arc::new(MemoryPlc::new()))
      .with_publish_bit(byte_offset, bit_offset);
  }

  if let Some(archive_url) = &args.archive {
    let url = url::Url::parse(archive_url).context("归档地址无法解析")?;
    println!("归档目录: {}", url.path());
    session = session.with_archive(CropArchive::from_url(&url)?);
  }

  let session = Arc::new(session);

  println!("正在打开相机...");
  session.open_camera(&args.camera, args.width, args.height)?;

  if matches!(method, DetectMethod::Motion | DetectMethod::Combined) && args.warmup > 0 {
    println!("背景建模预热 {} 帧...", args.warmup);
    let fed = session.warm_up(args.warmup);
    if fed < args.warmup {
      println!("预热提前结束（{} 帧）", fed);
    }
  }

  println!();
  println!("开始检测...");
  let mut total_objects = 0usize;
  for index in 0..args.frames.max(1) {
    let report = session.detect_counters(method, &params);
    total_objects += report.object_count;

    if args.frames > 1 {
      println!("帧 {}: {}", index, serde_json::to_string(&report)?);
    } else {
      println!("{}", serde_json::to_string_pretty(&report)?);
    }
  }

  session.release_camera();

  println!();
  println!("处理完成!");
  println!("总检测数: {}", total_objects);

  Ok(())
}

/// 解析 BYTE.BIT 形式的控制位地址
fn parse_plc_bit(spec: &str) -> Result<(u32, u8)> {
  let (byte_part, bit_part) = spec.split_once('.').context("PLC 位格式应为 BYTE.BIT")?;
  let byte_offset = byte_part.parse().context("PLC 字节地址无法解析")?;
  let bit_offset: u8 = bit_part.parse().context("PLC 位偏移无法解析")?;
  ensure!(bit_offset < 8, "位偏移必须在 0-7 之间");
  Ok((byte_offset, bit_offset))
}
