// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/session.rs - 检测会话
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

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::camera::{CameraSource, create_camera};
use crate::detect::{self, BackgroundModel, BackgroundState, DetectMethod, DetectParams};
use crate::frame::Frame;
use crate::output::CropArchive;
use crate::plc::{ControlBits, PlcController};
use crate::report::{self, DetectionReport, PlcWriteOutcome};

/// 状态轮询得到的设备侧快照
#[derive(Debug, Clone, Serialize)]
pub struct PlantStatus {
  /// 相机是否连接
  pub camera_connected: bool,
  /// PLC 是否在线
  pub plc_connected: bool,
  /// 控制位快照（PLC 在线时）
  #[serde(skip_serializing_if = "Option::is_none")]
  pub control: Option<ControlBits>,
}

impl PlantStatus {
  /// 传送带当前是否在运行
  pub fn belt_running(&self) -> bool {
    self
      .control
      .map(|bits| bits.start && !bits.stop && !bits.emergency_stop)
      .unwrap_or(false)
  }
}

/// 检测会话
///
/// 持有相机、背景模型和外设句柄，是所有检测调用的入口。
/// 相机互斥锁同时被检测路径和状态轮询使用；背景统计只在
/// 检测调用（以及显式预热）里变化，轮询永远不碰它。
pub struct InspectionSession {
  camera: Mutex<Option<Box<dyn CameraSource>>>,
  background: Mutex<BackgroundModel>,
  plc: Option<Arc<dyn PlcController>>,
  archive: Option<CropArchive>,
  publish_bit: Option<(u32, u8)>,
}

impl InspectionSession {
  pub fn new() -> Self {
    InspectionSession {
      camera: Mutex::new(None),
      background: Mutex::new(BackgroundModel::new()),
      plc: None,
      archive: None,
      publish_bit: None,
    }
  }

  /// 挂上 PLC 控制器
  pub fn with_plc(mut self, plc: Arc<dyn PlcController>) -> Self {
    self.plc = Some(plc);
    self
  }

  /// 挂上裁剪归档
  pub fn with_archive(mut self, archive: CropArchive) -> Self {
    self.archive = Some(archive);
    self
  }

  /// 检测结果写到哪个控制位
  pub fn with_publish_bit(mut self, byte_offset: u32, bit_offset: u8) -> Self {
    self.publish_bit = Some((byte_offset, bit_offset));
    self
  }

  /// 按地址打开相机并接入会话
  pub fn open_camera(&self, source: &str, width: u32, height: u32) -> Result<()> {
    let camera = create_camera(source, width, height)?;
    info!("相机已连接: {} ({}x{})", source, camera.width(), camera.height());
    self.connect_camera(camera);
    Ok(())
  }

  /// 接入一台已创建的相机，替换旧相机并重置背景模型
  pub fn connect_camera(&self, camera: Box<dyn CameraSource>) {
    let mut slot = self.camera.lock().unwrap();
    if slot.replace(camera).is_some() {
      warn!("替换了已连接的相机");
    }
    self.background.lock().unwrap().reset();
  }

  /// 释放相机并重置背景模型
  pub fn release_camera(&self) {
    let mut slot = self.camera.lock().unwrap();
    if slot.take().is_some() {
      info!("相机已释放");
    }
    self.background.lock().unwrap().reset();
  }

  /// 相机当前是否连接
  pub fn camera_connected(&self) -> bool {
    self.camera.lock().unwrap().is_some()
  }

  /// 背景模型当前状态
  pub fn background_state(&self) -> BackgroundState {
    self.background.lock().unwrap().state()
  }

  /// 连续取帧喂给背景模型，返回实际消耗的帧数
  ///
  /// 运动检测要求模型就绪（通常 30 帧），开机后先预热一轮。
  pub fn warm_up(&self, frames: usize) -> usize {
    let mut fed = 0;
    for _ in 0..frames {
      let Some(frame) = self.read_frame() else {
        break;
      };
      let gray = frame.to_gray();
      self.background.lock().unwrap().update(&gray);
      fed += 1;
    }
    debug!("预热消耗 {} 帧", fed);
    fed
  }

  /// 在下一帧上跑一次完整检测
  ///
  /// 每次调用恰好消耗一帧。拿不到帧、PLC 掉线、归档失败都不会让
  /// 调用失败，全部折叠进返回的 [`DetectionReport`] 注记字段。
  pub fn detect_counters(&self, method: DetectMethod, params: &DetectParams) -> DetectionReport {
    let params = params.sanitized();
    let started = Instant::now();

    let Some(frame) = self.read_frame() else {
      return DetectionReport::no_frame(method, "no frame available");
    };

    let gray = frame.to_gray();
    let mask = if params.use_background {
      let mut background = self.background.lock().unwrap();
      // 先取掩码再更新，当前帧里的新目标才不会被自己的均值吃掉
      let mask = background.foreground_mask(&gray);
      background.update(&gray);
      mask
    } else {
      None
    };

    let candidates = detect::detect_candidates(&frame.image, &gray, mask.as_ref(), method, &params);
    let merged = detect::merge_candidates(candidates, &params);
    let objects = report::assign_counter_numbers(merged);

    let mut report = DetectionReport::new(method, objects);

    if let (Some(plc), Some((byte_offset, bit_offset))) = (&self.plc, self.publish_bit) {
      report.plc_write = Some(publish_result(
        plc.as_ref(),
        byte_offset,
        bit_offset,
        report.objects_found,
      ));
    }

    if let Some(archive) = &self.archive {
      report.archive = Some(archive.save_crops(&frame, &report.objects));
    }

    debug!(
      "{} 检测完成: {} 个目标, 耗时 {:?}",
      method,
      report.object_count,
      started.elapsed()
    );
    report
  }

  /// 轮询设备侧状态
  ///
  /// 只读相机连接状态和 PLC 控制位，复用取帧的那把相机锁。
  pub fn poll_status(&self) -> PlantStatus {
    let camera_connected = self.camera.lock().unwrap().is_some();
    let (plc_connected, control) = match &self.plc {
      Some(plc) => (plc.is_connected(), ControlBits::read_from(plc.as_ref())),
      None => (false, None),
    };
    PlantStatus {
      camera_connected,
      plc_connected,
      control,
    }
  }

  /// 从相机取一帧
  ///
  /// 没有相机、取帧出错或流结束都返回 `None`，错误只记日志。
  pub fn read_frame(&self) -> Option<Frame> {
    let mut slot = self.camera.lock().unwrap();
    let camera = slot.as_mut()?;
    match camera.next() {
      Some(Ok(frame)) => Some(frame),
      Some(Err(error)) => {
        warn!("取帧失败: {error}");
        None
      }
      None => {
        warn!("相机流已结束");
        None
      }
    }
  }
}

impl Default for InspectionSession {
  fn default() -> Self {
    Self::new()
  }
}

/// 把检测结论写到 PLC 控制位
fn publish_result(
  plc: &dyn PlcController,
  byte_offset: u32,
  bit_offset: u8,
  objects_found: bool,
) -> PlcWriteOutcome {
  if !plc.is_connected() {
    warn!("PLC 未连接，跳过结果写入");
    return PlcWriteOutcome {
      written: false,
      reason: Some("plc_not_connected".to_string()),
    };
  }
  match plc.write_bit(byte_offset, bit_offset, objects_found) {
    Ok(()) => PlcWriteOutcome {
      written: true,
      reason: None,
    },
    Err(error) => {
      warn!("PLC 写入失败: {error}");
      PlcWriteOutcome {
        written: false,
        reason: Some("plc_write_failed".to_string()),
      }
    }
  }
}
