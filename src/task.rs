// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/task.rs - 监控任务循环
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
use std::sync::atomic::{AtomicBool, Ordering};
use std::{thread, time::Duration};

use tracing::{info, warn};

use crate::detect::{DetectMethod, DetectParams};
use crate::plc::ControlBits;
use crate::session::InspectionSession;

/// 设备状态轮询线程
///
/// 以固定节拍读相机和 PLC 的连接状态与控制位，跳变时打日志。
/// 只调用 [`InspectionSession::poll_status`]，不碰背景模型。
pub struct StatusPoller {
  stop: Arc<AtomicBool>,
  handle: Option<thread::JoinHandle<()>>,
}

impl StatusPoller {
  pub fn spawn(session: Arc<InspectionSession>, interval: Duration) -> Self {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let handle = thread::spawn(move || {
      let mut last: Option<(bool, bool)> = None;
      let mut last_control: Option<ControlBits> = None;
      while !stop_flag.load(Ordering::SeqCst) {
        let status = session.poll_status();
        let current = (status.camera_connected, status.plc_connected);
        if last != Some(current) {
          if last.is_some_and(|(camera, _)| camera) && !status.camera_connected {
            warn!("相机连接丢失");
          }
          info!(
            "设备状态: 相机 {} / PLC {}",
            if status.camera_connected { "在线" } else { "离线" },
            if status.plc_connected { "在线" } else { "离线" }
          );
          last = Some(current);
        }
        if status.control != last_control {
          if let Some(bits) = status.control {
            info!(
              "控制位: 启动 {} 停止 {} 回原点 {} 急停 {} 吸嘴 {} 就绪 {} 忙 {} 故障 {}",
              bits.start as u8,
              bits.stop as u8,
              bits.home as u8,
              bits.emergency_stop as u8,
              bits.suction as u8,
              bits.ready as u8,
              bits.busy as u8,
              bits.fault as u8
            );
          }
          last_control = status.control;
        }
        thread::sleep(interval);
      }
    });
    Self {
      stop,
      handle: Some(handle),
    }
  }

  /// 停止轮询并等待线程退出
  pub fn stop(mut self) {
    self.stop.store(true, Ordering::SeqCst);
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

/// 周期性检测任务
///
/// 每个节拍跑一次完整检测，直到 Ctrl-C 或达到指定帧数。
#[derive(Debug)]
pub struct MonitorTask {
  interval_ms: u64,
  frame_number: Option<usize>,
  method: DetectMethod,
  params: DetectParams,
}

impl MonitorTask {
  pub fn new(method: DetectMethod, params: DetectParams) -> Self {
    Self {
      interval_ms: 200,
      frame_number: None,
      method,
      params,
    }
  }

  pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
    self.interval_ms = interval_ms;
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn run_task(self, session: Arc<InspectionSession>) -> anyhow::Result<()> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .expect("Error setting Ctrl-C handler");

    let poller = StatusPoller::spawn(session.clone(), Duration::from_millis(100));

    let mut frame_index = 0;
    loop {
      frame_index = (frame_index + 1) % usize::MAX;
      let now = std::time::Instant::now();
      let report = session.detect_counters(self.method, &self.params);
      let elapsed = now.elapsed();
      info!(
        "第 {} 帧: {} 个目标, 耗时 {:.2?}",
        frame_index, report.object_count, elapsed
      );
      if let Some(error) = &report.error {
        warn!("检测降级: {}", error);
      }
      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      thread::sleep(Duration::from_millis(self.interval_ms));
    }

    poller.stop();
    session.release_camera();
    info!("任务完成，退出");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::camera::ReplayCamera;
  use image::{Rgb, RgbImage};

  #[test]
  fn poller_stops_cleanly() {
    let session = Arc::new(InspectionSession::new());
    let poller = StatusPoller::spawn(session, Duration::from_millis(5));
    thread::sleep(Duration::from_millis(20));
    poller.stop();
  }

  #[test]
  fn bounded_run_stops_at_frame_limit() {
    let session = Arc::new(InspectionSession::new());
    let frames = vec![RgbImage::from_pixel(64, 48, Rgb([128u8, 128, 128]))];
    session.connect_camera(Box::new(ReplayCamera::from_images(frames).unwrap()));

    let task = MonitorTask::new(DetectMethod::Circle, DetectParams::default())
      .with_interval_ms(1)
      .with_frame_number(Some(3));
    task.run_task(session.clone()).unwrap();

    // 任务收尾会释放相机
    assert!(!session.camera_connected());
  }
}
