// 该文件是 Panshan （盘山叠翠） 项目的一部分。
// src/plc.rs - PLC 控制器接口与回环实现
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

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// PLC 相关错误
#[derive(Debug, Error)]
pub enum PlcError {
  /// 控制器未连接
  #[error("PLC 未连接")]
  NotConnected,
  /// 写入目标位失败
  #[error("PLC 写入失败: {0}")]
  WriteFailed(String),
  /// 读取目标位失败
  #[error("PLC 读取失败: {0}")]
  ReadFailed(String),
}

/// PLC 控制器
///
/// 以字节地址加位偏移寻址，所有实现都要求可跨线程共享，
/// 状态轮询与检测路径会同时访问。
pub trait PlcController: Send + Sync {
  /// 控制器当前是否在线
  fn is_connected(&self) -> bool;
  /// 写单个位
  fn write_bit(&self, byte_offset: u32, bit_offset: u8, value: bool) -> Result<(), PlcError>;
  /// 读单个位
  fn read_bit(&self, byte_offset: u32, bit_offset: u8) -> Result<bool, PlcError>;
}

/// 约定的控制位布局，全部位于 0 号字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlBit {
  /// 启动传送带
  Start,
  /// 停止传送带
  Stop,
  /// 机构回原点
  Home,
  /// 急停
  EmergencyStop,
  /// 吸嘴开关
  Suction,
  /// 设备就绪
  Ready,
  /// 设备忙
  Busy,
  /// 设备故障
  Fault,
}

impl ControlBit {
  /// 位对应的 (字节, 位) 地址
  pub fn address(&self) -> (u32, u8) {
    match self {
      ControlBit::Start => (0, 0),
      ControlBit::Stop => (0, 1),
      ControlBit::Home => (0, 2),
      ControlBit::EmergencyStop => (0, 3),
      ControlBit::Suction => (0, 4),
      ControlBit::Ready => (0, 5),
      ControlBit::Busy => (0, 6),
      ControlBit::Fault => (0, 7),
    }
  }
}

/// 控制位的一次性快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlBits {
  pub start: bool,
  pub stop: bool,
  pub home: bool,
  pub emergency_stop: bool,
  pub suction: bool,
  pub ready: bool,
  pub busy: bool,
  pub fault: bool,
}

impl ControlBits {
  /// 逐位读出快照，任何一位读失败则整体返回 `None`
  pub fn read_from(plc: &dyn PlcController) -> Option<Self> {
    let read = |bit: ControlBit| {
      let (byte, offset) = bit.address();
      plc.read_bit(byte, offset).ok()
    };
    Some(ControlBits {
      start: read(ControlBit::Start)?,
      stop: read(ControlBit::Stop)?,
      home: read(ControlBit::Home)?,
      emergency_stop: read(ControlBit::EmergencyStop)?,
      suction: read(ControlBit::Suction)?,
      ready: read(ControlBit::Ready)?,
      busy: read(ControlBit::Busy)?,
      fault: read(ControlBit::Fault)?,
    })
  }
}

/// 进程内回环控制器
///
/// 把 PLC 存储区放在一张哈希表里，联调与测试时代替现场总线硬件。
/// 连接状态与写入故障都可以人为切换。
pub struct MemoryPlc {
  memory: Mutex<HashMap<u32, u8>>,
  connected: AtomicBool,
  write_fault: AtomicBool,
}

impl MemoryPlc {
  pub fn new() -> Self {
    MemoryPlc {
      memory: Mutex::new(HashMap::new()),
      connected: AtomicBool::new(true),
      write_fault: AtomicBool::new(false),
    }
  }

  /// 切换连接状态
  pub fn set_connected(&self, connected: bool) {
    self.connected.store(connected, Ordering::SeqCst);
  }

  /// 让后续写入全部失败，模拟总线抖动
  pub fn inject_write_fault(&self, fault: bool) {
    self.write_fault.store(fault, Ordering::SeqCst);
  }
}

impl Default for MemoryPlc {
  fn default() -> Self {
    Self::new()
  }
}

impl PlcController for MemoryPlc {
  fn is_connected(&self) -> bool {
    self.connected.load(Ordering::SeqCst)
  }

  fn write_bit(&self, byte_offset: u32, bit_offset: u8, value: bool) -> Result<(), PlcError> {
    if !self.is_connected() {
      return Err(PlcError::NotConnected);
    }
    if self.write_fault.load(Ordering::SeqCst) {
      return Err(PlcError::WriteFailed("注入的写入故障".to_string()));
    }
    let mut memory = self.memory.lock().unwrap();
    let byte = memory.entry(byte_offset).or_insert(0);
    if value {
      *byte |= 1 << bit_offset;
    } else {
      *byte &= !(1 << bit_offset);
    }
    debug!("PLC 写入 {}.{} = {}", byte_offset, bit_offset, value);
    Ok(())
  }

  fn read_bit(&self, byte_offset: u32, bit_offset: u8) -> Result<bool, PlcError> {
    if !self.is_connected() {
      return Err(PlcError::NotConnected);
    }
    let memory = self.memory.lock().unwrap();
    let byte = memory.get(&byte_offset).copied().unwrap_or(0);
    Ok(byte & (1 << bit_offset) != 0)
  }
}

/// 永远离线的占位控制器，未配置 PLC 时使用
pub struct NullPlc;

impl PlcController for NullPlc {
  fn is_connected(&self) -> bool {
    false
  }

  fn write_bit(&self, _byte_offset: u32, _bit_offset: u8, _value: bool) -> Result<(), PlcError> {
    Err(PlcError::NotConnected)
  }

  fn read_bit(&self, _byte_offset: u32, _bit_offset: u8) -> Result<bool, PlcError> {
    Err(PlcError::NotConnected)
  }
}
