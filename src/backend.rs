// 该文件是 Shanan （山南西风） 项目的一部分。
// src/backend.rs - 计算后端选择
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

use std::{
  fmt,
  str::FromStr,
  sync::atomic::{AtomicU16, Ordering},
};

use thiserror::Error;
use tracing::{debug, warn};

/// 推理使用的计算后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
  #[default]
  Cpu,
  Gpu,
  Npu,
}

// 0 保留给 "无待处理请求"
const NO_PENDING: u8 = 0;

impl Backend {
  pub const ALL: [Backend; 3] = [Backend::Cpu, Backend::Gpu, Backend::Npu];

  fn to_raw(self) -> u8 {
    match self {
      Backend::Cpu => 1,
      Backend::Gpu => 2,
      Backend::Npu => 3,
    }
  }

  fn from_raw(raw: u8) -> Option<Self> {
    match raw {
      1 => Some(Backend::Cpu),
      2 => Some(Backend::Gpu),
      3 => Some(Backend::Npu),
      _ => None,
    }
  }

  pub fn is_accelerator(self) -> bool {
    !matches!(self, Backend::Cpu)
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Backend::Cpu => "cpu",
      Backend::Gpu => "gpu",
      Backend::Npu => "npu",
    };
    f.write_str(name)
  }
}

impl FromStr for Backend {
  type Err = SelectError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "cpu" | "arm" => Ok(Backend::Cpu),
      "gpu" | "opencl" => Ok(Backend::Gpu),
      "npu" | "huawei_npu" => Ok(Backend::Npu),
      other => Err(SelectError::Unknown(other.to_string())),
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectError {
  #[error("当前设备不支持后端: {0}")]
  Unavailable(Backend),
  #[error("未知的后端名称: {0}")]
  Unknown(String),
}

/// 设备能力，启动时探测一次后传入 [`BackendSelector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
  pub gpu: bool,
  pub npu: bool,
}

impl Default for DeviceCapabilities {
  fn default() -> Self {
    Self {
      gpu: true,
      npu: false,
    }
  }
}

impl DeviceCapabilities {
  pub fn cpu_only() -> Self {
    Self {
      gpu: false,
      npu: false,
    }
  }

  pub fn supports(&self, backend: Backend) -> bool {
    match backend {
      Backend::Cpu => true,
      Backend::Gpu => self.gpu,
      Backend::Npu => self.npu,
    }
  }
}

/// 后端选择器
///
/// UI 线程调用 [`select`](Self::select) 提交请求，帧回调线程通过
/// [`consume_pending`](Self::consume_pending) 原子地取走请求。待处理请求只有
/// 一个槽位，后到的选择覆盖先到的，因此 GPU 与 NPU 天然互斥。
///
/// 请求的后端与待处理请求打包在同一个原子量里（高字节为请求，低字节为待处理），
/// 多个线程同时选择时两者始终一致。
#[derive(Debug)]
pub struct BackendSelector {
  capabilities: DeviceCapabilities,
  state: AtomicU16,
}

fn pack(requested: Backend, pending: u8) -> u16 {
  ((requested.to_raw() as u16) << 8) | pending as u16
}

fn requested_of(state: u16) -> Option<Backend> {
  Backend::from_raw((state >> 8) as u8)
}

fn pending_of(state: u16) -> Option<Backend> {
  Backend::from_raw((state & 0xff) as u8)
}

impl BackendSelector {
  pub fn new(capabilities: DeviceCapabilities) -> Self {
    Self {
      capabilities,
      state: AtomicU16::new(pack(Backend::Cpu, NO_PENDING)),
    }
  }

  /// 以指定的初始后端创建，不产生待处理请求
  pub fn with_initial(
    capabilities: DeviceCapabilities,
    initial: Backend,
  ) -> Result<Self, SelectError> {
    if !capabilities.supports(initial) {
      return Err(SelectError::Unavailable(initial));
    }
    Ok(Self {
      capabilities,
      state: AtomicU16::new(pack(initial, NO_PENDING)),
    })
  }

  pub fn capabilities(&self) -> DeviceCapabilities {
    self.capabilities
  }

  /// 最近一次被选择的后端
  pub fn requested(&self) -> Backend {
    requested_of(self.state.load(Ordering::Acquire)).unwrap_or_default()
  }

  pub fn select(&self, backend: Backend) -> Result<(), SelectError> {
    if !self.capabilities.supports(backend) {
      warn!("忽略不可用的后端选择: {}", backend);
      return Err(SelectError::Unavailable(backend));
    }
    let previous = self
      .state
      .swap(pack(backend, backend.to_raw()), Ordering::AcqRel);
    if let Some(replaced) = pending_of(previous) {
      debug!("待处理的后端请求 {} 被 {} 覆盖", replaced, backend);
    }
    Ok(())
  }

  /// 开关式切换：打开时选择该加速器，关闭时仅当它是当前请求的后端才回退到 CPU
  pub fn toggle(&self, accelerator: Backend, on: bool) -> Result<(), SelectError> {
    if on {
      return self.select(accelerator);
    }
    if !accelerator.is_accelerator() {
      return Ok(());
    }
    let fallback = pack(Backend::Cpu, Backend::Cpu.to_raw());
    let swapped = self
      .state
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
        (requested_of(state) == Some(accelerator)).then_some(fallback)
      });
    if swapped.is_ok() {
      debug!("关闭 {}，回退到 cpu", accelerator);
    }
    Ok(())
  }

  /// 读取并清除待处理请求
  pub fn consume_pending(&self) -> Option<Backend> {
    pending_of(self.state.fetch_and(0xff00, Ordering::AcqRel))
  }

  pub fn has_pending(&self) -> bool {
    self.peek_pending().is_some()
  }

  /// 查看待处理请求但不清除
  pub fn peek_pending(&self) -> Option<Backend> {
    pending_of(self.state.load(Ordering::Acquire))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{sync::Arc, thread};

  fn all_devices() -> DeviceCapabilities {
    DeviceCapabilities {
      gpu: true,
      npu: true,
    }
  }

  #[test]
  fn later_selection_replaces_pending_one() {
    let selector = BackendSelector::new(all_devices());
    selector.select(Backend::Gpu).unwrap();
    selector.select(Backend::Npu).unwrap();

    assert_eq!(selector.consume_pending(), Some(Backend::Npu));
    assert_eq!(selector.consume_pending(), None);
    assert_eq!(selector.requested(), Backend::Npu);

    selector.select(Backend::Cpu).unwrap();
    assert_eq!(selector.consume_pending(), Some(Backend::Cpu));
    assert_eq!(selector.consume_pending(), None);
  }

  #[test]
  fn unavailable_backend_is_rejected() {
    let selector = BackendSelector::new(DeviceCapabilities::default());
    assert_eq!(
      selector.select(Backend::Npu),
      Err(SelectError::Unavailable(Backend::Npu))
    );
    assert!(!selector.has_pending());
    assert_eq!(selector.requested(), Backend::Cpu);
    assert!(BackendSelector::with_initial(DeviceCapabilities::cpu_only(), Backend::Gpu).is_err());
  }

  #[test]
  fn toggle_off_only_falls_back_when_active() {
    let selector = BackendSelector::new(all_devices());
    selector.toggle(Backend::Gpu, true).unwrap();
    selector.toggle(Backend::Npu, true).unwrap();
    assert_eq!(selector.consume_pending(), Some(Backend::Npu));

    // GPU 已被 NPU 取代，关闭 GPU 不应产生请求
    selector.toggle(Backend::Gpu, false).unwrap();
    assert_eq!(selector.consume_pending(), None);
    assert_eq!(selector.requested(), Backend::Npu);

    selector.toggle(Backend::Npu, false).unwrap();
    assert_eq!(selector.consume_pending(), Some(Backend::Cpu));
    assert_eq!(selector.requested(), Backend::Cpu);
  }

  #[test]
  fn backend_names_parse() {
    assert_eq!("GPU".parse::<Backend>(), Ok(Backend::Gpu));
    assert_eq!("huawei_npu".parse::<Backend>(), Ok(Backend::Npu));
    assert_eq!(" arm ".parse::<Backend>(), Ok(Backend::Cpu));
    assert!("tpu".parse::<Backend>().is_err());
    assert_eq!(Backend::Npu.to_string(), "npu");
  }

  #[test]
  fn concurrent_selection_is_never_lost() {
    let selector = Arc::new(BackendSelector::new(all_devices()));
    let writer = {
      let selector = Arc::clone(&selector);
      thread::spawn(move || {
        for i in 0..1000 {
          let backend = if i % 2 == 0 { Backend::Gpu } else { Backend::Cpu };
          selector.select(backend).unwrap();
        }
        selector.select(Backend::Npu).unwrap();
      })
    };

    let mut last = None;
    while !writer.is_finished() {
      if let Some(backend) = selector.consume_pending() {
        last = Some(backend);
      }
    }
    writer.join().unwrap();
    if let Some(backend) = selector.consume_pending() {
      last = Some(backend);
    }

    assert_eq!(last, Some(Backend::Npu));
    assert_eq!(selector.consume_pending(), None);
  }

  #[test]
  fn racing_writers_keep_request_and_pending_in_step() {
    for _ in 0..200 {
      let selector = Arc::new(BackendSelector::new(all_devices()));
      let writers: Vec<_> = [Backend::Gpu, Backend::Npu]
        .into_iter()
        .map(|backend| {
          let selector = Arc::clone(&selector);
          thread::spawn(move || {
            for _ in 0..20 {
              selector.select(backend).unwrap();
            }
          })
        })
        .collect();
      for writer in writers {
        writer.join().unwrap();
      }
      let requested = selector.requested();
      assert_eq!(selector.consume_pending(), Some(requested));
    }
  }

  #[test]
  fn capabilities_gate_selection() {
    let selector = BackendSelector::new(DeviceCapabilities::cpu_only());
    assert_eq!(selector.capabilities(), DeviceCapabilities::cpu_only());
    assert!(!selector.capabilities().supports(Backend::Gpu));
    assert!(selector.select(Backend::Gpu).is_err());
    assert!(selector.select(Backend::Cpu).is_ok());
  }
}
