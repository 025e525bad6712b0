// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detector.rs - 检测器接口
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

use crate::{config::DetectorConfig, frame::Frame};

/// 检测能力
///
/// `init` 产生的句柄由流水线独占，`deinit` 按值接收句柄，释放后无法再使用。
pub trait Detector {
  type Handle;
  type Error: std::error::Error + Send + Sync + 'static;

  fn init(&mut self, config: &DetectorConfig) -> Result<Self::Handle, Self::Error>;

  /// 坐标以帧的显示方向（已应用旋转）给出
  fn detect(
    &mut self,
    handle: &mut Self::Handle,
    frame: &Frame<'_>,
  ) -> Result<Vec<Detection>, Self::Error>;

  fn deinit(&mut self, handle: Self::Handle);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

impl Detection {
  pub fn area(&self) -> f32 {
    (self.bbox[2] - self.bbox[0]).max(0.0) * (self.bbox[3] - self.bbox[1]).max(0.0)
  }
}

#[cfg(feature = "luma_detector")]
pub mod luma;
#[cfg(feature = "luma_detector")]
pub use self::luma::{LumaDetector, LumaDetectorError, LumaHandle};
