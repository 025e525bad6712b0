// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 相机帧定义
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

use std::borrow::Cow;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("帧尺寸无效: {0}x{1}")]
  InvalidSize(u32, u32),
  #[error("不支持的旋转角度: {0}")]
  InvalidRotation(u32),
}

/// 相机输出的像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  /// Android 预览默认格式，Y 平面后接交错的 VU 平面
  Nv21,
  /// V4L2 常见的 YUV 4:2:2 打包格式
  Yuyv,
  Rgb888,
  Gray8,
}

impl PixelFormat {
  pub fn buffer_len(self, width: u32, height: u32) -> usize {
    let pixels = width as usize * height as usize;
    match self {
      PixelFormat::Nv21 => {
        let chroma = (width as usize).div_ceil(2) * (height as usize).div_ceil(2) * 2;
        pixels + chroma
      }
      PixelFormat::Yuyv => (width as usize).div_ceil(2) * 4 * height as usize,
      PixelFormat::Rgb888 => pixels * 3,
      PixelFormat::Gray8 => pixels,
    }
  }
}

/// 将传感器原始方向旋转到显示方向所需的顺时针角度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
  #[default]
  Deg0,
  Deg90,
  Deg180,
  Deg270,
}

impl Rotation {
  pub fn from_degrees(degrees: u32) -> Result<Self, FrameError> {
    match degrees % 360 {
      0 => Ok(Rotation::Deg0),
      90 => Ok(Rotation::Deg90),
      180 => Ok(Rotation::Deg180),
      270 => Ok(Rotation::Deg270),
      _ => Err(FrameError::InvalidRotation(degrees)),
    }
  }

  pub fn degrees(self) -> u32 {
    match self {
      Rotation::Deg0 => 0,
      Rotation::Deg90 => 90,
      Rotation::Deg180 => 180,
      Rotation::Deg270 => 270,
    }
  }

  pub fn swaps_axes(self) -> bool {
    matches!(self, Rotation::Deg90 | Rotation::Deg270)
  }

  /// 旋转后的显示尺寸
  pub fn display_size(self, width: u32, height: u32) -> (u32, u32) {
    if self.swaps_axes() {
      (height, width)
    } else {
      (width, height)
    }
  }

  /// 将原始坐标系下的边界框 [x_min, y_min, x_max, y_max] 映射到显示坐标系
  pub fn map_bbox(self, bbox: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let (w, h) = (width as f32, height as f32);
    let map = |x: f32, y: f32| -> (f32, f32) {
      match self {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => (h - y, x),
        Rotation::Deg180 => (w - x, h - y),
        Rotation::Deg270 => (y, w - x),
      }
    };
    let (ax, ay) = map(bbox[0], bbox[1]);
    let (bx, by) = map(bbox[2], bbox[3]);
    [ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)]
  }
}

/// 相机回调交付的一帧
///
/// 缓冲区归相机所有，只在回调期间借用。
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
  data: &'a [u8],
  width: u32,
  height: u32,
  format: PixelFormat,
  rotation: Rotation,
}

impl<'a> Frame<'a> {
  pub fn new(
    data: &'a [u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    rotation: Rotation,
  ) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidSize(width, height));
    }
    let expected = format.buffer_len(width, height);
    if data.len() < expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      data: &data[..expected],
      width,
      height,
      format,
      rotation,
    })
  }

  pub fn data(&self) -> &'a [u8] {
    self.data
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn rotation(&self) -> Rotation {
    self.rotation
  }

  pub fn display_size(&self) -> (u32, u32) {
    self.rotation.display_size(self.width, self.height)
  }

  /// 8 位亮度平面，行优先，尺寸与原始帧一致
  pub fn luma(&self) -> Cow<'a, [u8]> {
    let pixels = self.width as usize * self.height as usize;
    match self.format {
      PixelFormat::Nv21 | PixelFormat::Gray8 => Cow::Borrowed(&self.data[..pixels]),
      PixelFormat::Yuyv => {
        let row_bytes = (self.width as usize).div_ceil(2) * 4;
        let mut luma = Vec::with_capacity(pixels);
        for row in self.data.chunks_exact(row_bytes) {
          luma.extend(row.iter().step_by(2).take(self.width as usize));
        }
        Cow::Owned(luma)
      }
      PixelFormat::Rgb888 => Cow::Owned(
        self
          .data
          .chunks_exact(3)
          .map(|p| {
            // BT.601 整数近似
            ((77 * p[0] as u32 + 150 * p[1] as u32 + 29 * p[2] as u32) >> 8) as u8
          })
          .collect(),
      ),
    }
  }
}
