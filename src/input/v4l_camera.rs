// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/v4l_camera.rs - V4L 相机输入
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

use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  config::CameraParams,
  frame::{Frame, FrameError, PixelFormat, Rotation},
  input::CameraSource,
};

const V4L_BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lCameraError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid parameter {0}: {1}")]
  InvalidParam(String, String),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
  #[error("Frame error: {0}")]
  FrameError(#[from] FrameError),
}

/// V4L2 相机，协商 YUYV 格式后通过 mmap 缓冲区持续取帧
///
/// `v4l:///dev/video0?width=640&height=480&rotation=0`
pub struct V4lCamera {
  stream: Stream<'static>,
  width: u32,
  height: u32,
  rotation: Rotation,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, V4lCameraError> {
  value
    .parse()
    .map_err(|_| V4lCameraError::InvalidParam(key.to_string(), value.to_string()))
}

impl FromUrl for V4lCamera {
  type Error = V4lCameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lCameraError::SchemaMismatch);
    }

    // v4l:///dev/video0，路径为空时使用默认设备
    let device_path = if url.path().is_empty() || url.path() == "/" {
      "/dev/video0".to_string()
    } else {
      url.path().to_string()
    };

    let mut width = None;
    let mut height = None;
    let mut rotation = Rotation::Deg0;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "width" => width = Some(parse_param::<u32>(&k, &v)?),
        "height" => height = Some(parse_param::<u32>(&k, &v)?),
        "rotation" => rotation = Rotation::from_degrees(parse_param(&k, &v)?)?,
        _ => {}
      }
    }

    let mut device = v4l::Device::with_path(&device_path)?;
    let mut format = device.format()?;
    format.fourcc = FourCC::new(b"YUYV");
    if let Some(width) = width {
      format.width = width;
    }
    if let Some(height) = height {
      format.height = height;
    }
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(V4lCameraError::UnsupportedPixelFormat(
        format.fourcc.to_string(),
      ));
    }
    info!(
      "打开 V4L 设备 {}: {}x{} {}",
      device_path, format.width, format.height, format.fourcc
    );

    let stream = Stream::with_buffers(&mut device, Type::VideoCapture, V4L_BUFFER_COUNT)?;
    Ok(Self {
      stream,
      width: format.width,
      height: format.height,
      rotation,
    })
  }
}

impl CameraSource for V4lCamera {
  type Error = V4lCameraError;

  fn params(&self) -> CameraParams {
    CameraParams {
      width: self.width,
      height: self.height,
      rotation: self.rotation,
    }
  }

  fn next_frame(&mut self) -> Option<Result<Frame<'_>, Self::Error>> {
    let (width, height, rotation) = (self.width, self.height, self.rotation);
    let frame = match self.stream.next() {
      Ok((buf, meta)) => {
        let used = (meta.bytesused as usize).min(buf.len());
        Frame::new(&buf[..used], width, height, PixelFormat::Yuyv, rotation)
          .map_err(V4lCameraError::from)
      }
      Err(e) => Err(V4lCameraError::from(e)),
    };
    Some(frame)
  }
}
