// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_file.rs - 图片文件回放输入
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

use crate::{
  FromUrl, FromUrlWithScheme,
  config::CameraParams,
  frame::{Frame, FrameError, PixelFormat, Rotation},
  input::CameraSource,
  url_location,
};

#[derive(Error, Debug)]
pub enum ImageFileCameraError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Invalid parameter {0}: {1}")]
  InvalidParam(String, String),
  #[error("Image error: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("Frame error: {0}")]
  FrameError(#[from] FrameError),
}

/// 把一张图片当作相机，按指定次数重复交付
///
/// `image:///path/to/picture.png?repeat=100&rotation=90`，省略 `repeat` 时只交付一次，
/// `repeat=0` 表示无限重复。
pub struct ImageFileCamera {
  data: Vec<u8>,
  width: u32,
  height: u32,
  rotation: Rotation,
  remaining: Option<u64>,
}

impl FromUrlWithScheme for ImageFileCamera {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileCamera {
  type Error = ImageFileCameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileCameraError::SchemeMismatch);
    }

    let mut repeat = Some(1u64);
    let mut rotation = Rotation::Deg0;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "repeat" => {
          let n: u64 = v
            .parse()
            .map_err(|_| ImageFileCameraError::InvalidParam(k.to_string(), v.to_string()))?;
          repeat = (n > 0).then_some(n);
        }
        "rotation" => {
          let degrees: u32 = v
            .parse()
            .map_err(|_| ImageFileCameraError::InvalidParam(k.to_string(), v.to_string()))?;
          rotation = Rotation::from_degrees(degrees)?;
        }
        _ => {}
      }
    }

    let path = url_location(url)
      .map_err(|e| ImageFileCameraError::InvalidParam("path".to_string(), e.to_string()))?;
    info!("读取图片: {}", path);
    let image = image::open(&path)?.to_rgb8();
    let (width, height) = image.dimensions();
    Ok(Self::from_rgb(image.into_raw(), width, height, rotation, repeat)?)
  }
}

impl ImageFileCamera {
  /// 直接从 RGB888 数据构造，`repeat` 为 `None` 时无限重复
  pub fn from_rgb(
    data: Vec<u8>,
    width: u32,
    height: u32,
    rotation: Rotation,
    repeat: Option<u64>,
  ) -> Result<Self, FrameError> {
    Frame::new(&data, width, height, PixelFormat::Rgb888, rotation)?;
    Ok(Self {
      data,
      width,
      height,
      rotation,
      remaining: repeat,
    })
  }
}

impl CameraSource for ImageFileCamera {
  type Error = ImageFileCameraError;

  fn params(&self) -> CameraParams {
    CameraParams {
      width: self.width,
      height: self.height,
      rotation: self.rotation,
    }
  }

  fn next_frame(&mut self) -> Option<Result<Frame<'_>, Self::Error>> {
    match self.remaining {
      Some(0) => return None,
      Some(ref mut n) => *n -= 1,
      None => {}
    }
    Some(
      Frame::new(
        &self.data,
        self.width,
        self.height,
        PixelFormat::Rgb888,
        self.rotation,
      )
      .map_err(ImageFileCameraError::from),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn replays_the_same_frame() {
    let mut camera = ImageFileCamera::from_rgb(vec![0u8; 12], 2, 2, Rotation::Deg90, Some(3)).unwrap();
    assert_eq!(
      camera.params(),
      CameraParams {
        width: 2,
        height: 2,
        rotation: Rotation::Deg90
      }
    );
    let mut count = 0;
    while let Some(frame) = camera.next_frame() {
      let frame = frame.unwrap();
      assert_eq!(frame.format(), PixelFormat::Rgb888);
      count += 1;
    }
    assert_eq!(count, 3);
  }

  #[test]
  fn rejects_mismatched_buffer() {
    assert!(ImageFileCamera::from_rgb(vec![0u8; 5], 2, 2, Rotation::Deg0, None).is_err());
  }

  #[test]
  fn loads_png_from_url() {
    let path = std::env::temp_dir().join(format!("shanan-camera-{}.png", std::process::id()));
    image::RgbImage::from_pixel(4, 3, image::Rgb([200, 10, 10]))
      .save(&path)
      .unwrap();
    let url = Url::parse(&format!("image://{}?repeat=2&rotation=270", path.display())).unwrap();
    let mut camera = ImageFileCamera::from_url(&url).unwrap();
    assert_eq!(camera.params().width, 4);
    assert_eq!(camera.params().rotation, Rotation::Deg270);
    assert!(camera.next_frame().is_some());
    assert!(camera.next_frame().is_some());
    assert!(camera.next_frame().is_none());
    let _ = std::fs::remove_file(&path);
  }
}
