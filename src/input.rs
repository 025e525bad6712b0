// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 相机输入
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

use crate::{FromUrl, config::CameraParams, frame::Frame};

/// 帧来源
///
/// 返回的帧借用来源内部的缓冲区，在下一次调用前必须释放。
pub trait CameraSource {
  type Error: std::error::Error + Send + Sync + 'static;

  fn params(&self) -> CameraParams;

  fn next_frame(&mut self) -> Option<Result<Frame<'_>, Self::Error>>;
}

#[cfg(feature = "read_image_file")]
mod image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_file::{ImageFileCamera, ImageFileCameraError};

#[cfg(feature = "v4l_input")]
mod v4l_camera;
#[cfg(feature = "v4l_input")]
pub use self::v4l_camera::{V4lCamera, V4lCameraError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileCameraError(#[from] ImageFileCameraError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L input error: {0}")]
  V4lCameraError(#[from] V4lCameraError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileCamera),
  #[cfg(feature = "v4l_input")]
  V4l(V4lCamera),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileCamera::SCHEME {
        return Ok(InputWrapper::ImageFile(ImageFileCamera::from_url(url)?));
      }
    }
    #[cfg(feature = "v4l_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == V4lCamera::SCHEME {
        return Ok(InputWrapper::V4l(V4lCamera::from_url(url)?));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl CameraSource for InputWrapper {
  type Error = InputError;

  fn params(&self) -> CameraParams {
    match *self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(ref input) => input.params(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(ref input) => input.params(),
    }
  }

  fn next_frame(&mut self) -> Option<Result<Frame<'_>, Self::Error>> {
    // 解引用匹配，未启用任何输入特性时枚举为空
    match *self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(ref mut input) => {
        input.next_frame().map(|r| r.map_err(InputError::from))
      }
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(ref mut input) => input.next_frame().map(|r| r.map_err(InputError::from)),
    }
  }
}
