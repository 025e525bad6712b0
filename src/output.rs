// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, backend::Backend, detector::Detection};

/// 检测结果的消费者
pub trait Renderer {
  type Error: std::error::Error;

  /// `overlay_width`/`overlay_height` 为检测框所在的显示坐标系尺寸
  fn render(
    &mut self,
    detections: &[Detection],
    overlay_width: u32,
    overlay_height: u32,
  ) -> Result<(), Self::Error>;

  fn set_status_text(&mut self, text: &str) -> Result<(), Self::Error>;
}

/// 状态栏文字：目标数、后端与帧率，或初始化失败原因
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
  Running {
    objects: usize,
    backend: Backend,
    fps: f64,
  },
  InitFailed {
    backend: Backend,
    reason: String,
  },
}

impl fmt::Display for StatusLine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StatusLine::Running {
        objects,
        backend,
        fps,
      } => write!(
        f,
        "object count: {}\ndevice: {}\nfps: {:.02}",
        objects, backend, fps
      ),
      StatusLine::InitFailed { backend, reason } => {
        write!(f, "device: {}\ninit failed: {}", backend, reason)
      }
    }
  }
}

mod tracing_render;
pub use self::tracing_render::TracingRenderer;

#[cfg(feature = "record_output")]
mod record;
#[cfg(feature = "record_output")]
pub use self::record::{RecordRenderer, RecordRendererError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "record_output")]
  #[error("记录输出错误: {0}")]
  RecordRendererError(#[from] RecordRendererError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Tracing(TracingRenderer),
  #[cfg(feature = "record_output")]
  Record(RecordRenderer),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      TracingRenderer::SCHEME => {
        let Ok(output) = TracingRenderer::from_url(url);
        Ok(OutputWrapper::Tracing(output))
      }
      #[cfg(feature = "record_output")]
      RecordRenderer::SCHEME => Ok(OutputWrapper::Record(RecordRenderer::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Renderer for OutputWrapper {
  type Error = OutputError;

  fn render(
    &mut self,
    detections: &[Detection],
    overlay_width: u32,
    overlay_height: u32,
  ) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Tracing(output) => output
        .render(detections, overlay_width, overlay_height)
        .map_err(|never| -> OutputError { match never {} }),
      #[cfg(feature = "record_output")]
      OutputWrapper::Record(output) => output
        .render(detections, overlay_width, overlay_height)
        .map_err(OutputError::from),
    }
  }

  fn set_status_text(&mut self, text: &str) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Tracing(output) => output
        .set_status_text(text)
        .map_err(|never| -> OutputError { match never {} }),
      #[cfg(feature = "record_output")]
      OutputWrapper::Record(output) => output.set_status_text(text).map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_line_format() {
    let line = StatusLine::Running {
      objects: 3,
      backend: Backend::Gpu,
      fps: 30.0,
    };
    assert_eq!(line.to_string(), "object count: 3\ndevice: gpu\nfps: 30.00");

    let line = StatusLine::InitFailed {
      backend: Backend::Npu,
      reason: "no driver".to_string(),
    };
    assert_eq!(line.to_string(), "device: npu\ninit failed: no driver");
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://127.0.0.1/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
    let url = Url::parse("log://").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::Tracing(_))
    ));
  }

  #[test]
  fn tracing_output_accepts_every_frame() {
    let url = Url::parse("log://").unwrap();
    let mut output = OutputWrapper::from_url(&url).unwrap();
    let detection = Detection {
      class_id: 0,
      score: 0.9,
      bbox: [0.0, 0.0, 4.0, 4.0],
    };
    assert!(output.render(&[detection], 480, 640).is_ok());
    assert!(output.set_status_text("object count: 1").is_ok());
  }
}
