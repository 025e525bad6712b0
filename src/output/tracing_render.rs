// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/tracing_render.rs - 日志输出
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

use std::convert::Infallible;

use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, detector::Detection, output::Renderer};

/// 把检测结果和状态栏写进日志
#[derive(Debug, Default)]
pub struct TracingRenderer {
  last_status: String,
}

impl FromUrlWithScheme for TracingRenderer {
  const SCHEME: &'static str = "log";
}

impl FromUrl for TracingRenderer {
  type Error = Infallible;

  fn from_url(_url: &Url) -> Result<Self, Self::Error> {
    Ok(Self::default())
  }
}

impl Renderer for TracingRenderer {
  type Error = Infallible;

  fn render(
    &mut self,
    detections: &[Detection],
    overlay_width: u32,
    overlay_height: u32,
  ) -> Result<(), Self::Error> {
    debug!(
      "画面 {}x{} 中检测到 {} 个目标",
      overlay_width,
      overlay_height,
      detections.len()
    );
    for det in detections {
      debug!(
        "  - 类别 {}: {:.2}% at ({:.0}, {:.0}, {:.0}, {:.0})",
        det.class_id,
        det.score * 100.0,
        det.bbox[0],
        det.bbox[1],
        det.bbox[2],
        det.bbox[3]
      );
    }
    Ok(())
  }

  fn set_status_text(&mut self, text: &str) -> Result<(), Self::Error> {
    // 帧率每帧都变，只在状态首行变化时提升到 info
    let headline = text.lines().next().unwrap_or_default();
    if self.last_status.lines().next().unwrap_or_default() != headline {
      info!("{}", text.replace('\n', " | "));
    } else {
      debug!("{}", text.replace('\n', " | "));
    }
    self.last_status = text.to_string();
    Ok(())
  }
}
