// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/record.rs - 检测结果记录输出
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
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, detector::Detection, output::Renderer, url_location,
};

#[derive(Error, Debug)]
pub enum RecordRendererError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("记录文件路径为空")]
  EmptyPath,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每渲染一帧追加一行 JSON
///
/// `record:///tmp/detections.jsonl`，带 `?truncate` 时覆盖已有文件。
pub struct RecordRenderer {
  path: PathBuf,
  writer: BufWriter<File>,
  status: String,
  frame_id: u64,
}

impl FromUrlWithScheme for RecordRenderer {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordRenderer {
  type Error = RecordRendererError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordRendererError::SchemeMismatch);
    }
    let path = url_location(url).map_err(|_| RecordRendererError::EmptyPath)?;
    if path.is_empty() {
      return Err(RecordRendererError::EmptyPath);
    }
    let truncate = url.query_pairs().any(|(k, _)| k == "truncate");
    Self::open(path, truncate)
  }
}

impl RecordRenderer {
  pub fn open(path: impl AsRef<Path>, truncate: bool) -> Result<Self, RecordRendererError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .append(!truncate)
      .truncate(truncate)
      .open(&path)?;
    info!("检测结果记录到: {}", path.display());
    Ok(Self {
      path,
      writer: BufWriter::new(file),
      status: String::new(),
      frame_id: 0,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn flush(&mut self) -> Result<(), RecordRendererError> {
    self.writer.flush()?;
    Ok(())
  }
}

impl Renderer for RecordRenderer {
  type Error = RecordRendererError;

  fn render(
    &mut self,
    detections: &[Detection],
    overlay_width: u32,
    overlay_height: u32,
  ) -> Result<(), Self::Error> {
    self.frame_id += 1;
    let items: Vec<_> = detections
      .iter()
      .map(|det| {
        json!({
          "class_id": det.class_id,
          "score": det.score,
          "bbox": det.bbox,
        })
      })
      .collect();
    let record = json!({
      "frame": self.frame_id,
      "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      "overlay": [overlay_width, overlay_height],
      "status": self.status,
      "detections": items,
    });
    serde_json::to_writer(&mut self.writer, &record)?;
    self.writer.write_all(b"\n")?;
    Ok(())
  }

  fn set_status_text(&mut self, text: &str) -> Result<(), Self::Error> {
    self.status = text.to_string();
    Ok(())
  }
}

impl Drop for RecordRenderer {
  fn drop(&mut self) {
    let _ = self.writer.flush();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_one_line_per_frame() {
    let path = std::env::temp_dir().join(format!("shanan-record-{}.jsonl", std::process::id()));
    let url = Url::parse(&format!("record://{}?truncate", path.display())).unwrap();
    let mut output = RecordRenderer::from_url(&url).unwrap();
    assert_eq!(output.path(), path.as_path());

    output.set_status_text("object count: 1").unwrap();
    output
      .render(
        &[Detection {
          class_id: 2,
          score: 0.5,
          bbox: [1.0, 2.0, 3.0, 4.0],
        }],
        480,
        640,
      )
      .unwrap();
    output.render(&[], 480, 640).unwrap();
    output.flush().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = content
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["frame"], 1);
    assert_eq!(lines[0]["status"], "object count: 1");
    assert_eq!(lines[0]["overlay"], json!([480, 640]));
    assert_eq!(lines[0]["detections"][0]["class_id"], 2);
    assert_eq!(lines[1]["detections"], json!([]));

    drop(output);
    let _ = std::fs::remove_file(&path);
  }

  #[test]
  fn other_schemes_are_rejected() {
    let url = Url::parse("log://").unwrap();
    assert!(matches!(
      RecordRenderer::from_url(&url),
      Err(RecordRendererError::SchemeMismatch)
    ));
    let url = Url::parse("record://").unwrap();
    assert!(matches!(
      RecordRenderer::from_url(&url),
      Err(RecordRendererError::EmptyPath)
    ));
  }
}
