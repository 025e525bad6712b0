// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detector/luma.rs - 基于亮度的参考检测器
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

use image::{
  GrayImage, Luma,
  imageops::{self, FilterType},
};
use imageproc::region_labelling::{Connectivity, connected_components};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  backend::Backend,
  config::DetectorConfig,
  detector::{Detection, Detector},
  frame::Frame,
};

const MAX_DETECTIONS: usize = 32;
const MIN_REGION_PIXELS: u32 = 4;
const BRIGHT_CLASS_ID: u32 = 0;

#[derive(Error, Debug)]
pub enum LumaDetectorError {
  #[error("亮度检测器不支持后端: {0}")]
  UnsupportedBackend(Backend),
  #[error("亮度平面与帧尺寸不符: {0}x{1}")]
  BadLumaPlane(u32, u32),
}

/// 仅运行在 CPU 上的亮区检测器
///
/// 把亮度平面缩放到输入尺寸，以 `score_threshold * 255` 二值化，
/// 按 8 连通域输出边界框，分数为区域平均亮度。
#[derive(Debug, Default)]
pub struct LumaDetector {
  live_handles: usize,
}

#[derive(Debug)]
pub struct LumaHandle {
  input_width: u32,
  input_height: u32,
  threshold: u8,
  score_threshold: f32,
  iou_threshold: f32,
  frames: u64,
}

#[derive(Debug, Clone, Copy)]
struct Region {
  x_min: u32,
  y_min: u32,
  x_max: u32,
  y_max: u32,
  pixels: u32,
  luma_sum: u64,
}

impl LumaDetector {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn live_handles(&self) -> usize {
    self.live_handles
  }

  fn regions(binary: &GrayImage, gray: &GrayImage) -> Vec<Region> {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
    let mut regions: HashMap<u32, Region> = HashMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
      let label = label[0];
      if label == 0 {
        continue;
      }
      let luma = gray.get_pixel(x, y)[0] as u64;
      regions
        .entry(label)
        .and_modify(|r| {
          r.x_min = r.x_min.min(x);
          r.y_min = r.y_min.min(y);
          r.x_max = r.x_max.max(x);
          r.y_max = r.y_max.max(y);
          r.pixels += 1;
          r.luma_sum += luma;
        })
        .or_insert(Region {
          x_min: x,
          y_min: y,
          x_max: x,
          y_max: y,
          pixels: 1,
          luma_sum: luma,
        });
    }
    regions.into_values().collect()
  }

  fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut result: Vec<Detection> = Vec::new();
    for det in detections {
      if result.iter().all(|kept| iou(kept, &det) < iou_threshold) {
        result.push(det);
      }
      if result.len() == MAX_DETECTIONS {
        break;
      }
    }
    result
  }
}

fn iou(a: &Detection, b: &Detection) -> f32 {
  let x1 = a.bbox[0].max(b.bbox[0]);
  let y1 = a.bbox[1].max(b.bbox[1]);
  let x2 = a.bbox[2].min(b.bbox[2]);
  let y2 = a.bbox[3].min(b.bbox[3]);
  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;
  if union > 0.0 { intersection / union } else { 0.0 }
}

impl Detector for LumaDetector {
  type Handle = LumaHandle;
  type Error = LumaDetectorError;

  fn init(&mut self, config: &DetectorConfig) -> Result<Self::Handle, Self::Error> {
    if config.backend() != Backend::Cpu {
      return Err(LumaDetectorError::UnsupportedBackend(config.backend()));
    }
    info!(
      "初始化亮度检测器: 模型 {}, 输入 {}x{}, 阈值 {:.2}",
      config.model(),
      config.input_width(),
      config.input_height(),
      config.score_threshold()
    );
    self.live_handles += 1;
    Ok(LumaHandle {
      input_width: config.input_width(),
      input_height: config.input_height(),
      threshold: (config.score_threshold() * 255.0).round() as u8,
      score_threshold: config.score_threshold(),
      iou_threshold: config.iou_threshold(),
      frames: 0,
    })
  }

  fn detect(
    &mut self,
    handle: &mut Self::Handle,
    frame: &Frame<'_>,
  ) -> Result<Vec<Detection>, Self::Error> {
    let (width, height) = (frame.width(), frame.height());
    let gray = GrayImage::from_raw(width, height, frame.luma().into_owned())
      .ok_or(LumaDetectorError::BadLumaPlane(width, height))?;
    let gray = if (width, height) == (handle.input_width, handle.input_height) {
      gray
    } else {
      imageops::resize(
        &gray,
        handle.input_width,
        handle.input_height,
        FilterType::Nearest,
      )
    };

    let threshold = handle.threshold;
    let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
      if gray.get_pixel(x, y)[0] >= threshold {
        Luma([255u8])
      } else {
        Luma([0u8])
      }
    });

    let scale_x = width as f32 / handle.input_width as f32;
    let scale_y = height as f32 / handle.input_height as f32;
    let detections = Self::regions(&binary, &gray)
      .into_iter()
      .filter(|r| r.pixels >= MIN_REGION_PIXELS)
      .map(|r| {
        let bbox = [
          r.x_min as f32 * scale_x,
          r.y_min as f32 * scale_y,
          (r.x_max + 1) as f32 * scale_x,
          (r.y_max + 1) as f32 * scale_y,
        ];
        Detection {
          class_id: BRIGHT_CLASS_ID,
          score: r.luma_sum as f32 / (r.pixels as f32 * 255.0),
          bbox: frame.rotation().map_bbox(bbox, width, height),
        }
      })
      // 二值化阈值经过取整，区域均值仍可能略低于分数阈值
      .filter(|det| det.score >= handle.score_threshold)
      .collect();

    handle.frames += 1;
    let detections = Self::nms(detections, handle.iou_threshold);
    debug!(
      "第 {} 帧检测到 {} 个亮区",
      handle.frames,
      detections.len()
    );
    Ok(detections)
  }

  fn deinit(&mut self, handle: Self::Handle) {
    self.live_handles = self.live_handles.saturating_sub(1);
    info!("释放亮度检测器，共处理 {} 帧", handle.frames);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::{CameraParams, DetectorSettings},
    frame::{PixelFormat, Rotation},
  };

  fn config(backend: Backend, width: u32, height: u32) -> DetectorConfig {
    DetectorSettings::new("luma")
      .unwrap()
      .score_threshold(0.5)
      .unwrap()
      .build(
        backend,
        &CameraParams {
          width,
          height,
          rotation: Rotation::Deg0,
        },
      )
  }

  fn gray_with_block(width: u32, height: u32, x: u32, y: u32, size: u32, value: u8) -> Vec<u8> {
    let mut data = vec![10u8; (width * height) as usize];
    for row in y..y + size {
      for col in x..x + size {
        data[(row * width + col) as usize] = value;
      }
    }
    data
  }

  #[test]
  fn accelerators_are_rejected() {
    let mut detector = LumaDetector::new();
    assert!(matches!(
      detector.init(&config(Backend::Gpu, 8, 8)),
      Err(LumaDetectorError::UnsupportedBackend(Backend::Gpu))
    ));
    assert_eq!(detector.live_handles(), 0);
  }

  #[test]
  fn finds_bright_block() {
    let mut detector = LumaDetector::new();
    let mut handle = detector.init(&config(Backend::Cpu, 8, 8)).unwrap();
    let data = gray_with_block(8, 8, 2, 4, 2, 204);

    let frame = Frame::new(&data, 8, 8, PixelFormat::Gray8, Rotation::Deg0).unwrap();
    let detections = detector.detect(&mut handle, &frame).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].bbox, [2.0, 4.0, 4.0, 6.0]);
    assert!((detections[0].score - 0.8).abs() < 1e-6);

    let frame = Frame::new(&data, 8, 8, PixelFormat::Gray8, Rotation::Deg90).unwrap();
    let detections = detector.detect(&mut handle, &frame).unwrap();
    assert_eq!(detections[0].bbox, [2.0, 2.0, 4.0, 4.0]);

    detector.deinit(handle);
    assert_eq!(detector.live_handles(), 0);
  }

  #[test]
  fn small_and_dark_regions_are_ignored() {
    let mut detector = LumaDetector::new();
    let mut handle = detector.init(&config(Backend::Cpu, 8, 8)).unwrap();
    let mut data = gray_with_block(8, 8, 0, 0, 3, 100);
    data[63] = 255;
    let frame = Frame::new(&data, 8, 8, PixelFormat::Gray8, Rotation::Deg0).unwrap();
    assert!(detector.detect(&mut handle, &frame).unwrap().is_empty());
    detector.deinit(handle);
  }

  #[test]
  fn boxes_scale_back_to_frame_size() {
    let mut detector = LumaDetector::new();
    let config = DetectorSettings::new("luma")
      .unwrap()
      .input_size(8, 8)
      .unwrap()
      .score_threshold(0.5)
      .unwrap()
      .build(
        Backend::Cpu,
        &CameraParams {
          width: 16,
          height: 16,
          rotation: Rotation::Deg0,
        },
      );
    let mut handle = detector.init(&config).unwrap();
    let data = gray_with_block(16, 16, 4, 8, 4, 255);
    let frame = Frame::new(&data, 16, 16, PixelFormat::Gray8, Rotation::Deg0).unwrap();
    let detections = detector.detect(&mut handle, &frame).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].bbox, [4.0, 8.0, 8.0, 12.0]);
    detector.deinit(handle);
  }

  #[test]
  fn regions_below_score_threshold_are_dropped() {
    let mut detector = LumaDetector::new();
    let config = DetectorSettings::new("luma")
      .unwrap()
      .score_threshold(0.33)
      .unwrap()
      .build(
        Backend::Cpu,
        &CameraParams {
          width: 8,
          height: 8,
          rotation: Rotation::Deg0,
        },
      );
    let mut handle = detector.init(&config).unwrap();

    // 84 / 255 < 0.33，但 round(0.33 * 255) == 84
    let data = gray_with_block(8, 8, 2, 2, 3, 84);
    let frame = Frame::new(&data, 8, 8, PixelFormat::Gray8, Rotation::Deg0).unwrap();
    assert!(detector.detect(&mut handle, &frame).unwrap().is_empty());

    let data = gray_with_block(8, 8, 2, 2, 3, 85);
    let frame = Frame::new(&data, 8, 8, PixelFormat::Gray8, Rotation::Deg0).unwrap();
    let detections = detector.detect(&mut handle, &frame).unwrap();
    assert_eq!(detections.len(), 1);
    assert!(detections[0].score >= 0.33);
    detector.deinit(handle);
  }
}
