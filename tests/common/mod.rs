// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/common/mod.rs - 测试用检测器与渲染器
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

#![allow(dead_code)]

use std::{cell::RefCell, collections::HashSet, rc::Rc, sync::Arc};

use shanan_stream::{
  backend::{Backend, BackendSelector, DeviceCapabilities},
  config::{CameraParams, DetectorConfig, DetectorSettings},
  detector::{Detection, Detector},
  frame::{Frame, PixelFormat, Rotation},
  output::Renderer,
  pipeline::StreamingPipeline,
};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("mock failure: {0}")]
pub struct MockError(pub String);

#[derive(Debug, Default)]
pub struct DetectorLog {
  pub inits: usize,
  pub init_attempts: usize,
  pub deinits: usize,
  pub detects: usize,
  pub live: HashSet<u64>,
  pub init_backends: Vec<Backend>,
  pub detect_backends: Vec<Backend>,
  pub fail_backends: Vec<Backend>,
  pub fail_detect_calls: Vec<usize>,
}

#[derive(Debug)]
pub struct MockHandle {
  id: u64,
  backend: Backend,
}

/// 记录每次调用的检测器，每帧输出一个固定目标
#[derive(Debug, Clone, Default)]
pub struct MockDetector {
  pub log: Rc<RefCell<DetectorLog>>,
  next_id: u64,
}

impl MockDetector {
  pub fn failing_on(backends: &[Backend]) -> Self {
    let detector = Self::default();
    detector.log.borrow_mut().fail_backends = backends.to_vec();
    detector
  }
}

impl Detector for MockDetector {
  type Handle = MockHandle;
  type Error = MockError;

  fn init(&mut self, config: &DetectorConfig) -> Result<Self::Handle, Self::Error> {
    let mut log = self.log.borrow_mut();
    log.init_attempts += 1;
    if log.fail_backends.contains(&config.backend()) {
      return Err(MockError(format!("{} unavailable", config.backend())));
    }
    self.next_id += 1;
    log.inits += 1;
    log.live.insert(self.next_id);
    log.init_backends.push(config.backend());
    Ok(MockHandle {
      id: self.next_id,
      backend: config.backend(),
    })
  }

  fn detect(
    &mut self,
    handle: &mut Self::Handle,
    _frame: &Frame<'_>,
  ) -> Result<Vec<Detection>, Self::Error> {
    let mut log = self.log.borrow_mut();
    assert!(log.live.contains(&handle.id), "detect on released handle");
    log.detects += 1;
    log.detect_backends.push(handle.backend);
    if log.fail_detect_calls.contains(&log.detects) {
      return Err(MockError("bad frame".to_string()));
    }
    Ok(vec![Detection {
      class_id: 1,
      score: 0.9,
      bbox: [0.0, 0.0, 1.0, 1.0],
    }])
  }

  fn deinit(&mut self, handle: Self::Handle) {
    let mut log = self.log.borrow_mut();
    assert!(log.live.remove(&handle.id), "double deinit");
    log.deinits += 1;
  }
}

#[derive(Debug, Default)]
pub struct MockRenderer {
  pub renders: Vec<(usize, u32, u32)>,
  pub statuses: Vec<String>,
}

impl Renderer for MockRenderer {
  type Error = MockError;

  fn render(
    &mut self,
    detections: &[Detection],
    overlay_width: u32,
    overlay_height: u32,
  ) -> Result<(), Self::Error> {
    self
      .renders
      .push((detections.len(), overlay_width, overlay_height));
    Ok(())
  }

  fn set_status_text(&mut self, text: &str) -> Result<(), Self::Error> {
    self.statuses.push(text.to_string());
    Ok(())
  }
}

pub const CAMERA: CameraParams = CameraParams {
  width: 640,
  height: 480,
  rotation: Rotation::Deg90,
};

pub fn all_devices() -> Arc<BackendSelector> {
  Arc::new(BackendSelector::new(DeviceCapabilities {
    gpu: true,
    npu: true,
  }))
}

pub fn pipeline(
  detector: MockDetector,
  selector: Arc<BackendSelector>,
) -> StreamingPipeline<MockDetector, MockRenderer> {
  let settings = DetectorSettings::new("yolov5s.tnnproto")
    .unwrap()
    .input_size(640, 448)
    .unwrap();
  StreamingPipeline::new(detector, MockRenderer::default(), settings, selector)
}

pub fn nv21_buffer() -> Vec<u8> {
  vec![0u8; PixelFormat::Nv21.buffer_len(CAMERA.width, CAMERA.height)]
}

pub fn frame(data: &[u8]) -> Frame<'_> {
  Frame::new(
    data,
    CAMERA.width,
    CAMERA.height,
    PixelFormat::Nv21,
    CAMERA.rotation,
  )
  .unwrap()
}
