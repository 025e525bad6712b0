// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 流式推理流水线
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

use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  backend::{Backend, BackendSelector},
  config::{CameraParams, DetectorConfig, DetectorSettings},
  detector::Detector,
  fps::{FpsError, FpsMeter},
  frame::Frame,
  output::{Renderer, StatusLine},
};

pub const DETECT_SPAN: &str = "detect";

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("检测器初始化失败 (后端 {backend}): {source}")]
  Init {
    backend: Backend,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Stopped,
  Running,
  /// 运行中且有一个与当前后端不同的选择等待下一帧生效，重新初始化期间也处于此状态
  SwitchPending,
  Error,
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineState::Stopped => "stopped",
      PipelineState::Running => "running",
      PipelineState::SwitchPending => "switch-pending",
      PipelineState::Error => "error",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
  Stopped,
  Error,
}

/// 单帧处理结果，仅供调用方观察
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
  Processed { detections: usize },
  Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
  pub processed: u64,
  pub dropped: u64,
  pub reinits: u64,
  pub init_failures: u64,
  pub detect_failures: u64,
}

/// 流式推理流水线
///
/// 由相机回调线程独占：检测器句柄只在这个线程上创建、使用和释放。
/// 后端切换请求经 [`BackendSelector`] 从其他线程传入，在下一帧处理前内联完成
/// 重新初始化，因此任何一帧都不会在与用户最新选择不一致的后端上运行。
pub struct StreamingPipeline<D: Detector, R: Renderer> {
  detector: D,
  renderer: R,
  settings: DetectorSettings,
  selector: Arc<BackendSelector>,
  state: PipelineState,
  handle: Option<D::Handle>,
  config: Option<DetectorConfig>,
  fps: FpsMeter,
  stats: PipelineStats,
}

impl<D: Detector, R: Renderer> StreamingPipeline<D, R> {
  pub fn new(
    detector: D,
    renderer: R,
    settings: DetectorSettings,
    selector: Arc<BackendSelector>,
  ) -> Self {
    Self {
      detector,
      renderer,
      settings,
      selector,
      state: PipelineState::Stopped,
      handle: None,
      config: None,
      fps: FpsMeter::default(),
      stats: PipelineStats::default(),
    }
  }

  pub fn state(&self) -> PipelineState {
    match (self.state, self.selector.peek_pending()) {
      (PipelineState::Running, Some(backend)) if self.active_backend() != Some(backend) => {
        PipelineState::SwitchPending
      }
      (state, _) => state,
    }
  }

  pub fn stats(&self) -> PipelineStats {
    self.stats
  }

  pub fn config(&self) -> Option<&DetectorConfig> {
    self.config.as_ref()
  }

  /// 仅在持有有效句柄时返回
  pub fn active_backend(&self) -> Option<Backend> {
    self
      .handle
      .as_ref()
      .and(self.config.as_ref())
      .map(DetectorConfig::backend)
  }

  pub fn fps(&self) -> f64 {
    self.fps.fps(DETECT_SPAN)
  }

  pub fn selector(&self) -> &Arc<BackendSelector> {
    &self.selector
  }

  pub fn detector(&self) -> &D {
    &self.detector
  }

  pub fn renderer(&self) -> &R {
    &self.renderer
  }

  pub fn renderer_mut(&mut self) -> &mut R {
    &mut self.renderer
  }

  /// 相机开始预览。失败时进入 `Error`，之后可再次调用或等待新的后端选择
  pub fn start(&mut self, camera: CameraParams) -> Result<(), PipelineError> {
    if self.handle.is_some() {
      info!("流水线重新启动，先释放当前检测器");
      self.release_handle();
    }
    let backend = self
      .selector
      .consume_pending()
      .unwrap_or_else(|| self.selector.requested());
    info!(
      "启动流水线: 相机 {}x{} 旋转 {}°, 后端 {}",
      camera.width,
      camera.height,
      camera.rotation.degrees(),
      backend
    );
    let config = self.settings.build(backend, &camera);
    self.initialize(config)
  }

  /// 相机回调入口，每帧调用一次，不会返回错误也不会 panic
  pub fn on_frame(&mut self, frame: &Frame<'_>) -> FrameOutcome {
    if self.state == PipelineState::Stopped {
      return self.drop_frame(DropReason::Stopped);
    }

    if let Some(backend) = self.selector.consume_pending() {
      self.switch_backend(backend);
    }

    if self.state != PipelineState::Running {
      return self.drop_frame(DropReason::Error);
    }
    self.process(frame)
  }

  /// 释放检测器并进入 `Stopped`，重复调用无副作用
  pub fn stop(&mut self) {
    if self.state == PipelineState::Stopped && self.handle.is_none() {
      return;
    }
    self.release_handle();
    self.config = None;
    self.fps.reset();
    self.state = PipelineState::Stopped;
    info!("流水线已停止，共处理 {} 帧", self.stats.processed);
  }

  fn drop_frame(&mut self, reason: DropReason) -> FrameOutcome {
    self.stats.dropped += 1;
    debug!("丢弃帧: 流水线状态 {}", self.state);
    FrameOutcome::Dropped(reason)
  }

  fn switch_backend(&mut self, backend: Backend) {
    if self.state == PipelineState::Running && self.active_backend() == Some(backend) {
      debug!("后端 {} 已在使用中，忽略切换请求", backend);
      return;
    }

    let Some(config) = self.config.as_ref().map(|c| c.with_backend(backend)) else {
      error!("没有可用的检测器配置，无法切换到 {}", backend);
      self.state = PipelineState::Error;
      return;
    };

    info!("切换后端: {:?} -> {}", self.active_backend(), backend);
    self.state = PipelineState::SwitchPending;
    self.release_handle();
    if self.initialize(config).is_ok() {
      self.stats.reinits += 1;
    }
  }

  fn initialize(&mut self, config: DetectorConfig) -> Result<(), PipelineError> {
    debug_assert!(self.handle.is_none());
    let backend = config.backend();
    let result = self.detector.init(&config);
    self.config = Some(config);
    match result {
      Ok(handle) => {
        self.handle = Some(handle);
        self.state = PipelineState::Running;
        self.fps.reset();
        info!("检测器已在后端 {} 上初始化", backend);
        Ok(())
      }
      Err(e) => {
        self.state = PipelineState::Error;
        self.stats.init_failures += 1;
        error!("检测器在后端 {} 上初始化失败: {}", backend, e);
        let status = StatusLine::InitFailed {
          backend,
          reason: e.to_string(),
        };
        if let Err(render_err) = self.renderer.set_status_text(&status.to_string()) {
          warn!("状态栏更新失败: {}", render_err);
        }
        Err(PipelineError::Init {
          backend,
          source: Box::new(e),
        })
      }
    }
  }

  fn process(&mut self, frame: &Frame<'_>) -> FrameOutcome {
    let Some(handle) = self.handle.as_mut() else {
      error!("流水线处于运行状态但没有检测器句柄");
      self.state = PipelineState::Error;
      return self.drop_frame(DropReason::Error);
    };

    if let Err(e) = self.fps.begin(DETECT_SPAN) {
      timing_violation(e);
    }
    let result = self.detector.detect(handle, frame);
    if let Err(e) = self.fps.end(DETECT_SPAN) {
      timing_violation(e);
    }

    let detections = result.unwrap_or_else(|e| {
      warn!("单帧检测失败，输出空结果: {}", e);
      self.stats.detect_failures += 1;
      Vec::new()
    });

    let (overlay_width, overlay_height) = frame.display_size();
    if let Err(e) = self
      .renderer
      .render(&detections, overlay_width, overlay_height)
    {
      warn!("渲染失败: {}", e);
    }

    let status = StatusLine::Running {
      objects: detections.len(),
      backend: self.active_backend().unwrap_or_default(),
      fps: self.fps.fps(DETECT_SPAN),
    };
    if let Err(e) = self.renderer.set_status_text(&status.to_string()) {
      warn!("状态栏更新失败: {}", e);
    }

    self.stats.processed += 1;
    FrameOutcome::Processed {
      detections: detections.len(),
    }
  }

  fn release_handle(&mut self) {
    if let Some(handle) = self.handle.take() {
      self.detector.deinit(handle);
      debug!("检测器句柄已释放");
    }
  }
}

impl<D: Detector, R: Renderer> Drop for StreamingPipeline<D, R> {
  fn drop(&mut self) {
    self.release_handle();
  }
}

fn timing_violation(err: FpsError) {
  error!("计时状态异常: {}", err);
  if cfg!(debug_assertions) {
    panic!("计时状态异常: {}", err);
  }
}
