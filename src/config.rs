// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 检测器配置
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
use tracing::debug;
use url::Url;

use crate::{FromUrl, backend::Backend, frame::Rotation, url_location};

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("模型路径为空")]
  EmptyModel,
  #[error("模型路径解码失败: {0}")]
  ModelPathDecode(String),
  #[error("参数 {key} 无效: {value}")]
  InvalidParam { key: String, value: String },
  #[error("阈值 {0} 超出范围 [0, 1]: {1}")]
  ThresholdOutOfRange(&'static str, f32),
  #[error("输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
}

/// 相机开始预览时上报的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraParams {
  pub width: u32,
  pub height: u32,
  pub rotation: Rotation,
}

/// 检测器配置模板，不含后端
///
/// 每次启动或切换后端时由它生成一份新的 [`DetectorConfig`]。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
  model: String,
  input_size: Option<(u32, u32)>,
  score_threshold: f32,
  iou_threshold: f32,
  num_threads: Option<usize>,
}

impl DetectorSettings {
  pub fn new(model: impl Into<String>) -> Result<Self, ConfigError> {
    let model = model.into();
    if model.is_empty() {
      return Err(ConfigError::EmptyModel);
    }
    Ok(Self {
      model,
      input_size: None,
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      num_threads: None,
    })
  }

  pub fn input_size(mut self, width: u32, height: u32) -> Result<Self, ConfigError> {
    if width == 0 || height == 0 {
      return Err(ConfigError::InvalidInputSize(width, height));
    }
    self.input_size = Some((width, height));
    Ok(self)
  }

  pub fn score_threshold(mut self, threshold: f32) -> Result<Self, ConfigError> {
    self.score_threshold = check_threshold("score", threshold)?;
    Ok(self)
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Result<Self, ConfigError> {
    self.iou_threshold = check_threshold("iou", threshold)?;
    Ok(self)
  }

  pub fn num_threads(mut self, threads: Option<usize>) -> Self {
    self.num_threads = threads.filter(|&n| n > 0);
    self
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  /// 生成交给 `Detector::init` 的配置；未指定输入尺寸时沿用相机帧尺寸
  pub fn build(&self, backend: Backend, camera: &CameraParams) -> DetectorConfig {
    let (input_width, input_height) = self.input_size.unwrap_or((camera.width, camera.height));
    DetectorConfig {
      model: self.model.clone(),
      input_width,
      input_height,
      score_threshold: self.score_threshold,
      iou_threshold: self.iou_threshold,
      num_threads: self.num_threads,
      backend,
    }
  }
}

fn check_threshold(name: &'static str, value: f32) -> Result<f32, ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(ConfigError::ThresholdOutOfRange(name, value))
  }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.parse().map_err(|_| ConfigError::InvalidParam {
    key: key.to_string(),
    value: value.to_string(),
  })
}

impl FromUrl for DetectorSettings {
  type Error = ConfigError;

  /// `<scheme>://<模型路径>?width=640&height=448&score=0.7&iou=0.3&threads=4`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let model = url_location(url).map_err(|e| ConfigError::ModelPathDecode(e.to_string()))?;
    let mut settings = DetectorSettings::new(model)?;

    let mut width = None;
    let mut height = None;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "width" => width = Some(parse_param::<u32>(&key, &value)?),
        "height" => height = Some(parse_param::<u32>(&key, &value)?),
        "score" => settings = settings.score_threshold(parse_param(&key, &value)?)?,
        "iou" => settings = settings.iou_threshold(parse_param(&key, &value)?)?,
        "threads" => {
          // 与原生接口一致，-1 表示自动
          let threads: i64 = parse_param(&key, &value)?;
          settings = settings.num_threads(usize::try_from(threads).ok());
        }
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }

    match (width, height) {
      (Some(w), Some(h)) => settings.input_size(w, h),
      (None, None) => Ok(settings),
      (w, h) => Err(ConfigError::InvalidInputSize(
        w.unwrap_or_default(),
        h.unwrap_or_default(),
      )),
    }
  }
}

/// 一次 `Detector::init` 使用的不可变配置
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  model: String,
  input_width: u32,
  input_height: u32,
  score_threshold: f32,
  iou_threshold: f32,
  num_threads: Option<usize>,
  backend: Backend,
}

impl DetectorConfig {
  pub fn model(&self) -> &str {
    &self.model
  }

  pub fn input_width(&self) -> u32 {
    self.input_width
  }

  pub fn input_height(&self) -> u32 {
    self.input_height
  }

  pub fn score_threshold(&self) -> f32 {
    self.score_threshold
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  pub fn num_threads(&self) -> Option<usize> {
    self.num_threads
  }

  pub fn backend(&self) -> Backend {
    self.backend
  }

  /// 相同尺寸与阈值、不同后端的新配置
  pub fn with_backend(&self, backend: Backend) -> Self {
    Self {
      backend,
      ..self.clone()
    }
  }
}
