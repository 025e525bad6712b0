// 该文件是 Shanan （山南西风） 项目的一部分。
// src/fps.rs - 帧率统计
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
  collections::{HashMap, VecDeque},
  time::{Duration, Instant},
};

use thiserror::Error;

pub const DEFAULT_WINDOW: usize = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FpsError {
  #[error("计时区间 {0} 已开始，尚未结束")]
  AlreadyBegun(String),
  #[error("计时区间 {0} 尚未开始")]
  NotBegun(String),
  #[error("计时区间 {0} 的结束时间早于开始时间")]
  EndBeforeBegin(String),
}

/// 单个计时区间的累计统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanStats {
  pub count: u64,
  pub min: Duration,
  pub max: Duration,
  pub avg: Duration,
}

#[derive(Debug, Default)]
struct Span {
  started: Option<Instant>,
  window: VecDeque<Duration>,
  window_sum: Duration,
  count: u64,
  total: Duration,
  min: Duration,
  max: Duration,
}

impl Span {
  fn commit(&mut self, elapsed: Duration, capacity: usize) {
    if self.window.len() == capacity {
      if let Some(oldest) = self.window.pop_front() {
        self.window_sum -= oldest;
      }
    }
    self.window.push_back(elapsed);
    self.window_sum += elapsed;

    if self.count == 0 {
      self.min = elapsed;
      self.max = elapsed;
    } else {
      self.min = self.min.min(elapsed);
      self.max = self.max.max(elapsed);
    }
    self.count += 1;
    self.total += elapsed;
  }
}

/// 按名称统计区间耗时的固定窗口帧率计
///
/// 仅供帧回调线程使用，内部没有同步。同一区间在结束前再次开始会被拒绝，
/// 已开始的区间保持原有起点。
#[derive(Debug)]
pub struct FpsMeter {
  capacity: usize,
  spans: HashMap<String, Span>,
}

impl Default for FpsMeter {
  fn default() -> Self {
    Self::with_window(DEFAULT_WINDOW)
  }
}

impl FpsMeter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_window(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      spans: HashMap::new(),
    }
  }

  pub fn begin(&mut self, name: &str) -> Result<(), FpsError> {
    self.begin_at(name, Instant::now())
  }

  pub fn begin_at(&mut self, name: &str, at: Instant) -> Result<(), FpsError> {
    let span = self.spans.entry(name.to_string()).or_default();
    if span.started.is_some() {
      return Err(FpsError::AlreadyBegun(name.to_string()));
    }
    span.started = Some(at);
    Ok(())
  }

  pub fn end(&mut self, name: &str) -> Result<Duration, FpsError> {
    self.end_at(name, Instant::now())
  }

  /// 结束区间并返回本次耗时
  pub fn end_at(&mut self, name: &str, at: Instant) -> Result<Duration, FpsError> {
    let capacity = self.capacity;
    let span = self
      .spans
      .get_mut(name)
      .ok_or_else(|| FpsError::NotBegun(name.to_string()))?;
    let started = span
      .started
      .ok_or_else(|| FpsError::NotBegun(name.to_string()))?;
    let elapsed = at
      .checked_duration_since(started)
      .ok_or_else(|| FpsError::EndBeforeBegin(name.to_string()))?;
    span.started = None;
    span.commit(elapsed, capacity);
    Ok(elapsed)
  }

  /// 窗口内平均耗时的倒数，没有样本时为 0
  pub fn fps(&self, name: &str) -> f64 {
    let Some(span) = self.spans.get(name) else {
      return 0.0;
    };
    if span.window.is_empty() {
      return 0.0;
    }
    let avg = span.window_sum.as_secs_f64() / span.window.len() as f64;
    if avg > 0.0 { 1.0 / avg } else { 0.0 }
  }

  pub fn stats(&self, name: &str) -> Option<SpanStats> {
    let span = self.spans.get(name)?;
    if span.count == 0 {
      return None;
    }
    Some(SpanStats {
      count: span.count,
      min: span.min,
      max: span.max,
      avg: span.total.div_f64(span.count as f64),
    })
  }

  pub fn is_open(&self, name: &str) -> bool {
    self
      .spans
      .get(name)
      .is_some_and(|span| span.started.is_some())
  }

  pub fn reset(&mut self) {
    self.spans.clear();
  }
}
