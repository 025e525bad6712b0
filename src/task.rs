// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 连续推理任务
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use tracing::{error, info, warn};

use crate::{
  detector::Detector,
  input::CameraSource,
  output::Renderer,
  pipeline::{FrameOutcome, PipelineStats, StreamingPipeline},
};

/// 把相机帧按交付顺序逐帧推入流水线
#[derive(Default, Debug)]
pub struct StreamTask {
  frame_number: Option<u64>,
  interrupt: Option<Arc<AtomicBool>>,
}

impl StreamTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 外部置位后在当前帧处理完时退出
  pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  /// 安装 Ctrl-C 处理器，收到信号后在当前帧处理完时退出
  pub fn with_ctrlc(mut self) -> Self {
    let interrupt = self
      .interrupt
      .take()
      .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
    let flag = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      flag.store(true, Ordering::Release);
    }) {
      warn!("无法安装 Ctrl-C 处理器: {}", e);
    }
    self.with_interrupt(interrupt)
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::Acquire))
  }

  /// 启动流水线并处理帧直到来源耗尽、达到帧数或被中断
  ///
  /// 检测器初始化失败不会终止任务，相机读取失败会在停止流水线后返回。
  pub fn run<C, D, R>(
    self,
    mut camera: C,
    pipeline: &mut StreamingPipeline<D, R>,
  ) -> Result<PipelineStats, C::Error>
  where
    C: CameraSource,
    D: Detector,
    R: Renderer,
  {
    info!("开始任务...");
    if let Err(e) = pipeline.start(camera.params()) {
      warn!("{}，等待切换后端", e);
    }

    let mut frame_index = 0u64;
    let mut failure = None;
    while let Some(frame) = camera.next_frame() {
      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          error!("读取相机帧失败: {}", e);
          failure = Some(e);
          break;
        }
      };
      frame_index += 1;
      match pipeline.on_frame(&frame) {
        FrameOutcome::Processed { detections } => {
          info!("第 {} 帧: {} 个目标, {:.2} fps", frame_index, detections, pipeline.fps())
        }
        FrameOutcome::Dropped(reason) => {
          info!("第 {} 帧被丢弃: {:?}", frame_index, reason)
        }
      }

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    pipeline.stop();
    info!("任务完成，退出");
    match failure {
      Some(e) => Err(e),
      None => Ok(pipeline.stats()),
    }
  }
}
