// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/stream_detect.rs - 可切换后端的连续推理
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
  io::BufRead,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use shanan_stream::{
  FromUrl,
  backend::{Backend, BackendSelector, DeviceCapabilities},
  config::DetectorSettings,
  detector::LumaDetector,
  input::InputWrapper,
  output::OutputWrapper,
  pipeline::StreamingPipeline,
  task::StreamTask,
};

/// 连续推理，运行时从标准输入切换后端
///
/// 标准输入命令: `cpu` / `gpu` / `npu` 选择后端，`gpu off` / `npu off` 关闭加速器，
/// `quit` 退出。
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 luma://bright?score=0.8&width=320&height=240
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///tmp/a.png?repeat=0 或 v4l:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，log:// 或 record:///tmp/out.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 初始后端
  #[arg(long, value_name = "BACKEND", default_value = "cpu")]
  pub backend: Backend,
  /// 设备是否提供 GPU
  #[arg(long)]
  pub gpu: bool,
  /// 设备是否提供 NPU
  #[arg(long)]
  pub npu: bool,
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<u64>,
}

fn spawn_console(selector: Arc<BackendSelector>, interrupt: Arc<AtomicBool>) {
  let spawned = thread::Builder::new()
    .name("backend-console".to_string())
    .spawn(move || {
      for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
          continue;
        };
        if command == "quit" {
          interrupt.store(true, Ordering::Release);
          break;
        }
        let result = command.parse::<Backend>().and_then(|backend| {
          let on = words.next() != Some("off");
          selector.toggle(backend, on)
        });
        match result {
          Ok(()) => info!("已请求后端: {}", selector.requested()),
          Err(e) => warn!("{}", e),
        }
      }
    });
  if let Err(e) = spawned {
    warn!("无法启动后端切换控制台: {}", e);
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let capabilities = DeviceCapabilities {
    gpu: args.gpu,
    npu: args.npu,
  };
  let selector = Arc::new(BackendSelector::with_initial(capabilities, args.backend)?);
  let settings = DetectorSettings::from_url(&args.model)?;
  let camera = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let mut pipeline = StreamingPipeline::new(
    LumaDetector::new(),
    output,
    settings,
    Arc::clone(&selector),
  );

  let interrupt = Arc::new(AtomicBool::new(false));
  spawn_console(Arc::clone(&selector), Arc::clone(&interrupt));

  let stats = StreamTask::default()
    .with_frame_number(args.frame_number)
    .with_interrupt(interrupt)
    .with_ctrlc()
    .run(camera, &mut pipeline)?;
  info!(
    "处理 {} 帧, 丢弃 {} 帧, 切换 {} 次, 初始化失败 {} 次, 检测失败 {} 次",
    stats.processed, stats.dropped, stats.reinits, stats.init_failures, stats.detect_failures
  );

  Ok(())
}
