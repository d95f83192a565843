// 该文件是 Mobilesam Canvas 项目的一部分。
// src/bin/annotate.rs - 框与点标注
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use mobilesam_canvas::{
  FromUrl,
  annotate::{Event, parse_script},
  input::InputWrapper,
  output::OutputWrapper,
  task::{AnnotateTask, Task},
};

/// 标注工具参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 事件脚本，每行一个事件
  #[arg(long, value_name = "SCRIPT")]
  pub script: Option<PathBuf>,
  /// 追加在脚本之后的事件，例如 --event "down 10 10"
  #[arg(long, value_name = "EVENT")]
  pub event: Vec<Event>,
  /// 初始标签
  #[arg(long, value_name = "LABEL", default_value = "")]
  pub label: String,
  /// 导出标注记录（JSON）
  #[arg(long, value_name = "FILE")]
  pub export: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut events = match &args.script {
    Some(path) => {
      let text = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取事件脚本: {}", path.display()))?;
      parse_script(&text)?
    }
    None => Vec::new(),
  };
  events.extend(args.event);

  let task = AnnotateTask::default()
    .with_label(args.label)
    .with_events(events)
    .with_export(args.export);

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  task.run_task(input, (), output)
}
