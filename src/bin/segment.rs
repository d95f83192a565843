// 该文件是 Mobilesam Canvas 项目的一部分。
// src/bin/segment.rs - 点击分割
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use mobilesam_canvas::{
  FromUrl,
  input::InputWrapper,
  model::OnnxModelBuilder,
  output::OutputWrapper,
  segment::ClickPoint,
  task::{SegmentTask, Task},
};

/// MobileSAM 点击分割参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 编码器模型，例如 onnx:///models/mobilesam.encoder.onnx?layout=nchw
  #[arg(long, value_name = "ENCODER")]
  pub encoder: Url,
  /// 解码器模型，例如 onnx:///models/mobilesam.decoder.onnx?label=0
  #[arg(long, value_name = "DECODER")]
  pub decoder: Url,
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 点击位置 x,y（工作分辨率坐标），可重复
  #[arg(long, value_name = "X,Y")]
  pub click: Vec<ClickPoint>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("编码器: {}", args.encoder);
  info!("解码器: {}", args.decoder);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let encoder = OnnxModelBuilder::from_url(&args.encoder)?;
  let decoder = OnnxModelBuilder::from_url(&args.decoder)?;
  let task = SegmentTask::new(encoder.layout(), decoder.click_label()).with_clicks(args.click);

  let input = InputWrapper::from_url(&args.input)?;
  let model = (encoder.build_encoder()?, decoder.build_decoder()?);
  let output = OutputWrapper::from_url(&args.output)?;

  task.run_task(input, model, output)
}
