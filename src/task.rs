// 该文件是 Mobilesam Canvas 项目的一部分。
// src/task.rs - 任务定义
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

use std::fmt::Display;
use std::path::PathBuf;

use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::{
  annotate::{AnnotationPage, AnnotationRecord, Event},
  canvas::Canvas,
  frame::TensorLayout,
  model::{DEFAULT_CLICK_LABEL, Decoder, Encoder},
  output::Render,
  segment::{ClickPoint, SegmentError, SegmentRecord, SegmentationPage},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 上传一张图片，随后依次回放点击；每一步都渲染一次画布
pub struct SegmentTask {
  page: SegmentationPage,
  clicks: Vec<ClickPoint>,
}

impl Default for SegmentTask {
  fn default() -> Self {
    Self::new(TensorLayout::default(), DEFAULT_CLICK_LABEL)
  }
}

impl SegmentTask {
  pub fn new(layout: TensorLayout, click_label: f32) -> Self {
    Self {
      page: SegmentationPage::new(layout, click_label),
      clicks: Vec::new(),
    }
  }

  pub fn with_clicks(mut self, clicks: Vec<ClickPoint>) -> Self {
    self.clicks = clicks;
    self
  }
}

impl<I, E, D, O, RE> Task<I, (E, D), O> for SegmentTask
where
  I: Iterator<Item = RgbImage>,
  E: Encoder,
  E::Error: Display,
  D: Decoder,
  D::Error: Display,
  O: Render<Canvas, SegmentRecord, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: (E, D), output: O) -> Result<(), Self::Error> {
    let SegmentTask { mut page, clicks } = self;
    let (encoder, decoder) = model;

    info!("开始分割任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;

    let encoded = page.upload(&encoder, &image);
    output.render_result(page.canvas(), &page.record(None))?;
    encoded?;

    for (index, click) in clicks.into_iter().enumerate() {
      info!("({}) 点击 ({}, {})", index, click.x, click.y);
      match page.click(&decoder, click) {
        Ok(()) => {}
        Err(e @ SegmentError::Decode(_)) => error!("({}) {}", index, e),
        Err(e) => warn!("({}) {}", index, e),
      }
      output.render_result(page.canvas(), &page.record(Some(click)))?;
    }

    info!("任务完成: {}", page.status());
    Ok(())
  }
}

/// 回放一段标注事件，每次状态变化都重绘并输出画布与标注记录
#[derive(Default)]
pub struct AnnotateTask {
  page: AnnotationPage,
  events: Vec<Event>,
  export: Option<PathBuf>,
}

impl AnnotateTask {
  pub fn with_events(mut self, events: Vec<Event>) -> Self {
    self.events = events;
    self
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.page.set_label(label);
    self
  }

  /// 额外把标注记录导出为 JSON
  pub fn with_export(mut self, export: Option<PathBuf>) -> Self {
    self.export = export;
    self
  }
}

impl<I, O, RE> Task<I, (), O> for AnnotateTask
where
  I: Iterator<Item = RgbImage>,
  O: Render<Canvas, AnnotationRecord, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, _model: (), output: O) -> Result<(), Self::Error> {
    let AnnotateTask {
      mut page,
      events,
      export,
    } = self;

    info!("开始标注任务...");
    match input.next() {
      Some(image) => page.load_image(image),
      None => warn!("没有输入图像，画布保持空白"),
    }
    output.render_result(&page.render(), &page.record())?;

    for (index, event) in events.iter().enumerate() {
      debug!("({}) {:?}", index, event);
      page.apply(event);
      output.render_result(&page.render(), &page.record())?;
    }
    info!(
      "共回放 {} 个事件: {} 个点, {} 个框",
      events.len(),
      page.points().len(),
      page.annotations().len()
    );

    let record = page.record();

    if let Some(path) = export {
      let file = std::fs::File::create(&path)?;
      serde_json::to_writer_pretty(std::io::BufWriter::new(file), &record)?;
      info!("导出标注到: {}", path.display());
    }

    Ok(())
  }
}
