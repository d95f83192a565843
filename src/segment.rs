// 该文件是 Mobilesam Canvas 项目的一部分。
// src/segment.rs - 点击分割页面
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

//! 分割页面的状态容器。
//!
//! 每次编码/解码都会领取一个递增的票据，结果只有在票据仍然是最新的时候
//! 才会被应用；新的上传会让所有进行中的解码失效。

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{RgbImage, imageops::FilterType};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  canvas::{Canvas, GREEN},
  frame::{SAM_INPUT_H, SAM_INPUT_W, SamFrame, TensorLayout, ToRgbImage},
  model::{DEFAULT_CLICK_LABEL, Decoder, DecoderInput, Embedding, Encoder, MaskResult, PointPrompt},
  output::Record,
};

/// 掩码叠加的不透明度
pub const MASK_OPACITY: f32 = 0.5;
/// 点击标记的边长
pub const CLICK_MARKER_SIZE: f32 = 10.0;

pub const STATUS_NO_IMAGE: &str = "No image uploaded";
pub const STATUS_NO_EMBEDDING: &str =
  "No embedding available yet. Upload an image and wait for encoding.";
pub const STATUS_MASK_GENERATED: &str = "Mask generated. Click on the image to generate new mask.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
  #[error("尚未生成图像嵌入")]
  NoEmbedding,
  #[error("结果已过期，已丢弃")]
  Stale,
  #[error("编码失败: {0}")]
  Encode(String),
  #[error("解码失败: {0}")]
  Decode(String),
}

/// 画布坐标系下的点击位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClickPoint {
  pub x: f32,
  pub y: f32,
}

impl ClickPoint {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

impl FromStr for ClickPoint {
  type Err = String;

  /// `x,y`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (x, y) = s
      .split_once(',')
      .ok_or_else(|| format!("点击坐标应为 x,y: {}", s))?;
    let x = x
      .trim()
      .parse::<f32>()
      .ok()
      .filter(|v| v.is_finite())
      .ok_or_else(|| format!("无效的横坐标: {}", x))?;
    let y = y
      .trim()
      .parse::<f32>()
      .ok()
      .filter(|v| v.is_finite())
      .ok_or_else(|| format!("无效的纵坐标: {}", y))?;
    Ok(ClickPoint { x, y })
  }
}

/// 每次渲染附带输出的页面快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRecord {
  pub status: String,
  pub click: Option<ClickPoint>,
  pub has_embedding: bool,
}

impl Record for SegmentRecord {
  fn is_empty(&self) -> bool {
    self.click.is_none()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeTicket {
  seq: u64,
  image: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
  /// 没有可用的嵌入
  Idle,
  AwaitingClick,
  Decoding,
}

pub struct SegmentationPage {
  canvas: Canvas,
  base: Option<RgbImage>,
  embedding: Option<Arc<Embedding>>,
  status: String,
  state: DecoderState,
  layout: TensorLayout,
  click_label: f32,
  encode_seq: u64,
  decode_seq: u64,
}

impl Default for SegmentationPage {
  fn default() -> Self {
    Self::new(TensorLayout::default(), DEFAULT_CLICK_LABEL)
  }
}

impl SegmentationPage {
  pub fn new(layout: TensorLayout, click_label: f32) -> Self {
    Self {
      canvas: Canvas::new(SAM_INPUT_W, SAM_INPUT_H),
      base: None,
      embedding: None,
      status: STATUS_NO_IMAGE.to_string(),
      state: DecoderState::Idle,
      layout,
      click_label,
      encode_seq: 0,
      decode_seq: 0,
    }
  }

  pub fn status(&self) -> &str {
    &self.status
  }

  pub fn state(&self) -> DecoderState {
    self.state
  }

  pub fn canvas(&self) -> &Canvas {
    &self.canvas
  }

  pub fn embedding(&self) -> Option<&Embedding> {
    self.embedding.as_deref()
  }

  pub fn record(&self, click: Option<ClickPoint>) -> SegmentRecord {
    SegmentRecord {
      status: self.status.clone(),
      click,
      has_embedding: self.embedding.is_some(),
    }
  }

  fn set_status(&mut self, status: String) {
    info!("状态: {}", status);
    self.status = status;
  }

  /// 新图片上传：替换底图、清除旧嵌入并返回编码器输入
  pub fn begin_encode(&mut self, image: &RgbImage) -> (EncodeTicket, SamFrame) {
    self.encode_seq += 1;
    self.decode_seq += 1;
    self.embedding = None;
    self.state = DecoderState::Idle;
    self.set_status(format!(
      "Uploaded image is {}x{}px. Loading the encoder model.",
      image.width(),
      image.height()
    ));

    let frame = SamFrame::from_image(image, self.layout);
    let base = frame.to_rgb_image();
    self.canvas.set_size(base.width(), base.height());
    self.canvas.draw_image(&base);
    self.base = Some(base);

    (EncodeTicket(self.encode_seq), frame)
  }

  pub fn finish_encode<E: Display>(
    &mut self,
    ticket: EncodeTicket,
    result: Result<Embedding, E>,
    elapsed: Duration,
  ) -> Result<(), SegmentError> {
    if ticket.0 != self.encode_seq {
      warn!("丢弃过期的编码结果 #{} (当前 #{})", ticket.0, self.encode_seq);
      return Err(SegmentError::Stale);
    }

    match result {
      Ok(embedding) => {
        self.embedding = Some(Arc::new(embedding));
        self.state = DecoderState::AwaitingClick;
        self.set_status(format!(
          "Embedding generated in {:.3} seconds. Click on the image to generate a mask.",
          elapsed.as_secs_f64()
        ));
        Ok(())
      }
      Err(e) => {
        error!("编码失败: {}", e);
        self.state = DecoderState::Idle;
        self.set_status(format!("Error: {}", e));
        Err(SegmentError::Encode(e.to_string()))
      }
    }
  }

  /// 点击：重绘底图与点击标记，返回解码器输入
  pub fn begin_decode(
    &mut self,
    click: ClickPoint,
  ) -> Result<(DecodeTicket, DecoderInput), SegmentError> {
    let (Some(embedding), Some(base)) = (self.embedding.clone(), self.base.as_ref()) else {
      warn!("在图像嵌入生成之前点击 ({}, {})", click.x, click.y);
      self.set_status(STATUS_NO_EMBEDDING.to_string());
      return Err(SegmentError::NoEmbedding);
    };

    self.canvas.clear();
    self.canvas.draw_image(base);
    self.canvas.fill_rect(
      click.x,
      click.y,
      CLICK_MARKER_SIZE,
      CLICK_MARKER_SIZE,
      GREEN,
    );

    self.decode_seq += 1;
    self.state = DecoderState::Decoding;
    self.set_status(format!(
      "Clicked on ({}, {}). Generating mask...",
      click.x, click.y
    ));

    let prompt = PointPrompt::single(click.x, click.y, self.click_label);
    let ticket = DecodeTicket {
      seq: self.decode_seq,
      image: self.encode_seq,
    };
    Ok((ticket, DecoderInput::new(embedding, prompt)))
  }

  pub fn finish_decode<E: Display>(
    &mut self,
    ticket: DecodeTicket,
    result: Result<MaskResult, E>,
    elapsed: Duration,
  ) -> Result<(), SegmentError> {
    if ticket.seq != self.decode_seq || ticket.image != self.encode_seq {
      warn!("丢弃过期的解码结果 #{} (当前 #{})", ticket.seq, self.decode_seq);
      return Err(SegmentError::Stale);
    }

    self.state = DecoderState::AwaitingClick;
    info!("生成掩码耗时: {:.2?}", elapsed);

    match result {
      Ok(mask) => {
        let mut bitmap = mask.to_bitmap();
        let (w, h) = self.canvas.dimensions();
        if bitmap.dimensions() != (w, h) {
          bitmap = image::imageops::resize(&bitmap, w, h, FilterType::Nearest);
        }
        self.canvas.composite(&bitmap, MASK_OPACITY);
        self.set_status(STATUS_MASK_GENERATED.to_string());
        Ok(())
      }
      Err(e) => {
        error!("解码失败: {}", e);
        self.set_status(format!("Mask generation failed: {}", e));
        Err(SegmentError::Decode(e.to_string()))
      }
    }
  }

  /// 上传并同步执行一次编码
  pub fn upload<M>(&mut self, encoder: &M, image: &RgbImage) -> Result<(), SegmentError>
  where
    M: Encoder,
    M::Error: Display,
  {
    let (ticket, frame) = self.begin_encode(image);
    let now = Instant::now();
    let result = encoder.infer(&frame);
    self.finish_encode(ticket, result, now.elapsed())
  }

  /// 点击并同步执行一次解码
  pub fn click<M>(&mut self, decoder: &M, click: ClickPoint) -> Result<(), SegmentError>
  where
    M: Decoder,
    M::Error: Display,
  {
    let (ticket, input) = self.begin_decode(click)?;
    let now = Instant::now();
    let result = decoder.infer(&input);
    self.finish_decode(ticket, result, now.elapsed())
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use image::{Rgb, Rgba};

  use super::*;
  use crate::frame::FrameFormat;
  use crate::model::Model;

  struct FakeEncoder {
    seen: RefCell<Vec<[usize; 3]>>,
  }

  impl Model for FakeEncoder {
    type Input = SamFrame;
    type Output = Embedding;
    type Error = String;

    fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
      self.seen.borrow_mut().push(input.tensor_shape());
      Ok(Embedding::new(vec![1, 256, 64, 64], vec![0.5; 4]))
    }
  }

  struct FailingEncoder;

  impl Model for FailingEncoder {
    type Input = SamFrame;
    type Output = Embedding;
    type Error = String;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Err("session exploded".to_string())
    }
  }

  /// 输出一张全前景的掩码，并记录收到的提示
  struct FakeDecoder {
    prompts: RefCell<Vec<PointPrompt>>,
  }

  impl Model for FakeDecoder {
    type Input = DecoderInput;
    type Output = MaskResult;
    type Error = String;

    fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
      self.prompts.borrow_mut().push(input.prompt);
      let (w, h) = (SAM_INPUT_W as usize, SAM_INPUT_H as usize);
      Ok(MaskResult::new(
        vec![1, 1, h as i64, w as i64],
        vec![5.0; w * h],
      ))
    }
  }

  fn black(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([0, 0, 0]))
  }

  fn encoder() -> FakeEncoder {
    FakeEncoder {
      seen: RefCell::new(Vec::new()),
    }
  }

  fn decoder() -> FakeDecoder {
    FakeDecoder {
      prompts: RefCell::new(Vec::new()),
    }
  }

  #[test]
  fn upload_resizes_and_reports_embedding() {
    let mut page = SegmentationPage::default();
    let encoder = encoder();
    page.upload(&encoder, &black(2048, 1368)).unwrap();

    assert_eq!(encoder.seen.borrow().as_slice(), &[[3, 684, 1024]]);
    assert!(page.status().starts_with("Embedding generated in"));
    assert_eq!(page.state(), DecoderState::AwaitingClick);
    assert_eq!(page.canvas().dimensions(), (1024, 684));
    assert!(page.embedding().is_some());
  }

  #[test]
  fn encode_failure_surfaces_in_status() {
    let mut page = SegmentationPage::default();
    let result = page.upload(&FailingEncoder, &black(10, 10));
    assert_eq!(result, Err(SegmentError::Encode("session exploded".into())));
    assert_eq!(page.status(), "Error: session exploded");
    assert!(page.embedding().is_none());
  }

  #[test]
  fn click_before_encode_is_rejected_without_drawing() {
    let mut page = SegmentationPage::default();
    let before = page.canvas().as_image().clone();
    let decoder = decoder();

    let result = page.click(&decoder, ClickPoint::new(100.0, 50.0));
    assert_eq!(result, Err(SegmentError::NoEmbedding));
    assert_eq!(page.status(), STATUS_NO_EMBEDDING);
    assert!(decoder.prompts.borrow().is_empty());
    assert_eq!(page.canvas().as_image(), &before);
  }

  #[test]
  fn click_sends_point_prompt_and_composites_mask() {
    let mut page = SegmentationPage::default();
    page.upload(&encoder(), &black(1024, 684)).unwrap();
    let decoder = decoder();
    page.click(&decoder, ClickPoint::new(100.0, 50.0)).unwrap();

    let prompt = decoder.prompts.borrow()[0];
    assert_eq!(prompt.coords, [100.0, 50.0, 0.0, 0.0]);
    assert_eq!(prompt.labels, [0.0, -1.0]);
    assert_eq!(page.status(), STATUS_MASK_GENERATED);

    // 黑底 + 白色掩码 50% => 灰色
    let canvas = page.canvas().as_image();
    assert_eq!(canvas.get_pixel(500, 500), &Rgba([128, 128, 128, 255]));
    // 绿色标记上叠加白色掩码
    assert_eq!(canvas.get_pixel(105, 55), &Rgba([128, 192, 128, 255]));
  }

  #[test]
  fn stale_decode_result_is_discarded() {
    let mut page = SegmentationPage::default();
    page.upload(&encoder(), &black(64, 64)).unwrap();

    let (first, _) = page.begin_decode(ClickPoint::new(1.0, 1.0)).unwrap();
    let (second, _) = page.begin_decode(ClickPoint::new(2.0, 2.0)).unwrap();
    let mask = || Ok::<_, String>(MaskResult::new(vec![1, 1, 1, 1], vec![1.0]));

    assert_eq!(
      page.finish_decode(first, mask(), Duration::ZERO),
      Err(SegmentError::Stale)
    );
    assert_eq!(page.state(), DecoderState::Decoding);
    page.finish_decode(second, mask(), Duration::ZERO).unwrap();
    assert_eq!(page.state(), DecoderState::AwaitingClick);
  }

  #[test]
  fn new_upload_invalidates_inflight_work() {
    let mut page = SegmentationPage::default();
    page.upload(&encoder(), &black(64, 64)).unwrap();
    let (decode, _) = page.begin_decode(ClickPoint::new(1.0, 1.0)).unwrap();
    let (old_encode, _) = page.begin_encode(&black(32, 32));
    let (new_encode, _) = page.begin_encode(&black(16, 16));

    let embedding = || Ok::<_, String>(Embedding::new(vec![1], vec![1.0]));
    assert_eq!(
      page.finish_encode(old_encode, embedding(), Duration::ZERO),
      Err(SegmentError::Stale)
    );
    assert!(page.embedding().is_none());
    page
      .finish_encode(new_encode, embedding(), Duration::ZERO)
      .unwrap();

    let mask = Ok::<_, String>(MaskResult::new(vec![1, 1, 1, 1], vec![1.0]));
    assert_eq!(
      page.finish_decode(decode, mask, Duration::ZERO),
      Err(SegmentError::Stale)
    );
  }

  #[test]
  fn decode_failure_surfaces_in_status() {
    let mut page = SegmentationPage::default();
    page.upload(&encoder(), &black(64, 64)).unwrap();
    let (ticket, _) = page.begin_decode(ClickPoint::new(3.0, 4.0)).unwrap();
    let result = page.finish_decode(ticket, Err::<MaskResult, _>("bad input"), Duration::ZERO);
    assert_eq!(result, Err(SegmentError::Decode("bad input".into())));
    assert_eq!(page.status(), "Mask generation failed: bad input");
    assert_eq!(page.state(), DecoderState::AwaitingClick);
  }

  #[test]
  fn click_point_parses_pairs() {
    assert_eq!("100,50".parse::<ClickPoint>(), Ok(ClickPoint::new(100.0, 50.0)));
    assert_eq!(" 1.5 , 2 ".parse::<ClickPoint>(), Ok(ClickPoint::new(1.5, 2.0)));
    assert!("100".parse::<ClickPoint>().is_err());
    assert!("a,b".parse::<ClickPoint>().is_err());
    assert!("inf,5".parse::<ClickPoint>().is_err());
  }

  #[test]
  fn click_far_outside_canvas_still_decodes() {
    let mut page = SegmentationPage::default();
    page.upload(&encoder(), &black(64, 64)).unwrap();
    let decoder = decoder();
    page
      .click(&decoder, ClickPoint::new(3_000_000_000.0, 5.0))
      .unwrap();
    assert_eq!(decoder.prompts.borrow()[0].coords[0], 3_000_000_000.0);
    assert_eq!(page.status(), STATUS_MASK_GENERATED);
  }
}
