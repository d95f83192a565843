// 该文件是 Mobilesam Canvas 项目的一部分。
// src/model.rs - 模型
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

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::frame::{SAM_INPUT_H, SAM_INPUT_W, SamFrame};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 编码器：工作分辨率帧 -> 图像嵌入
pub trait Encoder: Model<Input = SamFrame, Output = Embedding> {}
impl<M: Model<Input = SamFrame, Output = Embedding>> Encoder for M {}

/// 解码器：嵌入 + 点提示 -> 掩码
pub trait Decoder: Model<Input = DecoderInput, Output = MaskResult> {}
impl<M: Model<Input = DecoderInput, Output = MaskResult>> Decoder for M {}

/// 点击点的默认标签（与浏览器版本保持一致）
pub const DEFAULT_CLICK_LABEL: f32 = 0.0;
/// 填充点的标签
pub const PADDING_POINT_LABEL: f32 = -1.0;
/// mask_input 的边长
pub const MASK_INPUT_SIZE: usize = 256;

/// 编码器输出的图像嵌入，对解码器之外不透明
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
  shape: Vec<i64>,
  data: Vec<f32>,
}

impl Embedding {
  pub fn new(shape: Vec<i64>, data: Vec<f32>) -> Self {
    Self { shape, data }
  }

  pub fn shape(&self) -> &[i64] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }
}

/// 一个前景/背景点加一个填充点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPrompt {
  pub coords: [f32; 4],
  pub labels: [f32; 2],
}

impl PointPrompt {
  pub fn single(x: f32, y: f32, label: f32) -> Self {
    Self {
      coords: [x, y, 0.0, 0.0],
      labels: [label, PADDING_POINT_LABEL],
    }
  }
}

#[derive(Debug, Clone)]
pub struct DecoderInput {
  pub embedding: Arc<Embedding>,
  pub prompt: PointPrompt,
  /// 原图尺寸 (高, 宽)
  pub orig_im_size: [f32; 2],
}

impl DecoderInput {
  pub fn new(embedding: Arc<Embedding>, prompt: PointPrompt) -> Self {
    Self {
      embedding,
      prompt,
      orig_im_size: [SAM_INPUT_H as f32, SAM_INPUT_W as f32],
    }
  }

  /// 全零的 mask_input
  pub fn mask_input(&self) -> Vec<f32> {
    vec![0.0; MASK_INPUT_SIZE * MASK_INPUT_SIZE]
  }

  pub fn has_mask_input(&self) -> [f32; 1] {
    [0.0]
  }
}

/// 解码器输出的掩码 logits，形状 [.., H, W]
#[derive(Debug, Clone, PartialEq)]
pub struct MaskResult {
  shape: Vec<i64>,
  logits: Vec<f32>,
}

impl MaskResult {
  pub fn new(shape: Vec<i64>, logits: Vec<f32>) -> Self {
    Self { shape, logits }
  }

  pub fn shape(&self) -> &[i64] {
    &self.shape
  }

  pub fn width(&self) -> u32 {
    self.shape.last().copied().unwrap_or(0).max(0) as u32
  }

  pub fn height(&self) -> u32 {
    match self.shape.len() {
      0 | 1 => 1,
      n => self.shape[n - 2].max(0) as u32,
    }
  }

  /// 第一张掩码转为灰度位图，logit 截断到 [0, 1]
  pub fn to_bitmap(&self) -> RgbaImage {
    let (w, h) = (self.width(), self.height());
    RgbaImage::from_fn(w, h, |x, y| {
      let idx = (y as usize) * (w as usize) + (x as usize);
      let value = self.logits.get(idx).copied().unwrap_or(0.0);
      let v = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
      Rgba([v, v, v, 255])
    })
  }
}

#[cfg(feature = "model_mobilesam")]
mod mobilesam;
#[cfg(feature = "model_mobilesam")]
pub use self::mobilesam::{MobileSamDecoder, MobileSamEncoder, OnnxModelBuilder, OnnxModelError};
