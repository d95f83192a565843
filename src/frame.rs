// 该文件是 Mobilesam Canvas 项目的一部分。
// src/frame.rs - NCHW / NHWC 帧定义
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

use std::str::FromStr;

use image::{ImageBuffer, Rgb, RgbImage, imageops::FilterType};

use crate::input::{AsNchwFrame, AsNhwcFrame};

const RGB_CHANNELS: usize = 3;

/// 编码器工作分辨率
pub const SAM_INPUT_W: u32 = 1024;
pub const SAM_INPUT_H: u32 = 684;

/// 编码器张量排布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  /// [3, H, W]
  #[default]
  Nchw,
  /// [H, W, 3]
  Nhwc,
}

impl FromStr for TensorLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nchw" | "chw" => Ok(TensorLayout::Nchw),
      "nhwc" | "hwc" => Ok(TensorLayout::Nhwc),
      other => Err(format!("未知的张量排布: {}", other)),
    }
  }
}

pub trait FrameFormat {
  fn tensor_layout(&self) -> TensorLayout;
  fn tensor_shape(&self) -> [usize; 3];
}

/// 缩放到工作分辨率
fn resize_to<const W: u32, const H: u32>(image: &RgbImage) -> RgbImage {
  if image.dimensions() == (W, H) {
    image.clone()
  } else {
    image::imageops::resize(image, W, H, FilterType::Triangle)
  }
}

/// 通道优先的浮点帧，取值范围 [0, 255]
#[derive(Debug, Clone)]
pub struct RgbNchwFrame<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> Default for RgbNchwFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    Self {
      data: vec![0f32; size].into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for RgbNchwFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    let image = resize_to::<W, H>(image);
    let mut frame = Self::default();
    let plane = (W as usize) * (H as usize);

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y as usize) * (W as usize) + (x as usize);
      for c in 0..RGB_CHANNELS {
        frame.data[c * plane + idx] = pixel[c] as f32;
      }
    }
    frame
  }
}

impl<const W: u32, const H: u32> FrameFormat for RgbNchwFrame<W, H> {
  fn tensor_layout(&self) -> TensorLayout {
    TensorLayout::Nchw
  }

  fn tensor_shape(&self) -> [usize; 3] {
    [RGB_CHANNELS, H as usize, W as usize]
  }
}

impl<const W: u32, const H: u32> AsNchwFrame<W, H> for RgbNchwFrame<W, H> {
  fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}

/// 通道在后的浮点帧，取值范围 [0, 255]
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    Self {
      data: vec![0f32; size].into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for RgbNhwcFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    let image = resize_to::<W, H>(image);
    let data: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> FrameFormat for RgbNhwcFrame<W, H> {
  fn tensor_layout(&self) -> TensorLayout {
    TensorLayout::Nhwc
  }

  fn tensor_shape(&self) -> [usize; 3] {
    [H as usize, W as usize, RGB_CHANNELS]
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[f32] {
    &self.data
  }
}

/// 编码器输入帧：按模型配置选择排布
#[derive(Debug, Clone)]
pub enum EncoderFrame<const W: u32, const H: u32> {
  Nchw(RgbNchwFrame<W, H>),
  Nhwc(RgbNhwcFrame<W, H>),
}

/// 工作分辨率下的编码器帧
pub type SamFrame = EncoderFrame<SAM_INPUT_W, SAM_INPUT_H>;

impl<const W: u32, const H: u32> EncoderFrame<W, H> {
  pub fn from_image(image: &RgbImage, layout: TensorLayout) -> Self {
    match layout {
      TensorLayout::Nchw => EncoderFrame::Nchw(RgbNchwFrame::from(image)),
      TensorLayout::Nhwc => EncoderFrame::Nhwc(RgbNhwcFrame::from(image)),
    }
  }

  pub fn data(&self) -> &[f32] {
    match self {
      EncoderFrame::Nchw(frame) => frame.as_nchw(),
      EncoderFrame::Nhwc(frame) => frame.as_nhwc(),
    }
  }
}

impl<const W: u32, const H: u32> FrameFormat for EncoderFrame<W, H> {
  fn tensor_layout(&self) -> TensorLayout {
    match self {
      EncoderFrame::Nchw(frame) => frame.tensor_layout(),
      EncoderFrame::Nhwc(frame) => frame.tensor_layout(),
    }
  }

  fn tensor_shape(&self) -> [usize; 3] {
    match self {
      EncoderFrame::Nchw(frame) => frame.tensor_shape(),
      EncoderFrame::Nhwc(frame) => frame.tensor_shape(),
    }
  }
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl<const W: u32, const H: u32> ToRgbImage for RgbNchwFrame<W, H> {
  fn to_rgb_image(&self) -> RgbImage {
    let plane = (W as usize) * (H as usize);
    let data = self.as_nchw();

    // 将 NCHW 转为 RGB 图像
    ImageBuffer::from_fn(W, H, |x, y| {
      let idx = (y as usize) * (W as usize) + (x as usize);
      Rgb([
        data[idx] as u8,
        data[plane + idx] as u8,
        data[2 * plane + idx] as u8,
      ])
    })
  }
}

impl<const W: u32, const H: u32> ToRgbImage for RgbNhwcFrame<W, H> {
  fn to_rgb_image(&self) -> RgbImage {
    let data = self.as_nhwc();

    // 将 NHWC 转为 RGB 图像
    ImageBuffer::from_fn(W, H, |x, y| {
      let idx = ((y as usize) * (W as usize) + (x as usize)) * RGB_CHANNELS;
      Rgb([data[idx] as u8, data[idx + 1] as u8, data[idx + 2] as u8])
    })
  }
}

impl<const W: u32, const H: u32> ToRgbImage for EncoderFrame<W, H> {
  fn to_rgb_image(&self) -> RgbImage {
    match self {
      EncoderFrame::Nchw(frame) => frame.to_rgb_image(),
      EncoderFrame::Nhwc(frame) => frame.to_rgb_image(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gradient(w: u32, h: u32) -> RgbImage {
    ImageBuffer::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 7]))
  }

  #[test]
  fn nchw_frame_is_channel_first() {
    let frame = RgbNchwFrame::<4, 2>::from(&gradient(4, 2));
    assert_eq!(frame.tensor_shape(), [3, 2, 4]);
    let data = frame.as_nchw();
    // 红色平面 = x，绿色平面 = y，蓝色平面 = 7
    assert_eq!(&data[0..4], &[0.0, 1.0, 2.0, 3.0]);
    assert_eq!(&data[8..12], &[0.0, 0.0, 0.0, 0.0]);
    assert_eq!(&data[12..16], &[1.0, 1.0, 1.0, 1.0]);
    assert!(data[16..].iter().all(|&v| v == 7.0));
  }

  #[test]
  fn nhwc_frame_is_channel_last() {
    let frame = RgbNhwcFrame::<4, 2>::from(&gradient(4, 2));
    assert_eq!(frame.tensor_shape(), [2, 4, 3]);
    assert_eq!(&frame.as_nhwc()[3..6], &[1.0, 0.0, 7.0]);
  }

  #[test]
  fn frames_resize_to_working_resolution() {
    let frame = SamFrame::from_image(&RgbImage::new(2048, 1368), TensorLayout::Nchw);
    assert_eq!(frame.tensor_shape(), [3, 684, 1024]);
    assert_eq!(frame.data().len(), 3 * 684 * 1024);
    assert_eq!(frame.to_rgb_image().dimensions(), (1024, 684));
  }

  #[test]
  fn layout_round_trips_back_to_image() {
    let image = gradient(4, 2);
    for layout in [TensorLayout::Nchw, TensorLayout::Nhwc] {
      let frame = EncoderFrame::<4, 2>::from_image(&image, layout);
      assert_eq!(frame.to_rgb_image(), image);
    }
  }

  #[test]
  fn layout_parses_from_query_value() {
    assert_eq!("NHWC".parse::<TensorLayout>(), Ok(TensorLayout::Nhwc));
    assert_eq!("nchw".parse::<TensorLayout>(), Ok(TensorLayout::Nchw));
    assert!("planar".parse::<TensorLayout>().is_err());
  }
}
