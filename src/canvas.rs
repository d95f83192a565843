// 该文件是 Mobilesam Canvas 项目的一部分。
// src/canvas.rs - 画布绘制
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

use image::{Rgb, RgbImage, Rgba, RgbaImage, imageops::FilterType};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const GREEN: Rgba<u8> = Rgba([0, 128, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// 二维画布，坐标系与像素一致
#[derive(Debug, Clone)]
pub struct Canvas {
  image: RgbaImage,
  background: Rgba<u8>,
}

impl Canvas {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      image: RgbaImage::from_pixel(width, height, WHITE),
      background: WHITE,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  /// 改变尺寸会清空画布
  pub fn set_size(&mut self, width: u32, height: u32) {
    self.image = RgbaImage::from_pixel(width, height, self.background);
  }

  pub fn clear(&mut self) {
    for pixel in self.image.pixels_mut() {
      *pixel = self.background;
    }
  }

  /// 将图片缩放到画布大小后绘制
  pub fn draw_image(&mut self, image: &RgbImage) {
    let (w, h) = self.dimensions();
    if w == 0 || h == 0 {
      return;
    }
    let scaled;
    let source = if image.dimensions() == (w, h) {
      image
    } else {
      scaled = image::imageops::resize(image, w, h, FilterType::Triangle);
      &scaled
    };

    for (x, y, &Rgb([r, g, b])) in source.enumerate_pixels() {
      self.image.put_pixel(x, y, Rgba([r, g, b, 255]));
    }
  }

  pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>) {
    if let Some(rect) = self.to_rect(x, y, width, height) {
      draw_filled_rect_mut(&mut self.image, rect, color);
    }
  }

  pub fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>) {
    if let Some(rect) = self.to_rect(x, y, width, height) {
      draw_hollow_rect_mut(&mut self.image, rect, color);
    }
  }

  /// 圆心离画布超过半径时不绘制
  pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
    if !(cx.is_finite() && cy.is_finite() && radius.is_finite()) || radius < 0.0 {
      return;
    }
    let (w, h) = (self.width() as f32, self.height() as f32);
    let radius = radius.round().min(w.max(h));
    if cx < -radius || cy < -radius || cx > w + radius || cy > h + radius {
      return;
    }
    draw_filled_circle_mut(
      &mut self.image,
      (cx.round() as i32, cy.round() as i32),
      radius as i32,
      color,
    );
  }

  /// 以全局透明度将位图叠加到左上角
  pub fn composite(&mut self, bitmap: &RgbaImage, global_alpha: f32) {
    let global_alpha = global_alpha.clamp(0.0, 1.0);
    let w = bitmap.width().min(self.width());
    let h = bitmap.height().min(self.height());

    for y in 0..h {
      for x in 0..w {
        let src = bitmap.get_pixel(x, y);
        let alpha = global_alpha * (src[3] as f32 / 255.0);
        if alpha <= 0.0 {
          continue;
        }
        let dst = self.image.get_pixel_mut(x, y);
        for c in 0..3 {
          let blended = src[c] as f32 * alpha + dst[c] as f32 * (1.0 - alpha);
          dst[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = 255;
      }
    }
  }

  pub fn as_image(&self) -> &RgbaImage {
    &self.image
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    image::DynamicImage::ImageRgba8(self.image.clone()).to_rgb8()
  }

  /// 裁剪到画布外扩一像素的范围，超出画布的边不会被画出
  fn to_rect(&self, x: f32, y: f32, width: f32, height: f32) -> Option<Rect> {
    if ![x, y, width, height].iter().all(|v| v.is_finite()) {
      return None;
    }
    let (left, top) = (x.round(), y.round());
    let (right, bottom) = (left + width.round(), top + height.round());
    let left = left.max(-1.0);
    let top = top.max(-1.0);
    let right = right.min(self.width() as f32 + 1.0);
    let bottom = bottom.min(self.height() as f32 + 1.0);
    if right - left < 1.0 || bottom - top < 1.0 {
      return None;
    }
    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn draw_image_scales_to_canvas() {
    let mut canvas = Canvas::new(8, 6);
    canvas.draw_image(&RgbImage::from_pixel(16, 12, Rgb([9, 9, 9])));
    assert!(canvas.as_image().pixels().all(|p| *p == Rgba([9, 9, 9, 255])));
  }

  #[test]
  fn clear_restores_background() {
    let mut canvas = Canvas::new(4, 4);
    canvas.fill_rect(0.0, 0.0, 4.0, 4.0, RED);
    canvas.clear();
    assert!(canvas.as_image().pixels().all(|p| *p == WHITE));
  }

  #[test]
  fn stroke_rect_leaves_interior() {
    let mut canvas = Canvas::new(20, 20);
    canvas.stroke_rect(2.0, 2.0, 10.0, 10.0, BLUE);
    assert_eq!(canvas.as_image().get_pixel(2, 2), &BLUE);
    assert_eq!(canvas.as_image().get_pixel(11, 5), &BLUE);
    assert_eq!(canvas.as_image().get_pixel(6, 6), &WHITE);
  }

  #[test]
  fn zero_sized_rect_draws_nothing() {
    let mut canvas = Canvas::new(4, 4);
    canvas.stroke_rect(1.0, 1.0, 0.0, 3.0, BLUE);
    assert!(canvas.as_image().pixels().all(|p| *p == WHITE));
  }

  #[test]
  fn composite_blends_at_half_opacity() {
    let mut canvas = Canvas::new(2, 1);
    canvas.fill_rect(0.0, 0.0, 2.0, 1.0, Rgba([0, 0, 0, 255]));
    let bitmap = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]));
    canvas.composite(&bitmap, 0.5);
    assert_eq!(canvas.as_image().get_pixel(0, 0), &Rgba([128, 128, 128, 255]));
    // 位图之外不受影响
    assert_eq!(canvas.as_image().get_pixel(1, 0), &Rgba([0, 0, 0, 255]));
  }

  #[test]
  fn far_off_canvas_shapes_are_clipped() {
    let mut canvas = Canvas::new(20, 20);
    canvas.stroke_rect(100.0, 10.0, 3e9, 5.0, BLUE);
    canvas.fill_rect(3e9, 5.0, 10.0, 10.0, GREEN);
    canvas.fill_circle(3e9, 5.0, 2.0, RED);
    canvas.fill_circle(f32::INFINITY, 5.0, 2.0, RED);
    canvas.fill_rect(f32::NAN, 0.0, 4.0, 4.0, RED);
    assert!(canvas.as_image().pixels().all(|p| *p == WHITE));
  }

  #[test]
  fn partly_visible_box_keeps_only_real_edges() {
    let mut canvas = Canvas::new(20, 20);
    canvas.stroke_rect(5.0, 5.0, 3e9, 10.0, BLUE);
    assert_eq!(canvas.as_image().get_pixel(5, 10), &BLUE);
    assert_eq!(canvas.as_image().get_pixel(12, 5), &BLUE);
    assert_eq!(canvas.as_image().get_pixel(12, 14), &BLUE);
    // 右边在画布之外
    assert_eq!(canvas.as_image().get_pixel(19, 10), &WHITE);
  }

  #[test]
  fn circle_near_edge_is_still_drawn() {
    let mut canvas = Canvas::new(20, 20);
    canvas.fill_circle(21.0, 10.0, 2.0, RED);
    assert_eq!(canvas.as_image().get_pixel(19, 10), &RED);
  }
}
