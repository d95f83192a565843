// 该文件是 Mobilesam Canvas 项目的一部分。
// src/annotate.rs - 标注页面
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

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  canvas::{BLUE, Canvas, RED},
  output::Record,
};

mod event;
pub use self::event::{Event, EventParseError, parse_script};

pub const CANVAS_WIDTH: u32 = 800;
pub const CANVAS_HEIGHT: u32 = 600;
/// 点的绘制半径
pub const POINT_RADIUS: f32 = 2.0;

/// 鼠标事件的解释方式，全页面唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
  #[default]
  None,
  DrawBox,
  DrawPoint,
}

impl FromStr for Mode {
  type Err = EventParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "none" => Ok(Mode::None),
      "draw-box" | "box" => Ok(Mode::DrawBox),
      "draw-point" | "point" => Ok(Mode::DrawPoint),
      other => Err(EventParseError::InvalidMode(other.to_string())),
    }
  }
}

impl fmt::Display for Mode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Mode::None => "none",
      Mode::DrawBox => "draw-box",
      Mode::DrawPoint => "draw-point",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxAnnotation {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
  pub text: String,
}

impl BoxAnnotation {
  /// 由两个角点构造，任一边长为 0 时返回 None
  pub fn from_corners(start: Point, end: Point, text: impl Into<String>) -> Option<Self> {
    let width = (end.x - start.x).abs();
    let height = (end.y - start.y).abs();
    if width > 0.0 && height > 0.0 {
      Some(BoxAnnotation {
        x: start.x.min(end.x),
        y: start.y.min(end.y),
        width,
        height,
        text: text.into(),
      })
    } else {
      None
    }
  }
}

/// 拖拽中的矩形
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DragState {
  pub start: Point,
  pub end: Point,
  pub is_drawing: bool,
}

/// 导出的标注
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationRecord {
  pub points: Vec<Point>,
  pub annotations: Vec<BoxAnnotation>,
}

impl Record for AnnotationRecord {
  fn is_empty(&self) -> bool {
    self.points.is_empty() && self.annotations.is_empty()
  }
}

pub struct AnnotationPage {
  width: u32,
  height: u32,
  image: Option<RgbImage>,
  mode: Mode,
  label: String,
  drag: DragState,
  points: Vec<Point>,
  annotations: Vec<BoxAnnotation>,
}

impl Default for AnnotationPage {
  fn default() -> Self {
    Self::new(CANVAS_WIDTH, CANVAS_HEIGHT)
  }
}

impl AnnotationPage {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      image: None,
      mode: Mode::None,
      label: String::new(),
      drag: DragState::default(),
      points: Vec::new(),
      annotations: Vec::new(),
    }
  }

  pub fn canvas_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn drag(&self) -> DragState {
    self.drag
  }

  pub fn points(&self) -> &[Point] {
    &self.points
  }

  pub fn annotations(&self) -> &[BoxAnnotation] {
    &self.annotations
  }

  pub fn image(&self) -> Option<&RgbImage> {
    self.image.as_ref()
  }

  /// 替换底图，已有标注保持不变
  pub fn load_image(&mut self, image: RgbImage) {
    debug!("载入底图 {}x{}", image.width(), image.height());
    self.image = Some(image);
  }

  pub fn set_mode(&mut self, mode: Mode) {
    debug!("切换模式: {} -> {}", self.mode, mode);
    self.mode = mode;
  }

  pub fn set_label(&mut self, label: impl Into<String>) {
    self.label = label.into();
  }

  pub fn mouse_down(&mut self, x: f32, y: f32) {
    match self.mode {
      Mode::DrawPoint => self.points.push(Point::new(x, y)),
      Mode::DrawBox => {
        let start = self.clamp_to_canvas(x, y);
        self.drag = DragState {
          start,
          end: start,
          is_drawing: true,
        };
      }
      Mode::None => {}
    }
  }

  /// 仅在拖拽中更新终点，终点限制在画布内
  pub fn mouse_move(&mut self, x: f32, y: f32) {
    if self.mode != Mode::DrawBox || !self.drag.is_drawing {
      return;
    }
    self.drag.end = self.clamp_to_canvas(x, y);
  }

  fn clamp_to_canvas(&self, x: f32, y: f32) -> Point {
    Point::new(
      x.clamp(0.0, self.width as f32),
      y.clamp(0.0, self.height as f32),
    )
  }

  /// 结束拖拽；`label` 为本次提交单独指定的标签
  pub fn mouse_up(&mut self, label: Option<&str>) -> Option<&BoxAnnotation> {
    let was_drawing = std::mem::take(&mut self.drag.is_drawing);
    if self.mode != Mode::DrawBox || !was_drawing {
      return None;
    }

    let text = label.unwrap_or(self.label.as_str()).to_string();
    match BoxAnnotation::from_corners(self.drag.start, self.drag.end, text) {
      Some(annotation) => {
        debug!("提交矩形: {:?}", annotation);
        self.annotations.push(annotation);
        self.annotations.last()
      }
      None => {
        debug!("丢弃零面积矩形");
        None
      }
    }
  }

  /// 清空点和矩形
  pub fn clear(&mut self) {
    self.points.clear();
    self.annotations.clear();
  }

  pub fn apply(&mut self, event: &Event) {
    match event {
      Event::Mode(mode) => self.set_mode(*mode),
      Event::Label(label) => self.set_label(label.as_str()),
      Event::Down(p) => self.mouse_down(p.x, p.y),
      Event::Move(p) => self.mouse_move(p.x, p.y),
      Event::Up(label) => {
        self.mouse_up(label.as_deref());
      }
      Event::Clear => self.clear(),
    }
  }

  pub fn record(&self) -> AnnotationRecord {
    AnnotationRecord {
      points: self.points.clone(),
      annotations: self.annotations.clone(),
    }
  }

  /// 完整重绘：底图、点、矩形。没有底图时画布保持空白
  pub fn render(&self) -> Canvas {
    let mut canvas = Canvas::new(self.width, self.height);
    let Some(image) = &self.image else {
      return canvas;
    };

    canvas.draw_image(image);
    for point in &self.points {
      canvas.fill_circle(point.x, point.y, POINT_RADIUS, RED);
    }
    for annotation in &self.annotations {
      canvas.stroke_rect(
        annotation.x,
        annotation.y,
        annotation.width,
        annotation.height,
        BLUE,
      );
    }
    canvas
  }
}
