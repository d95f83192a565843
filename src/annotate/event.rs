// 该文件是 Mobilesam Canvas 项目的一部分。
// src/annotate/event.rs - 标注事件脚本
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

use thiserror::Error;

use super::{Mode, Point};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventParseError {
  #[error("空事件")]
  Empty,
  #[error("未知事件: {0}")]
  UnknownEvent(String),
  #[error("事件参数无效: {0}")]
  InvalidArguments(String),
  #[error("未知模式: {0}")]
  InvalidMode(String),
  #[error("第 {line} 行: {source}")]
  Line {
    line: usize,
    #[source]
    source: Box<EventParseError>,
  },
}

/// 页面收到的一次用户操作
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  /// 模式按钮
  Mode(Mode),
  /// 修改标签输入框
  Label(String),
  Down(Point),
  Move(Point),
  /// 松开鼠标，可附带本次提交的标签
  Up(Option<String>),
  /// 清空按钮
  Clear,
}

fn parse_point(name: &str, args: &str) -> Result<Point, EventParseError> {
  let invalid = || EventParseError::InvalidArguments(format!("{} {}", name, args));
  let mut parts = args.split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty());
  let x = parts.next().ok_or_else(invalid)?.parse::<f32>().map_err(|_| invalid())?;
  let y = parts.next().ok_or_else(invalid)?.parse::<f32>().map_err(|_| invalid())?;
  if parts.next().is_some() || !x.is_finite() || !y.is_finite() {
    return Err(invalid());
  }
  Ok(Point::new(x, y))
}

impl FromStr for Event {
  type Err = EventParseError;

  /// `mode draw-box` / `label cat` / `down 10 10` / `move 110,160` / `up [label]` / `clear`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() {
      return Err(EventParseError::Empty);
    }
    let (name, args) = match s.split_once(char::is_whitespace) {
      Some((name, args)) => (name, args.trim()),
      None => (s, ""),
    };

    match name {
      "mode" => Ok(Event::Mode(args.parse()?)),
      "label" => Ok(Event::Label(args.to_string())),
      "down" => Ok(Event::Down(parse_point(name, args)?)),
      "move" => Ok(Event::Move(parse_point(name, args)?)),
      "up" if args.is_empty() => Ok(Event::Up(None)),
      "up" => Ok(Event::Up(Some(args.to_string()))),
      "clear" if args.is_empty() => Ok(Event::Clear),
      "clear" => Err(EventParseError::InvalidArguments(s.to_string())),
      other => Err(EventParseError::UnknownEvent(other.to_string())),
    }
  }
}

/// 每行一个事件，忽略空行与 `#` 注释
pub fn parse_script(text: &str) -> Result<Vec<Event>, EventParseError> {
  text
    .lines()
    .enumerate()
    .filter(|(_, line)| {
      let line = line.trim();
      !line.is_empty() && !line.starts_with('#')
    })
    .map(|(idx, line)| {
      line.parse::<Event>().map_err(|e| EventParseError::Line {
        line: idx + 1,
        source: Box::new(e),
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_each_event_kind() {
    assert_eq!("mode draw-box".parse::<Event>(), Ok(Event::Mode(Mode::DrawBox)));
    assert_eq!("mode point".parse::<Event>(), Ok(Event::Mode(Mode::DrawPoint)));
    assert_eq!("label big cat".parse::<Event>(), Ok(Event::Label("big cat".into())));
    assert_eq!("down 10 20".parse::<Event>(), Ok(Event::Down(Point::new(10.0, 20.0))));
    assert_eq!("move 1.5,2".parse::<Event>(), Ok(Event::Move(Point::new(1.5, 2.0))));
    assert_eq!("up".parse::<Event>(), Ok(Event::Up(None)));
    assert_eq!("up dog".parse::<Event>(), Ok(Event::Up(Some("dog".into()))));
    assert_eq!("clear".parse::<Event>(), Ok(Event::Clear));
  }

  #[test]
  fn rejects_malformed_events() {
    assert_eq!("".parse::<Event>(), Err(EventParseError::Empty));
    assert_eq!(
      "jump 1 2".parse::<Event>(),
      Err(EventParseError::UnknownEvent("jump".into()))
    );
    assert_eq!(
      "mode polygon".parse::<Event>(),
      Err(EventParseError::InvalidMode("polygon".into()))
    );
    assert!("down 10".parse::<Event>().is_err());
    assert!("down 1 2 3".parse::<Event>().is_err());
    assert!("move x y".parse::<Event>().is_err());
    assert!("down inf 5".parse::<Event>().is_err());
    assert!("move 1 NaN".parse::<Event>().is_err());
  }

  #[test]
  fn script_skips_comments_and_reports_line() {
    let script = "# draw one box\nmode draw-box\n\ndown 10 10\nmove 110 160\nup\n";
    assert_eq!(parse_script(script).unwrap().len(), 4);

    let err = parse_script("mode draw-box\nwiggle\n").unwrap_err();
    assert_eq!(
      err,
      EventParseError::Line {
        line: 2,
        source: Box::new(EventParseError::UnknownEvent("wiggle".into())),
      }
    );
  }
}
