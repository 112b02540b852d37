// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 过线判定
//! Decides whether two consecutive center positions straddle the line

use super::types::Direction;

/// 水平计数线, 会话内固定
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CountingLine {
    y: f32,
}

impl CountingLine {
    /// 画面中线, 取整到像素行
    pub fn from_frame_height(frame_height: u32) -> Self {
        Self {
            y: (frame_height / 2) as f32,
        }
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn classify(&self, prev_center_y: Option<f32>, curr_center_y: f32) -> Option<Direction> {
        classify(prev_center_y, curr_center_y, self.y)
    }
}

/// 首次观测 (prev 为空) 不构成穿越.
/// 恰好落在线上的中心点, 只有前一位置严格在另一侧时才算穿越.
pub fn classify(prev_center_y: Option<f32>, curr_center_y: f32, line_y: f32) -> Option<Direction> {
    let prev = prev_center_y?;
    if prev < line_y && curr_center_y >= line_y {
        Some(Direction::Down)
    } else if prev > line_y && curr_center_y <= line_y {
        Some(Direction::Up)
    } else {
        None
    }
}
