// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 过线计数数据结构定义
//! Data structures for the line-crossing counter

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 跟踪ID (由外部追踪器分配)
pub type TrackId = u64;

// ========== 输入 ==========

/// 检测框 (x1, y1, x2, y2), 像素坐标, y 向下增长
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 四个坐标都是有限值 (退化框也算合法)
    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// 中心点, 取整到像素 (向零截断)
    pub fn center(&self) -> (f32, f32) {
        let cx = ((self.x1 + self.x2) / 2.0).trunc();
        let cy = ((self.y1 + self.y2) / 2.0).trunc();
        (cx, cy)
    }

    pub fn center_y(&self) -> f32 {
        self.center().1
    }
}

/// 单帧中的一个跟踪目标
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedDetection {
    /// 追踪ID; None 表示未被追踪, 只用于显示
    pub identity: Option<TrackId>,
    /// 检测器原始类别名
    pub class_label: String,
    pub bbox: BBox,
    /// 检测置信度 (计数不使用)
    pub confidence: Option<f32>,
}

impl TrackedDetection {
    pub fn new(identity: Option<TrackId>, class_label: impl Into<String>, bbox: BBox) -> Self {
        Self {
            identity,
            class_label: class_label.into(),
            bbox,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

// ========== 类别与方向 ==========

/// 参与计数的类别 (封闭集合)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountedCategory {
    Car,
    Motorcycle,
    Bus,
    Truck,
    Bicycle,
}

impl CountedCategory {
    pub const ALL: [CountedCategory; 5] = [
        CountedCategory::Car,
        CountedCategory::Motorcycle,
        CountedCategory::Bus,
        CountedCategory::Truck,
        CountedCategory::Bicycle,
    ];

    /// HUD 面板的显示顺序
    pub const DISPLAY_ORDER: [CountedCategory; 5] = [
        CountedCategory::Car,
        CountedCategory::Bus,
        CountedCategory::Truck,
        CountedCategory::Motorcycle,
        CountedCategory::Bicycle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CountedCategory::Car => "Car",
            CountedCategory::Motorcycle => "Motorcycle",
            CountedCategory::Bus => "Bus",
            CountedCategory::Truck => "Truck",
            CountedCategory::Bicycle => "Bicycle",
        }
    }
}

impl fmt::Display for CountedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 穿越方向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 自上而下 (计入 `in`)
    Down,
    /// 自下而上 (计入 `out`)
    Up,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Down => f.write_str("in"),
            Direction::Up => f.write_str("out"),
        }
    }
}

// ========== 输出 ==========

/// 单个类别的进出计数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    #[serde(rename = "in")]
    pub inbound: u64,
    #[serde(rename = "out")]
    pub outbound: u64,
}

impl CategoryCount {
    pub fn total(&self) -> u64 {
        self.inbound + self.outbound
    }
}

/// 各类别的累计计数, 只增不减
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    counts: BTreeMap<CountedCategory, CategoryCount>,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            counts: CountedCategory::ALL
                .iter()
                .map(|&c| (c, CategoryCount::default()))
                .collect(),
        }
    }
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: CountedCategory) -> CategoryCount {
        self.counts.get(&category).copied().unwrap_or_default()
    }

    pub fn record(&mut self, category: CountedCategory, direction: Direction) {
        let entry = self.counts.entry(category).or_default();
        match direction {
            Direction::Down => entry.inbound += 1,
            Direction::Up => entry.outbound += 1,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CountedCategory, CategoryCount)> + '_ {
        self.counts.iter().map(|(c, n)| (*c, *n))
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(CategoryCount::total).sum()
    }
}

/// 过线事件 (仅用于叠加显示与审计)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub identity: TrackId,
    pub category: CountedCategory,
    pub direction: Direction,
    pub frame_index: u64,
}
