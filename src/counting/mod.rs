// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 过线计数系统 (Line-Crossing Counting)
///
/// 消费逐帧的跟踪结果, 按类别统计穿越中线的目标
/// - CategoryMapper:  类别映射
/// - TrackStateStore: 跟踪状态
/// - classify:        过线判定
/// - CountingEngine:  计数引擎
pub mod category;
pub mod classifier;
pub mod engine;
pub mod store;
pub mod types;

pub use category::CategoryMapper;
pub use classifier::{classify, CountingLine};
pub use engine::{CountingEngine, FrameReport, SessionStats};
pub use store::{TrackRecord, TrackStateStore};
pub use types::{
    BBox, CategoryCount, CountedCategory, CrossingEvent, Direction, Tally, TrackId,
    TrackedDetection,
};
