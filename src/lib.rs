// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 计数配置参数
pub mod counting; // 过线计数引擎
pub mod enhance; // 图像增强
pub mod error; // 引擎错误类型
pub mod input; // 跟踪结果输入
pub mod overlay; // HUD 叠加渲染
pub mod pipeline; // 计数流水线
pub mod report; // 计数报告

pub use crate::config::{CountingConfig, FrameOrderPolicy, HudConfig};
pub use crate::counting::{
    BBox, CategoryMapper, CountedCategory, CountingEngine, CrossingEvent, Direction, FrameReport,
    Tally, TrackedDetection,
};
pub use crate::error::CountingError;
pub use crate::pipeline::{Pipeline, PipelineOptions, PipelineOutcome};

/// 本地时间戳, 用于输出文件命名: 20240131_235959
pub fn gen_time_string() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}
