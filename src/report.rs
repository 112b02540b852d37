// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数报告 (JSON) 与终端表格输出

use crate::counting::{CountedCategory, CrossingEvent, SessionStats, Tally};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// 一次计数会话的完整结果
#[derive(Clone, Debug, Serialize)]
pub struct CountingReport {
    pub generated_at: String,
    pub source: String,
    pub frame_height: u32,
    pub line_y: f32,
    pub frames_processed: u64,
    /// 被取消时 tally 为部分结果
    pub cancelled: bool,
    pub tally: Tally,
    pub events: Vec<CrossingEvent>,
    pub stats: SessionStats,
    /// 读取阶段丢弃的非法检测
    pub malformed_input: usize,
}

impl CountingReport {
    /// 写入 `<dir>/report_<timestamp>.json`
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("创建输出目录失败: {}", dir.display()))?;
        let path = dir.join(format!("report_{}.json", crate::gen_time_string()));
        let json = serde_json::to_string_pretty(self).context("序列化报告失败")?;
        fs::write(&path, json).with_context(|| format!("写入报告失败: {}", path.display()))?;
        info!(path = %path.display(), "💾 报告已保存");
        Ok(path)
    }
}

/// 终端表格, 顺序与HUD一致
pub fn format_tally(tally: &Tally) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:>6} | {:<6}", "TYPE", "IN", "OUT");
    let _ = writeln!(out, "{}", "-".repeat(28));
    for category in CountedCategory::DISPLAY_ORDER {
        let count = tally.get(category);
        let _ = writeln!(
            out,
            "{:<12} {:>6} | {:<6}",
            category.name(),
            count.inbound,
            count.outbound
        );
    }
    out
}
