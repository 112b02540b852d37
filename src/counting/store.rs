// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪状态存储
//! Per-identity state: last vertical center + counted flag

use super::types::TrackId;
use std::collections::HashMap;

/// 单个跟踪ID的状态
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackRecord {
    /// 最近一次观测到的中心点 y
    pub last_center_y: f32,
    /// 是否已计数 (整个会话内至多一次)
    pub counted: bool,
}

/// ID → 状态, 会话内不删除记录
#[derive(Clone, Debug, Default)]
pub struct TrackStateStore {
    records: HashMap<TrackId, TrackRecord>,
}

impl TrackStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 没有记录说明是该ID的首次观测
    pub fn get(&self, identity: TrackId) -> Option<&TrackRecord> {
        self.records.get(&identity)
    }

    /// 新建 (counted=false) 或更新最近中心点
    pub fn upsert(&mut self, identity: TrackId, center_y: f32) {
        self.records
            .entry(identity)
            .and_modify(|r| r.last_center_y = center_y)
            .or_insert(TrackRecord {
                last_center_y: center_y,
                counted: false,
            });
    }

    /// 幂等; 未知ID不做任何事
    pub fn mark_counted(&mut self, identity: TrackId) {
        if let Some(record) = self.records.get_mut(&identity) {
            record.counted = true;
        }
    }

    pub fn is_counted(&self, identity: TrackId) -> bool {
        self.records.get(&identity).is_some_and(|r| r.counted)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn counted_len(&self) -> usize {
        self.records.values().filter(|r| r.counted).count()
    }
}
