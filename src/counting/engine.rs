// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数引擎 (Counting Engine)
//!
//! 每个视频一个会话: start_session → process_frame × N → end_session.
//! 会话独占跟踪状态与计数, 帧必须按序号递增送入.

use super::category::CategoryMapper;
use super::classifier::CountingLine;
use super::store::TrackStateStore;
use super::types::{CrossingEvent, Tally, TrackedDetection};
use crate::config::{CountingConfig, FrameOrderPolicy};
use crate::error::{CountingError, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

/// 会话统计
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames: u64,
    pub detections: u64,
    pub unmapped: u64,   // 非计数类别
    pub untracked: u64,  // 没有追踪ID
    pub malformed: u64,  // 检测框非法
    pub replayed_frames: u64,
    pub dropped_frames: u64, // 乱序丢弃
    pub crossings: u64,
}

/// 单帧处理结果
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// 处理完本帧后的计数快照
    pub tally: Tally,
    /// 本帧产生的过线事件 (可能为空)
    pub events: Vec<CrossingEvent>,
    /// 乱序帧被丢弃 (仅 Warn 策略)
    pub dropped: bool,
}

struct Session {
    line: CountingLine,
    store: TrackStateStore,
    tally: Tally,
    last_frame: Option<u64>,
    stats: SessionStats,
}

pub struct CountingEngine {
    mapper: CategoryMapper,
    frame_order: FrameOrderPolicy,
    session: Option<Session>,
}

impl Default for CountingEngine {
    fn default() -> Self {
        Self::new(CategoryMapper::new())
    }
}

impl CountingEngine {
    pub fn new(mapper: CategoryMapper) -> Self {
        Self {
            mapper,
            frame_order: FrameOrderPolicy::default(),
            session: None,
        }
    }

    pub fn from_config(config: &CountingConfig) -> Self {
        let mapper = CategoryMapper::with_overrides(
            config.extra_labels.iter().map(|(label, category)| (label, *category)),
        );
        Self::new(mapper).with_frame_order(config.frame_order)
    }

    pub fn with_frame_order(mut self, policy: FrameOrderPolicy) -> Self {
        self.frame_order = policy;
        self
    }

    pub fn mapper(&self) -> &CategoryMapper {
        &self.mapper
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// 开始新会话, 返回计数线位置 (画面中线)
    pub fn start_session(&mut self, frame_height: u32) -> Result<f32> {
        if self.session.is_some() {
            return Err(CountingError::SessionMisuse("上一个会话尚未结束"));
        }
        if frame_height == 0 {
            return Err(CountingError::InvalidFrameHeight);
        }

        let line = CountingLine::from_frame_height(frame_height);
        self.session = Some(Session {
            line,
            store: TrackStateStore::new(),
            tally: Tally::new(),
            last_frame: None,
            stats: SessionStats::default(),
        });
        info!(frame_height, line_y = line.y(), "🚀 计数会话开始");
        Ok(line.y())
    }

    pub fn line_y(&self) -> Option<f32> {
        self.session.as_ref().map(|s| s.line.y())
    }

    pub fn tally(&self) -> Option<&Tally> {
        self.session.as_ref().map(|s| &s.tally)
    }

    pub fn stats(&self) -> Option<&SessionStats> {
        self.session.as_ref().map(|s| &s.stats)
    }

    /// 处理一帧的全部跟踪目标
    pub fn process_frame(
        &mut self,
        detections: &[TrackedDetection],
        frame_index: u64,
    ) -> Result<FrameReport> {
        let frame_order = self.frame_order;
        let session = self
            .session
            .as_mut()
            .ok_or(CountingError::SessionMisuse("process_frame 调用前未开始会话"))?;

        if frame_index == 0 {
            return Err(CountingError::InvalidFrameIndex(frame_index));
        }

        match session.last_frame {
            Some(last) if frame_index < last => {
                let err = CountingError::FrameOutOfOrder {
                    last,
                    got: frame_index,
                };
                match frame_order {
                    FrameOrderPolicy::Reject => return Err(err),
                    FrameOrderPolicy::Warn => {
                        warn!(error = %err, "⚠️ 丢弃乱序帧");
                        session.stats.dropped_frames += 1;
                        return Ok(FrameReport {
                            frame_index,
                            tally: session.tally.clone(),
                            events: Vec::new(),
                            dropped: true,
                        });
                    }
                }
            }
            Some(last) if frame_index == last => {
                debug!(frame_index, "重复处理同一帧");
                session.stats.replayed_frames += 1;
            }
            _ => {}
        }

        session.last_frame = Some(frame_index);
        session.stats.frames += 1;

        let mut events = Vec::new();
        for detection in detections {
            session.stats.detections += 1;

            let Some(category) = self.mapper.map(&detection.class_label) else {
                session.stats.unmapped += 1;
                continue;
            };

            let Some(identity) = detection.identity else {
                session.stats.untracked += 1;
                continue;
            };

            if !detection.bbox.is_finite() {
                let err = CountingError::MalformedDetection {
                    identity: Some(identity),
                    reason: format!("{:?}", detection.bbox),
                };
                warn!(frame_index, error = %err, "跳过非法检测框");
                session.stats.malformed += 1;
                continue;
            }

            let curr = detection.bbox.center_y();
            let record = session.store.get(identity).copied();
            let direction = session.line.classify(record.map(|r| r.last_center_y), curr);

            if let Some(direction) = direction {
                if record.is_some_and(|r| !r.counted) {
                    session.tally.record(category, direction);
                    session.store.mark_counted(identity);
                    session.stats.crossings += 1;
                    info!(
                        frame_index,
                        identity,
                        category = %category,
                        direction = %direction,
                        "🚗 目标过线"
                    );
                    events.push(CrossingEvent {
                        identity,
                        category,
                        direction,
                        frame_index,
                    });
                }
            }

            session.store.upsert(identity, curr);
        }

        Ok(FrameReport {
            frame_index,
            tally: session.tally.clone(),
            events,
            dropped: false,
        })
    }

    /// 结束会话并返回最终计数; 状态全部清空
    pub fn end_session(&mut self) -> Result<Tally> {
        let session = self
            .session
            .take()
            .ok_or(CountingError::SessionMisuse("end_session 调用前未开始会话"))?;

        info!(
            frames = session.stats.frames,
            tracks = session.store.len(),
            counted = session.store.counted_len(),
            crossings = session.stats.crossings,
            unmapped = session.stats.unmapped,
            malformed = session.stats.malformed,
            "✅ 计数会话结束"
        );
        Ok(session.tally)
    }
}
