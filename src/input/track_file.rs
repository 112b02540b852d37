// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪结果文件读取
//!
//! 每行一个JSON对象, 对应一帧:
//! `{"frame": 12, "detections": [{"id": 7, "label": "car", "bbox": [x1, y1, x2, y2], "conf": 0.8}]}`

use super::sequencer::FrameSequencer;
use crate::counting::{BBox, TrackId, TrackedDetection};
use crate::error::CountingError;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// 乱序重排窗口 (帧)
pub const REORDER_WINDOW: usize = 64;

#[derive(Debug, Deserialize)]
struct RawFrame {
    frame: u64,
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(default)]
    id: Option<serde_json::Value>,
    label: String,
    #[serde(default)]
    bbox: Option<serde_json::Value>,
    #[serde(default)]
    conf: Option<serde_json::Value>,
}

/// 追踪器输出的ID可能是整数或整数值的浮点数; 其他类型视为无ID
fn parse_identity(value: &serde_json::Value) -> Option<TrackId> {
    if let Some(id) = value.as_u64() {
        return Some(id);
    }
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Some(f as u64),
        _ => None,
    }
}

/// 检测框必须是4个数字组成的数组
fn parse_bbox(value: Option<&serde_json::Value>) -> Result<[f32; 4], String> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Err("缺少检测框".to_string());
    };
    let Some(items) = value.as_array() else {
        return Err(format!("检测框不是数组: {}", value));
    };
    if items.len() != 4 {
        return Err(format!("检测框需要4个坐标, 收到 {}", items.len()));
    }

    let mut coords = [0.0f32; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        let v = item
            .as_f64()
            .ok_or_else(|| format!("检测框坐标不是数字: {}", item))?;
        *slot = v as f32;
    }
    Ok(coords)
}

impl TryFrom<RawDetection> for TrackedDetection {
    type Error = CountingError;

    fn try_from(raw: RawDetection) -> Result<Self, Self::Error> {
        let identity = raw.id.as_ref().and_then(parse_identity);
        if identity.is_none() && raw.id.as_ref().is_some_and(|v| !v.is_null()) {
            debug!(id = ?raw.id, "无法识别的追踪ID, 按未追踪处理");
        }

        let coords = parse_bbox(raw.bbox.as_ref()).map_err(|reason| {
            CountingError::MalformedDetection { identity, reason }
        })?;
        let [x1, y1, x2, y2] = coords;

        let detection = TrackedDetection::new(identity, raw.label, BBox::new(x1, y1, x2, y2));
        Ok(match raw.conf.as_ref().and_then(|v| v.as_f64()) {
            Some(conf) => detection.with_confidence(conf as f32),
            None => detection,
        })
    }
}

/// 一帧的跟踪结果
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub frame_index: u64,
    pub detections: Vec<TrackedDetection>,
    /// 解析时丢弃的非法检测数
    pub malformed: usize,
}

/// 解析一行; 空行返回 None
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<FrameRecord>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let raw: RawFrame =
        serde_json::from_str(line).with_context(|| format!("第 {} 行不是合法的帧记录", line_no))?;

    let mut malformed = 0;
    let mut detections = Vec::with_capacity(raw.detections.len());
    for raw_det in raw.detections {
        match TrackedDetection::try_from(raw_det) {
            Ok(det) => detections.push(det),
            Err(e) => {
                warn!(line = line_no, frame = raw.frame, error = %e, "跳过非法检测");
                malformed += 1;
            }
        }
    }

    Ok(Some(FrameRecord {
        frame_index: raw.frame,
        detections,
        malformed,
    }))
}

/// 跟踪结果文件读取器 (独立线程)
pub struct TrackFileReader {
    path: PathBuf,
    capacity: usize,
}

impl TrackFileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            capacity: 16,
        }
    }

    /// 通道容量 (帧)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 在当前线程读完整个文件, 按帧序号重排后返回
    pub fn read_all(&self) -> Result<Vec<FrameRecord>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.run(&tx);
        drop(tx);
        rx.into_iter().collect()
    }

    /// 启动读取线程; 帧按序号升序到达, 出错时发送 Err 后结束
    pub fn spawn(self) -> Receiver<Result<FrameRecord>> {
        let (tx, rx) = bounded(self.capacity);
        std::thread::spawn(move || guarded(&tx, || self.run(&tx)));
        rx
    }

    fn run(&self, tx: &Sender<Result<FrameRecord>>) {
        info!(path = %self.path().display(), "📂 开始读取跟踪结果");
        if let Err(e) = self.read_into(tx) {
            let _ = tx.send(Err(e));
        }
    }

    fn read_into(&self, tx: &Sender<Result<FrameRecord>>) -> Result<()> {
        let file = File::open(&self.path)
            .with_context(|| format!("无法打开跟踪结果文件: {}", self.path.display()))?;
        let reader = BufReader::new(file);
        let mut sequencer = FrameSequencer::new(1, REORDER_WINDOW);
        let mut frames = 0usize;

        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = line.with_context(|| format!("读取第 {} 行失败", line_no))?;
            let Some(record) = parse_line(&line, line_no)? else {
                continue;
            };

            match sequencer.push(record.frame_index, record) {
                Ok(released) => {
                    for (_, record) in released {
                        frames += 1;
                        if tx.send(Ok(record)).is_err() {
                            // 接收端已退出 (取消)
                            return Ok(());
                        }
                    }
                }
                Err(stale) => {
                    warn!(
                        line = line_no,
                        frame = stale.frame_index,
                        cursor = sequencer.cursor(),
                        "⚠️ 丢弃过期或重复的帧"
                    );
                }
            }
        }

        for (_, record) in sequencer.flush() {
            frames += 1;
            if tx.send(Ok(record)).is_err() {
                return Ok(());
            }
        }

        info!(frames, "✅ 跟踪结果读取完毕");
        Ok(())
    }
}

/// 读取线程异常退出时向接收端发送错误, 通道关闭不会被当成读取完毕
fn guarded(tx: &Sender<Result<FrameRecord>>, work: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "未知错误".to_string());
        error!(reason = %reason, "❌ 读取线程异常退出");
        let _ = tx.send(Err(anyhow!("跟踪结果读取线程异常退出: {}", reason)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_line() {
        let line = r#"{"frame": 3, "detections": [{"id": 7, "label": "car", "bbox": [0, 40, 10, 60], "conf": 0.9}]}"#;
        let record = parse_line(line, 1).unwrap().unwrap();
        assert_eq!(record.frame_index, 3);
        assert_eq!(record.detections.len(), 1);
        let det = &record.detections[0];
        assert_eq!(det.identity, Some(7));
        assert_eq!(det.class_label, "car");
        assert_eq!(det.bbox.center_y(), 50.0);
        assert_eq!(det.confidence, Some(0.9));
    }

    #[test]
    fn test_float_and_missing_ids() {
        let line = r#"{"frame": 1, "detections": [
            {"id": 7.0, "label": "car", "bbox": [0, 0, 1, 1]},
            {"label": "car", "bbox": [0, 0, 1, 1]},
            {"id": "abc", "label": "car", "bbox": [0, 0, 1, 1]},
            {"id": 1.5, "label": "car", "bbox": [0, 0, 1, 1]}
        ]}"#;
        let line = line.replace('\n', " ");
        let record = parse_line(&line, 1).unwrap().unwrap();
        let ids: Vec<_> = record.detections.iter().map(|d| d.identity).collect();
        assert_eq!(ids, vec![Some(7), None, None, None]);
    }

    #[test]
    fn test_malformed_bbox_dropped() {
        let line = r#"{"frame": 2, "detections": [{"id": 1, "label": "car"}, {"id": 2, "label": "bus", "bbox": [1, 2, 3]}, {"id": 3, "label": "bus", "bbox": [1, 2, 3, 4]}]}"#;
        let record = parse_line(line, 1).unwrap().unwrap();
        assert_eq!(record.malformed, 2);
        assert_eq!(record.detections.len(), 1);
        assert_eq!(record.detections[0].identity, Some(3));
    }

    #[test]
    fn test_blank_and_invalid_lines() {
        assert!(parse_line("   ", 1).unwrap().is_none());
        assert!(parse_line("{oops", 2).is_err());
    }

    #[test]
    fn test_reader_reorders_frames() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"frame": 2, "detections": []}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"frame": 1, "detections": []}}"#).unwrap();
        writeln!(file, r#"{{"frame": 4, "detections": []}}"#).unwrap();
        file.flush().unwrap();

        let frames = TrackFileReader::new(file.path()).read_all().unwrap();
        let indices: Vec<_> = frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![1, 2, 4]);
    }

    #[test]
    fn test_spawned_reader() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 1..=5 {
            writeln!(file, r#"{{"frame": {}, "detections": []}}"#, i).unwrap();
        }
        file.flush().unwrap();

        let rx = TrackFileReader::new(file.path()).with_capacity(2).spawn();
        let indices: Vec<_> = rx.iter().map(|r| r.unwrap().frame_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_missing_file() {
        let result = TrackFileReader::new("/nonexistent/tracks.jsonl").read_all();
        assert!(result.is_err());
    }

    #[test]
    fn test_non_numeric_bbox_is_skipped() {
        let line = r#"{"frame": 1, "detections": [{"id": 1, "label": "car", "bbox": [0, null, 10, 10]}, {"id": 2, "label": "car", "bbox": [0, "y", 10, 10]}, {"id": 3, "label": "bus", "bbox": "0,0,1,1"}, {"id": 4, "label": "truck", "bbox": [0, 40, 10, 60], "conf": "high"}]}"#;
        let record = parse_line(line, 1).unwrap().unwrap();
        assert_eq!(record.malformed, 3);
        assert_eq!(record.detections.len(), 1);
        assert_eq!(record.detections[0].identity, Some(4));
        assert_eq!(record.detections[0].confidence, None);
    }

    #[test]
    fn test_reader_handles_last_frame_index() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"frame": 1, "detections": []}}"#).unwrap();
        writeln!(file, r#"{{"frame": {}, "detections": []}}"#, u64::MAX).unwrap();
        file.flush().unwrap();

        let rx = TrackFileReader::new(file.path()).spawn();
        let indices: Vec<_> = rx.iter().map(|r| r.unwrap().frame_index).collect();
        assert_eq!(indices, vec![1, u64::MAX]);
    }

    #[test]
    fn test_reader_panic_reaches_receiver() {
        let (tx, rx) = bounded(4);
        guarded(&tx, || panic!("磁盘损坏"));
        drop(tx);
        let results: Vec<_> = rx.iter().collect();
        assert_eq!(results.len(), 1);
        let err = results[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("磁盘损坏"));
    }
}
