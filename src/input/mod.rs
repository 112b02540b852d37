// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 跟踪结果输入系统 (Track Input System)
///
/// 独立工作线程, 负责读取追踪器输出并按帧序号重排
/// - TrackFileReader: JSON-lines 跟踪结果读取
/// - FrameSequencer:  乱序帧重排
pub mod sequencer;
pub mod track_file;

pub use sequencer::FrameSequencer;
pub use track_file::{parse_line, FrameRecord, TrackFileReader};
