// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use crate::counting::TrackId;

/// 计数引擎错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CountingError {
    /// 检测框缺失或非法, 该检测不参与计数
    #[error("检测数据非法 (track {identity:?}): {reason}")]
    MalformedDetection {
        identity: Option<TrackId>,
        reason: String,
    },

    /// 宿主调用顺序错误
    #[error("会话使用错误: {0}")]
    SessionMisuse(&'static str),

    #[error("帧乱序: 上一帧 {last}, 当前帧 {got}")]
    FrameOutOfOrder { last: u64, got: u64 },

    #[error("帧序号从1开始, 收到 {0}")]
    InvalidFrameIndex(u64),

    #[error("画面高度必须大于0")]
    InvalidFrameHeight,
}

pub type Result<T> = std::result::Result<T, CountingError>;
