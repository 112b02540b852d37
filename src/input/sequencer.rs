// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧重排序缓冲
//! Re-serializes frames that arrive out of order into strict index order

use std::collections::BTreeMap;
use tracing::debug;

/// 按帧序号重排: 只按升序释放, 落后于游标的帧被拒绝.
/// 缓冲超过 `window` 帧时认为缺失的帧不会再来, 跳过空洞继续释放.
pub struct FrameSequencer<T> {
    next: u64,
    window: usize,
    pending: BTreeMap<u64, T>,
    /// u64::MAX 已释放, 之后的帧全部过期
    exhausted: bool,
}

impl<T> FrameSequencer<T> {
    /// `first`: 第一个期望的帧序号
    pub fn new(first: u64, window: usize) -> Self {
        Self {
            next: first,
            window: window.max(1),
            pending: BTreeMap::new(),
            exhausted: false,
        }
    }

    /// 下一个期望的帧序号
    pub fn cursor(&self) -> u64 {
        self.next
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// 放入一帧, 返回此刻可以按序释放的帧.
    /// 已经释放过的序号或重复序号返回 `Err(item)`.
    pub fn push(&mut self, index: u64, item: T) -> Result<Vec<(u64, T)>, T> {
        if self.exhausted || index < self.next || self.pending.contains_key(&index) {
            return Err(item);
        }
        self.pending.insert(index, item);

        let mut released = self.drain_contiguous();
        while self.pending.len() > self.window {
            if let Some((&first, _)) = self.pending.first_key_value() {
                debug!(from = self.next, to = first, "跳过缺失帧");
                self.next = first;
            }
            released.extend(self.drain_contiguous());
        }
        Ok(released)
    }

    /// 输入结束: 按升序释放剩余帧 (允许空洞)
    pub fn flush(&mut self) -> Vec<(u64, T)> {
        let rest = std::mem::take(&mut self.pending);
        if let Some((&last, _)) = rest.last_key_value() {
            self.advance_past(last);
        }
        rest.into_iter().collect()
    }

    fn drain_contiguous(&mut self) -> Vec<(u64, T)> {
        let mut out = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            out.push((self.next, item));
            self.advance_past(self.next);
            if self.exhausted {
                break;
            }
        }
        out
    }

    fn advance_past(&mut self, index: u64) {
        match index.checked_add(1) {
            Some(next) => self.next = next,
            None => {
                self.next = u64::MAX;
                self.exhausted = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(v: &[(u64, &str)]) -> Vec<u64> {
        v.iter().map(|(i, _)| *i).collect()
    }

    #[test]
    fn test_in_order_passthrough() {
        let mut seq = FrameSequencer::new(1, 8);
        assert_eq!(indices(&seq.push(1, "a").unwrap()), vec![1]);
        assert_eq!(indices(&seq.push(2, "b").unwrap()), vec![2]);
        assert_eq!(seq.cursor(), 3);
    }

    #[test]
    fn test_reorders() {
        let mut seq = FrameSequencer::new(1, 8);
        assert!(seq.push(3, "c").unwrap().is_empty());
        assert!(seq.push(2, "b").unwrap().is_empty());
        assert_eq!(indices(&seq.push(1, "a").unwrap()), vec![1, 2, 3]);
        assert_eq!(seq.pending(), 0);
    }

    #[test]
    fn test_rejects_stale_and_duplicate() {
        let mut seq = FrameSequencer::new(1, 8);
        seq.push(1, "a").unwrap();
        assert_eq!(seq.push(1, "again"), Err("again"));
        seq.push(5, "e").unwrap();
        assert_eq!(seq.push(5, "dup"), Err("dup"));
    }

    #[test]
    fn test_window_skips_gap() {
        let mut seq = FrameSequencer::new(1, 2);
        assert!(seq.push(2, "b").unwrap().is_empty());
        assert!(seq.push(3, "c").unwrap().is_empty());
        // 第三个缓冲帧超过窗口, 放弃等待帧1
        assert_eq!(indices(&seq.push(4, "d").unwrap()), vec![2, 3, 4]);
        assert_eq!(seq.push(1, "late"), Err("late"));
    }

    #[test]
    fn test_flush_with_gaps() {
        let mut seq = FrameSequencer::new(1, 16);
        seq.push(4, "d").unwrap();
        seq.push(2, "b").unwrap();
        assert_eq!(indices(&seq.flush()), vec![2, 4]);
        assert_eq!(seq.cursor(), 5);
    }

    #[test]
    fn test_last_possible_index() {
        let mut seq = FrameSequencer::new(u64::MAX - 1, 8);
        assert_eq!(indices(&seq.push(u64::MAX, "z").unwrap()), Vec::<u64>::new());
        assert_eq!(
            indices(&seq.push(u64::MAX - 1, "y").unwrap()),
            vec![u64::MAX - 1, u64::MAX]
        );
        assert_eq!(seq.push(u64::MAX, "again"), Err("again"));

        let mut seq = FrameSequencer::new(1, 8);
        seq.push(1, "a").unwrap();
        seq.push(u64::MAX, "z").unwrap();
        assert_eq!(indices(&seq.flush()), vec![u64::MAX]);
        assert_eq!(seq.push(7, "late"), Err("late"));
    }
}
