//! 时间漩涡
//!
//! 每个分区私有的未来活动优先队列，按 (time, priority, insertion_seq) 全序出队。

use super::activity::Activity;
use super::error::{SimError, SimResult};
use super::id::PartitionId;
use super::time::SimTime;
use std::collections::BinaryHeap;
use tracing::trace;

/// 分区的活动队列。
///
/// 插入序号在 insert 时分配并严格递增，因此相同 (time, priority) 的活动按插入顺序出队。
/// 队列同时记录最近一次出队活动的时间，作为因果下界：早于它的插入会失败。
#[derive(Debug)]
pub struct TimeVortex {
    owner: PartitionId,
    heap: BinaryHeap<Activity>,
    next_seq: u64,
    floor: SimTime,
    max_depth: usize,
}

impl Default for TimeVortex {
    fn default() -> Self {
        Self::new(PartitionId::SERIAL)
    }
}

impl TimeVortex {
    pub fn new(owner: PartitionId) -> Self {
        Self {
            owner,
            heap: BinaryHeap::new(),
            next_seq: 0,
            floor: SimTime::ZERO,
            max_depth: 0,
        }
    }

    /// 插入活动并返回分配的插入序号。
    pub fn insert(&mut self, mut activity: Activity) -> SimResult<u64> {
        if activity.time < self.floor {
            return Err(SimError::CausalityViolation {
                partition: self.owner,
                time: activity.time,
                now: self.floor,
            });
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        activity.seq = seq;
        trace!(time = %activity.time, priority = activity.priority, seq, "活动入队");
        self.heap.push(activity);
        self.max_depth = self.max_depth.max(self.heap.len());
        Ok(seq)
    }

    /// 取出最小活动，并把当前时间推进到它的交付时间。
    pub fn pop(&mut self) -> SimResult<Activity> {
        let activity = self.heap.pop().ok_or(SimError::QueueEmpty)?;
        self.floor = activity.time;
        Ok(activity)
    }

    pub fn front(&self) -> SimResult<&Activity> {
        self.heap.peek().ok_or(SimError::QueueEmpty)
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// 队列长度的历史最大值
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// 最近一次出队活动的交付时间
    pub fn current_time(&self) -> SimTime {
        self.floor
    }

    /// 只用于从检查点恢复：直接设定时钟。
    pub(crate) fn restore_clock(&mut self, now: SimTime) {
        self.floor = now;
    }

    /// 以未指定的顺序拷贝当前所有活动（检查点/检查用）。
    pub fn get_contents(&self, out: &mut Vec<Activity>) {
        out.extend(self.heap.iter().cloned());
    }

    /// 最早的模型活动（事件或时钟节拍）的时间；没有则为 `SimTime::MAX`。
    ///
    /// 队首通常就是模型活动；只有队首是内部动作时才扫描整个堆。
    pub fn next_model_time(&self) -> SimTime {
        match self.heap.peek() {
            None => SimTime::MAX,
            Some(top) if top.is_model() => top.time,
            Some(_) => self
                .heap
                .iter()
                .filter(|a| a.is_model())
                .map(|a| a.time)
                .min()
                .unwrap_or(SimTime::MAX),
        }
    }
}
