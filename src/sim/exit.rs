//! 退出协议
//!
//! 每个分区维护本地引用计数；屏障上对所有分区的计数做 SUM 归约，
//! 归零时再对各分区的候选结束时间做 MAX 归约，得到一致的结束时间。

use super::activity::StopReason;
use super::error::{SimError, SimResult};
use super::id::PartitionId;
use super::time::SimTime;
use tracing::debug;

/// 分区本地的退出状态
#[derive(Debug, Default, Clone)]
pub struct Exit {
    refcount: u64,
    /// 累计 increment 次数；为 0 表示没有组件参与退出协议
    holds: u64,
    end_candidate: Option<SimTime>,
}

impl Exit {
    /// 组件请求保持仿真运行
    pub fn increment(&mut self) {
        self.refcount += 1;
        self.holds += 1;
        debug!(refcount = self.refcount, "退出引用计数 +1");
    }

    /// 组件声明自己已完成。计数归零时记录候选结束时间并返回 true。
    pub fn decrement(&mut self, partition: PartitionId, now: SimTime) -> SimResult<bool> {
        if self.refcount == 0 {
            return Err(SimError::RefcountUnderflow {
                partition,
                time: now,
            });
        }
        self.refcount -= 1;
        debug!(refcount = self.refcount, now = %now, "退出引用计数 -1");
        if self.refcount == 0 {
            self.end_candidate = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn refcount(&self) -> u64 {
        self.refcount
    }

    pub fn holds(&self) -> u64 {
        self.holds
    }

    pub fn end_candidate(&self) -> Option<SimTime> {
        self.end_candidate
    }

    pub(crate) fn restore(&mut self, refcount: u64, holds: u64, end_candidate: Option<SimTime>) {
        self.refcount = refcount;
        self.holds = holds;
        self.end_candidate = end_candidate;
    }
}

/// 一个分区（或合并后的一组分区）在屏障上贡献的归约值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    // SUM
    pub refcount: u64,
    pub holds: u64,
    // MAX
    pub end_candidate: u64,
    pub last_event: u64,
    pub signal: u64,
    pub error: u64,
    // MIN
    pub next_time: u64,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            refcount: 0,
            holds: 0,
            end_candidate: 0,
            last_event: 0,
            signal: 0,
            error: 0,
            next_time: u64::MAX,
        }
    }
}

/// 屏障之后所有分区得出的同一个结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue { next_sync: SimTime },
    Stop { reason: StopReason, end_time: SimTime },
    Abort,
}

impl Tally {
    pub fn merge(&mut self, other: &Tally) {
        self.refcount = self.refcount.saturating_add(other.refcount);
        self.holds = self.holds.saturating_add(other.holds);
        self.end_candidate = self.end_candidate.max(other.end_candidate);
        self.last_event = self.last_event.max(other.last_event);
        self.signal = self.signal.max(other.signal);
        self.error = self.error.max(other.error);
        self.next_time = self.next_time.min(other.next_time);
    }

    pub fn sum_part(&self) -> [u64; 2] {
        [self.refcount, self.holds]
    }

    pub fn max_part(&self) -> [u64; 4] {
        [self.end_candidate, self.last_event, self.signal, self.error]
    }

    pub fn min_part(&self) -> [u64; 1] {
        [self.next_time]
    }

    /// 由三次归约的结果重新组装
    pub fn from_parts(sum: &[u64], max: &[u64], min: &[u64]) -> Option<Tally> {
        match (sum, max, min) {
            (
                [refcount, holds],
                [end_candidate, last_event, signal, error],
                [next_time],
            ) => Some(Tally {
                refcount: *refcount,
                holds: *holds,
                end_candidate: *end_candidate,
                last_event: *last_event,
                signal: *signal,
                error: *error,
                next_time: *next_time,
            }),
            _ => None,
        }
    }

    /// 由全局归约值得出结论。`interval` 是前瞻窗口，`end_time` 是 run() 的结束时间。
    ///
    /// 下一次同步不会越过 `end_time + 1`，以便所有分区在结束时间之后一起停下。
    pub fn decide(&self, interval: SimTime, end_time: SimTime) -> Verdict {
        if self.error > 0 {
            return Verdict::Abort;
        }
        if self.signal > 0 {
            return Verdict::Stop {
                reason: StopReason::Signal,
                end_time: SimTime(self.last_event),
            };
        }
        if self.holds > 0 && self.refcount == 0 {
            return Verdict::Stop {
                reason: StopReason::Exit,
                end_time: SimTime(self.end_candidate),
            };
        }
        if self.next_time == u64::MAX {
            return Verdict::Stop {
                reason: StopReason::Quiescent,
                end_time: SimTime(self.last_event),
            };
        }
        if SimTime(self.next_time) > end_time {
            return Verdict::Stop {
                reason: StopReason::EndTime,
                end_time,
            };
        }
        let cap = end_time.saturating_add(SimTime(1));
        Verdict::Continue {
            next_sync: SimTime(self.next_time).saturating_add(interval).min(cap),
        }
    }
}
