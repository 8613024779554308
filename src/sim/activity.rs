//! 活动
//!
//! 定义时间漩涡中排队的活动（事件、时钟节拍、动作）及其全序比较。

use super::id::{HandlerKey, LinkId};
use super::priority::Priority;
use super::time::SimTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// 事件类型标签：名字的 FNV-1a 32 位散列，跨重启稳定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(pub u32);

impl EventType {
    pub const fn named(name: &str) -> EventType {
        let bytes = name.as_bytes();
        let mut hash: u32 = 0x811c_9dc5;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(0x0100_0193);
            i += 1;
        }
        EventType(hash)
    }

    pub fn tag(self) -> u32 {
        self.0
    }
}

/// 经由链路交付给处理器的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub link: LinkId,
    pub ty: EventType,
    pub payload: Vec<u8>,
    /// 接收端处理器；跨分区时由接收方根据链路 tag 重建
    pub handler: HandlerKey,
}

/// 周期性时钟节拍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub handler: HandlerKey,
    pub period: SimTime,
}

/// 仿真为什么停下来
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 到达 run() 指定的结束时间
    EndTime,
    /// 所有分区的退出引用计数归零
    Exit,
    /// 全局没有待处理的活动
    Quiescent,
    /// 收到 SIGINT/SIGTERM
    Signal,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::EndTime => "end_time",
            StopReason::Exit => "exit",
            StopReason::Quiescent => "quiescent",
            StopReason::Signal => "signal",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 调度器自己处理的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SyncBarrier,
    ExitCheck,
    Checkpoint,
    Stop { reason: StopReason, end_time: SimTime },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityKind {
    Event(Event),
    ClockTick(ClockTick),
    Action(Action),
}

/// 调度活动，包含交付时间、优先级、插入序号和具体内容。
#[derive(Debug, Clone)]
pub struct Activity {
    pub(crate) time: SimTime,
    pub(crate) priority: Priority,
    pub(crate) seq: u64,
    pub(crate) kind: ActivityKind,
}

impl Activity {
    /// 插入序号由所属分区的时间漩涡在 insert 时分配。
    pub fn new(time: SimTime, priority: Priority, kind: ActivityKind) -> Self {
        Self {
            time,
            priority,
            seq: 0,
            kind,
        }
    }

    pub fn event(time: SimTime, priority: Priority, event: Event) -> Self {
        Self::new(time, priority, ActivityKind::Event(event))
    }

    pub fn clock_tick(time: SimTime, priority: Priority, tick: ClockTick) -> Self {
        Self::new(time, priority, ActivityKind::ClockTick(tick))
    }

    pub fn action(time: SimTime, priority: Priority, action: Action) -> Self {
        Self::new(time, priority, ActivityKind::Action(action))
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn kind(&self) -> &ActivityKind {
        &self.kind
    }

    pub fn into_kind(self) -> ActivityKind {
        self.kind
    }

    /// 模型活动（事件与时钟节拍），区别于调度器内部动作。
    pub fn is_model(&self) -> bool {
        !matches!(self.kind, ActivityKind::Action(_))
    }

    /// 全序键 (time, priority, seq)
    pub fn key(&self) -> (SimTime, Priority, u64) {
        (self.time, self.priority, self.seq)
    }
}

// BinaryHeap 是 max-heap；我们需要最小键优先，因此反向比较。
impl Ord for Activity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key()).reverse()
    }
}

impl PartialOrd for Activity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Activity {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Activity {}
