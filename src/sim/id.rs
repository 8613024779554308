//! 标识符类型
//!
//! 定义分区、组件、端口、链路与处理器键的标识符。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 分区标识符：(rank, thread) 二元组。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId {
    pub rank: u32,
    pub thread: u32,
}

impl PartitionId {
    pub const SERIAL: PartitionId = PartitionId { rank: 0, thread: 0 };

    pub fn new(rank: u32, thread: u32) -> Self {
        Self { rank, thread }
    }

    /// 由线性序号 `q` 和每个 rank 的线程数计算分区。
    pub fn from_linear(q: u32, threads: u32) -> Self {
        let threads = threads.max(1);
        Self {
            rank: q / threads,
            thread: q % threads,
        }
    }

    pub fn linear(self, threads: u32) -> usize {
        self.rank as usize * threads.max(1) as usize + self.thread as usize
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}t{}", self.rank, self.thread)
    }
}

/// 组件标识符（全局唯一，按加入模型的顺序分配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u32);

/// 组件内的端口编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub u32);

/// 链路标识符（全局唯一；远端分区用它作为 tag 重建目标处理器）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub u64);

/// 处理器种类：事件端口或时钟 tag。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Port(PortId),
    Clock(u32),
}

/// 处理器键：活动通过它在分区本地的处理器表中找到回调。
///
/// 只由组件 id 和端口/时钟 tag 组成，因此在重启后仍然稳定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerKey {
    pub component: ComponentId,
    pub kind: HandlerKind,
}

impl HandlerKey {
    pub fn port(component: ComponentId, port: PortId) -> Self {
        Self {
            component,
            kind: HandlerKind::Port(port),
        }
    }

    pub fn clock(component: ComponentId, tag: u32) -> Self {
        Self {
            component,
            kind: HandlerKind::Clock(tag),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            HandlerKind::Port(p) => write!(f, "c{}:port{}", self.component.0, p.0),
            HandlerKind::Clock(tag) => write!(f, "c{}:clock{}", self.component.0, tag),
        }
    }
}
