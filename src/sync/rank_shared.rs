//! 一个 rank 内所有线程共享的同步状态
//!
//! 包含线程计数屏障、发往其他 rank 的出站队列、各线程的入站队列、
//! 远端链路分发表以及屏障归约用的槽位。分发表在装配阶段建立，之后只读。

use super::rank_queue::RankSyncQueue;
use super::thread_queue::ThreadSyncQueue;
use super::wire::{self, EventTypeRegistry, WireError};
use crate::sim::{
    Activity, ConfigError, Event, HandlerKey, LinkId, PartitionId, Priority, SimError, SimResult,
    SimTime, Tally,
};
use crate::transport::{ReduceOp, Transport, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use tracing::trace;

/// 远端链路在接收 rank 上的落点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTarget {
    pub thread: u32,
    pub handler: HandlerKey,
}

/// rank 级别的故障，rank 内所有线程都会看到同一个
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankFault {
    Transport(TransportError),
    Wire(WireError),
}

impl From<RankFault> for SimError {
    fn from(fault: RankFault) -> Self {
        match fault {
            RankFault::Transport(e) => SimError::Transport(e),
            RankFault::Wire(e) => SimError::Serialization(e),
        }
    }
}

pub struct RankShared {
    rank: u32,
    ranks: u32,
    threads: u32,
    group: Barrier,
    rank_queues: Vec<Mutex<RankSyncQueue>>,
    inboxes: Vec<Mutex<ThreadSyncQueue>>,
    demux: HashMap<LinkId, RemoteTarget>,
    event_types: Arc<EventTypeRegistry>,
    tally: Mutex<Tally>,
    latency: Mutex<u64>,
    global: Mutex<Option<Result<Tally, RankFault>>>,
    global_latency: Mutex<Option<Result<u64, TransportError>>>,
}

impl RankShared {
    pub fn new(
        rank: u32,
        ranks: u32,
        threads: u32,
        demux: HashMap<LinkId, RemoteTarget>,
        event_types: Arc<EventTypeRegistry>,
    ) -> Self {
        let threads = threads.max(1);
        Self {
            rank,
            ranks: ranks.max(1),
            threads,
            group: Barrier::new(threads as usize),
            rank_queues: (0..ranks.max(1))
                .map(|_| Mutex::new(RankSyncQueue::new()))
                .collect(),
            inboxes: (0..threads)
                .map(|_| Mutex::new(ThreadSyncQueue::default()))
                .collect(),
            demux,
            event_types,
            tally: Mutex::new(Tally::default()),
            latency: Mutex::new(u64::MAX),
            global: Mutex::new(None),
            global_latency: Mutex::new(None),
        }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn threads(&self) -> u32 {
        self.threads
    }

    /// 线程计数屏障
    pub fn wait(&self) {
        self.group.wait();
    }

    /// 把跨分区事件交给目标：同 rank 直接放进目标线程的入站队列，
    /// 否则序列化进对应 rank 的出站队列。
    ///
    /// 未登记的事件类型在两条路径上都是 `Serialization` 错误。
    pub fn route(
        &self,
        dest: PartitionId,
        time: SimTime,
        priority: Priority,
        event: Event,
    ) -> SimResult<()> {
        if !self.event_types.contains(event.ty) {
            return Err(WireError::UnknownType(event.ty.tag()).into());
        }
        let missing = || {
            SimError::from(ConfigError::Partitioning(format!(
                "partition {dest} does not exist"
            )))
        };
        if dest.rank == self.rank {
            let inbox = self.inboxes.get(dest.thread as usize).ok_or_else(missing)?;
            inbox.lock().push(Activity::event(time, priority, event));
        } else {
            let queue = self.rank_queues.get(dest.rank as usize).ok_or_else(missing)?;
            queue.lock().push(time, priority, &event)?;
        }
        Ok(())
    }

    /// 0 号线程调用：序列化出站队列，与其他 rank 交换，解码并分发到各线程入站队列。
    pub fn exchange(&self, transport: &mut dyn Transport) -> Result<usize, RankFault> {
        let outgoing: Vec<Vec<u8>> = (0..self.ranks)
            .map(|r| {
                if r == self.rank {
                    Vec::new()
                } else {
                    self.rank_queues[r as usize].lock().take_buffer()
                }
            })
            .collect();

        let incoming = transport.exchange(outgoing).map_err(RankFault::Transport)?;
        let mut delivered = 0;
        for (src, buf) in incoming {
            let events = wire::decode_buffer(&buf, &self.event_types).map_err(RankFault::Wire)?;
            trace!(src, count = events.len(), "解码远端缓冲区");
            for ev in events {
                let target = self
                    .demux
                    .get(&ev.link)
                    .copied()
                    .ok_or(RankFault::Wire(WireError::UnknownLink(ev.link)))?;
                let activity = Activity::event(
                    ev.time,
                    ev.priority,
                    Event {
                        link: ev.link,
                        ty: ev.ty,
                        payload: ev.payload,
                        handler: target.handler,
                    },
                );
                self.inboxes[target.thread as usize].lock().push(activity);
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub fn drain_inbox(&self, thread: u32) -> Vec<Activity> {
        self.inboxes
            .get(thread as usize)
            .map(|inbox| inbox.lock().drain())
            .unwrap_or_default()
    }

    pub fn contribute(&self, local: &Tally) {
        self.tally.lock().merge(local);
    }

    /// 取出 rank 内合并后的归约值并复位
    pub fn take_tally(&self) -> Tally {
        std::mem::take(&mut *self.tally.lock())
    }

    pub fn publish(&self, result: Result<Tally, RankFault>) {
        *self.global.lock() = Some(result);
    }

    pub fn global(&self) -> Option<Result<Tally, RankFault>> {
        self.global.lock().clone()
    }

    pub fn contribute_latency(&self, local: u64) {
        let mut slot = self.latency.lock();
        *slot = (*slot).min(local);
    }

    /// 0 号线程调用：把 rank 内最小前瞻与其他 rank 做 MIN 归约并发布
    pub fn reduce_latency(&self, transport: &mut dyn Transport) {
        let local = std::mem::replace(&mut *self.latency.lock(), u64::MAX);
        let result = transport
            .all_reduce(&[local], ReduceOp::Min)
            .map(|v| v.first().copied().unwrap_or(u64::MAX));
        *self.global_latency.lock() = Some(result);
    }

    pub fn global_latency(&self) -> Option<Result<u64, TransportError>> {
        self.global_latency.lock().clone()
    }
}

/// 三次全归约：SUM、MAX、MIN
pub(crate) fn reduce_global(
    transport: &mut dyn Transport,
    tally: &Tally,
) -> Result<Tally, TransportError> {
    let sum = transport.all_reduce(&tally.sum_part(), ReduceOp::Sum)?;
    let max = transport.all_reduce(&tally.max_part(), ReduceOp::Max)?;
    let min = transport.all_reduce(&tally.min_part(), ReduceOp::Min)?;
    Tally::from_parts(&sum, &max, &min).ok_or(TransportError::LengthMismatch {
        expected: 7,
        got: sum.len() + max.len() + min.len(),
    })
}
