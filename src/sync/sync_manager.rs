//! 同步管理器
//!
//! 保守同步：前瞻窗口为所有跨分区链路的最小延迟 `min_part_latency`。
//! 分区在 `last_sync + interval` 之前的活动可以不经同步直接执行；到达视界时
//! 所有分区进入同一个屏障，交换出站事件并就下一个视界（或终止）达成一致。

use super::rank_shared::{RankFault, RankShared, reduce_global};
use crate::sim::{PartitionId, SimError, SimResult, SimTime, Tally, TimeVortex, Verdict};
use crate::transport::Transport;
use std::sync::Arc;
use tracing::{debug, trace};

enum Mode {
    /// 单分区：归约就是本地读取
    Serial,
    Parallel {
        shared: Arc<RankShared>,
        /// 只有 rank 的 0 号线程持有传输端点
        transport: Option<Box<dyn Transport>>,
    },
}

pub struct SyncManager {
    id: PartitionId,
    mode: Mode,
    min_part_latency: Option<SimTime>,
    interval: SimTime,
    end_time: SimTime,
    last_sync: SimTime,
    next_sync: SimTime,
    barriers: u64,
    received: u64,
}

impl SyncManager {
    pub fn serial(id: PartitionId) -> Self {
        Self::with_mode(id, Mode::Serial)
    }

    pub fn parallel(
        id: PartitionId,
        shared: Arc<RankShared>,
        transport: Option<Box<dyn Transport>>,
    ) -> Self {
        Self::with_mode(id, Mode::Parallel { shared, transport })
    }

    fn with_mode(id: PartitionId, mode: Mode) -> Self {
        Self {
            id,
            mode,
            min_part_latency: None,
            interval: SimTime::MAX,
            end_time: SimTime::MAX,
            last_sync: SimTime::ZERO,
            next_sync: SimTime::MAX,
            barriers: 0,
            received: 0,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.mode, Mode::Parallel { .. })
    }

    /// 运行开始前的集合操作：对本地最小跨分区延迟做全局 MIN 归约。
    ///
    /// 没有任何跨分区链路时前瞻无穷大，改用 `idle_period` 作为屏障间隔，
    /// 这样退出检查和信号仍然有屏障可走。
    pub fn init(
        &mut self,
        local_min_latency: Option<SimTime>,
        idle_period: SimTime,
        start: SimTime,
        end_time: SimTime,
    ) -> SimResult<()> {
        self.end_time = end_time;
        self.last_sync = start;
        match &mut self.mode {
            Mode::Serial => {
                self.min_part_latency = local_min_latency;
                self.interval = SimTime::MAX;
                self.next_sync = SimTime::MAX;
                return Ok(());
            }
            Mode::Parallel { shared, transport } => {
                let shared = Arc::clone(shared);
                shared.wait();
                shared.contribute_latency(local_min_latency.unwrap_or(SimTime::MAX).0);
                shared.wait();
                if let Some(t) = transport.as_mut() {
                    shared.reduce_latency(t.as_mut());
                }
                shared.wait();
                let global = shared
                    .global_latency()
                    .unwrap_or(Ok(u64::MAX))
                    .map_err(SimError::Transport)?;
                self.min_part_latency = (global != u64::MAX).then_some(SimTime(global));
            }
        }
        self.interval = self
            .min_part_latency
            .unwrap_or(idle_period)
            .max(SimTime(1));
        self.next_sync = start
            .saturating_add(self.interval)
            .min(end_time.saturating_add(SimTime(1)));
        debug!(
            partition = %self.id,
            min_part_latency = ?self.min_part_latency,
            interval = %self.interval,
            first_sync = %self.next_sync,
            "同步管理器初始化完成"
        );
        Ok(())
    }

    pub fn min_part_latency(&self) -> Option<SimTime> {
        self.min_part_latency
    }

    /// 可以不经同步执行的最晚时间（不含）
    pub fn local_safe_horizon(&self) -> SimTime {
        self.last_sync.saturating_add(self.interval)
    }

    pub fn last_sync(&self) -> SimTime {
        self.last_sync
    }

    /// 当前有效的同步时刻；其他时间的同步动作都已过期
    pub fn next_sync(&self) -> SimTime {
        self.next_sync
    }

    pub fn barriers(&self) -> u64 {
        self.barriers
    }

    /// 在屏障中接收到的远端事件数
    pub fn received(&self) -> u64 {
        self.received
    }

    /// 执行一次屏障。`local` 的 `next_time` 由这里在接收远端事件之后填写。
    ///
    /// 返回 `Err` 表示本 rank 的传输或解码故障；其他分区的错误以 `Verdict::Abort` 体现。
    pub fn barrier(&mut self, tv: &mut TimeVortex, mut local: Tally) -> SimResult<Verdict> {
        let (shared, transport) = match &mut self.mode {
            Mode::Serial => {
                local.next_time = tv.next_model_time().0;
                return Ok(self.conclude(local));
            }
            Mode::Parallel { shared, transport } => (Arc::clone(shared), transport),
        };

        shared.wait();
        let mut fault = None;
        if let Some(t) = transport.as_mut() {
            match shared.exchange(t.as_mut()) {
                Ok(n) => trace!(partition = %self.id, delivered = n, "rank 交换完成"),
                Err(f) => fault = Some(f),
            }
        }
        shared.wait();

        let mut received = 0;
        let mut insert_error = None;
        for activity in shared.drain_inbox(self.id.thread) {
            match tv.insert(activity) {
                Ok(_) => received += 1,
                Err(e) => {
                    insert_error.get_or_insert(e);
                }
            }
        }
        if insert_error.is_some() {
            local.error = 1;
        }
        local.next_time = tv.next_model_time().0;
        shared.contribute(&local);
        shared.wait();

        if let Some(t) = transport.as_mut() {
            let mut rank_tally = shared.take_tally();
            if fault.is_some() {
                rank_tally.error = 1;
            }
            let result = match fault {
                Some(RankFault::Transport(e)) => Err(RankFault::Transport(e)),
                Some(f) => {
                    // 解码失败仍要参加归约，其他 rank 才能得知需要中止
                    let _ = reduce_global(t.as_mut(), &rank_tally);
                    Err(f)
                }
                None => reduce_global(t.as_mut(), &rank_tally).map_err(RankFault::Transport),
            };
            let failed = result.is_err();
            shared.publish(result);
            if failed {
                // 丢弃端点，其他 rank 的集合操作以 PeerDeparted 返回
                *transport = None;
            }
        }
        shared.wait();

        self.received += received;
        let global = match shared.global() {
            Some(Ok(global)) => global,
            Some(Err(fault)) => return Err(fault.into()),
            None => return Err(SimError::RemoteAbort { partition: self.id }),
        };
        if let Some(e) = insert_error {
            return Err(e);
        }
        Ok(self.conclude(global))
    }

    fn conclude(&mut self, global: Tally) -> Verdict {
        self.barriers += 1;
        let verdict = global.decide(self.interval, self.end_time);
        if let Verdict::Continue { next_sync } = verdict {
            self.last_sync = SimTime(global.next_time);
            self.next_sync = next_sync;
        }
        debug!(
            partition = %self.id,
            barrier = self.barriers,
            refcount = global.refcount,
            next_time = %SimTime(global.next_time),
            ?verdict,
            "屏障结束"
        );
        verdict
    }
}
