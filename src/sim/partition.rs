//! 分区调度器
//!
//! 每个分区拥有自己的时间漩涡、组件和出站链路，按 (time, priority, seq)
//! 依次取出活动并分派。跨分区的一致性完全由同步管理器的屏障保证：
//! 并行模式下分区只在屏障结论为 Stop 时停止，从不单方面退出。

use super::activity::{Action, Activity, ActivityKind, StopReason};
use super::clock::{ClockId, ClockRegistry, TickDisposition};
use super::component::{ClockControl, Component, ComponentSummary, HandlerTable};
use super::context::Context;
use super::error::{ConfigError, SimError, SimResult};
use super::exit::{Exit, Tally, Verdict};
use super::id::{ComponentId, HandlerKey, HandlerKind, PartitionId};
use super::priority::{self, Priority};
use super::signal::SignalFlag;
use super::time::SimTime;
use super::time_vortex::TimeVortex;
use crate::checkpoint::{
    ActivityRecord, ActivityRecordKind, CheckpointWriter, ComponentRecord, PartitionCheckpoint,
};
use crate::model::{LinkTable, PartitionPlan};
use crate::sync::{EventTypeRegistry, RankShared, SyncManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// 分区运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    /// 分派的事件数
    pub events: u64,
    /// 触发的时钟节拍数
    pub clock_ticks: u64,
    pub barriers: u64,
    /// 屏障中收到的跨分区事件
    pub received: u64,
    /// 发往其他分区的事件
    pub remote_sent: u64,
    pub checkpoints: u64,
    pub max_depth: u64,
}

/// 分区中可以借给组件上下文的部分
pub struct PartitionCore {
    pub(crate) id: PartitionId,
    pub(crate) tv: TimeVortex,
    /// 正在执行的活动的优先级
    pub(crate) priority: Priority,
    pub(crate) links: LinkTable,
    pub(crate) clocks: ClockRegistry,
    pub(crate) exit: Exit,
    pub(crate) outbound: Option<Arc<RankShared>>,
    /// 发送时校验事件类型，本地与远端链路一致
    pub(crate) event_types: Arc<EventTypeRegistry>,
    /// 单分区模式：退出计数归零时自行安排退出检查
    pub(crate) serial: bool,
    pub(crate) last_event: SimTime,
    pub(crate) stats: PartitionStats,
}

/// run() 的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub end_time: SimTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentReport {
    pub id: ComponentId,
    pub name: String,
    pub summary: ComponentSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionReport {
    pub partition: PartitionId,
    /// 全局一致的结束时间
    pub end_time: SimTime,
    /// 本分区时钟实际停下的时间
    pub final_time: SimTime,
    pub reason: StopReason,
    pub stats: PartitionStats,
    pub components: Vec<ComponentReport>,
}

struct Slot {
    id: ComponentId,
    name: String,
    component: Box<dyn Component>,
}

struct CheckpointPlan {
    period: SimTime,
    writer: Arc<dyn CheckpointWriter>,
}

pub struct Partition {
    core: PartitionCore,
    slots: Vec<Slot>,
    handlers: HandlerTable,
    sync: SyncManager,
    signal: SignalFlag,
    checkpoint: Option<CheckpointPlan>,
    idle_sync_period: SimTime,
    end_time: SimTime,
    restored: bool,
    /// 已经排入 Stop 动作
    stopping: bool,
    /// 屏障本身失败过，不能再参加集合操作
    sync_broken: bool,
}

impl Partition {
    pub fn new(plan: PartitionPlan, sync: SyncManager, outbound: Option<Arc<RankShared>>) -> Self {
        let id = plan.id;
        let mut handlers = HandlerTable::default();
        let slots: Vec<Slot> = plan
            .components
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                handlers.insert(c.id, i);
                Slot {
                    id: c.id,
                    name: c.name,
                    component: c.component,
                }
            })
            .collect();
        let serial = !sync.is_parallel();
        Self {
            core: PartitionCore {
                id,
                tv: TimeVortex::new(id),
                priority: priority::EVENT,
                links: plan.links,
                clocks: ClockRegistry::default(),
                exit: Exit::default(),
                outbound,
                event_types: plan.event_types,
                serial,
                last_event: SimTime::ZERO,
                stats: PartitionStats::default(),
            },
            slots,
            handlers,
            sync,
            signal: SignalFlag::new(),
            checkpoint: None,
            idle_sync_period: SimTime(1_000_000),
            end_time: SimTime::MAX,
            restored: false,
            stopping: false,
            sync_broken: false,
        }
    }

    /// 单分区模式
    pub fn serial(plan: PartitionPlan) -> Self {
        let id = plan.id;
        Self::new(plan, SyncManager::serial(id), None)
    }

    pub fn with_signal(mut self, signal: SignalFlag) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_checkpoint(mut self, period: SimTime, writer: Arc<dyn CheckpointWriter>) -> Self {
        self.checkpoint = Some(CheckpointPlan { period, writer });
        self
    }

    pub fn with_idle_sync_period(mut self, period: SimTime) -> Self {
        self.idle_sync_period = period;
        self
    }

    pub fn id(&self) -> PartitionId {
        self.core.id
    }

    pub fn now(&self) -> SimTime {
        self.core.tv.current_time()
    }

    pub fn time_vortex(&self) -> &TimeVortex {
        &self.core.tv
    }

    pub fn sync(&self) -> &SyncManager {
        &self.sync
    }

    pub fn exit(&self) -> &Exit {
        &self.core.exit
    }

    pub fn stats(&self) -> PartitionStats {
        let mut stats = self.core.stats;
        stats.barriers = self.sync.barriers();
        stats.received = self.sync.received();
        stats.max_depth = self.core.tv.max_depth() as u64;
        stats
    }

    /// 从检查点恢复。必须在 run() 之前调用；恢复后不再执行 setup()。
    pub fn restore(&mut self, checkpoint: &PartitionCheckpoint) -> SimResult<()> {
        let id = self.core.id;
        if checkpoint.partition != id {
            return Err(ConfigError::Partitioning(format!(
                "checkpoint of partition {} cannot be restored into {}",
                checkpoint.partition, id
            ))
            .into());
        }
        if checkpoint.links.as_slice() != self.core.links.links() {
            return Err(ConfigError::Model(format!(
                "links in checkpoint of partition {id} do not match the model"
            ))
            .into());
        }

        self.core.tv.restore_clock(checkpoint.time);
        for record in &checkpoint.activities {
            let key = record.handler();
            if !self.handlers.contains(&key) {
                return Err(SimError::MissingHandler { partition: id, key });
            }
            if let ActivityRecordKind::ClockTick {
                handler,
                period,
                cancelled,
            } = record.kind
            {
                self.core.clocks.restore(
                    ClockId {
                        period,
                        priority: record.priority,
                        handler,
                    },
                    record.time,
                    cancelled,
                );
            }
            self.core.tv.insert(record.clone().into_activity())?;
        }
        for record in &checkpoint.components {
            let slot = self
                .handlers
                .slot(record.id)
                .ok_or_else(|| ConfigError::UnknownComponent(record.name.clone()))?;
            self.slots[slot].component.restore(&record.state)?;
        }
        self.core.exit.restore(
            checkpoint.exit_refcount,
            checkpoint.exit_primaries,
            checkpoint.exit_end_candidate,
        );
        self.core.last_event = checkpoint.last_event;
        self.restored = true;
        info!(
            partition = %id,
            time = %checkpoint.time,
            activities = checkpoint.activities.len(),
            "♻️  从检查点恢复"
        );
        Ok(())
    }

    /// 当前状态的检查点。活动按全序排列，恢复时按这个顺序重新分配插入序号。
    pub fn snapshot(&self) -> PartitionCheckpoint {
        let mut pending = Vec::new();
        self.core.tv.get_contents(&mut pending);
        pending.sort_by_key(Activity::key);
        PartitionCheckpoint {
            partition: self.core.id,
            time: self.core.tv.current_time(),
            activities: pending
                .iter()
                .filter_map(ActivityRecord::from_activity)
                .map(|mut record| {
                    if let ActivityRecordKind::ClockTick {
                        handler,
                        period,
                        cancelled,
                    } = &mut record.kind
                    {
                        *cancelled = self.core.clocks.is_cancelled(&ClockId {
                            period: *period,
                            priority: record.priority,
                            handler: *handler,
                        });
                    }
                    record
                })
                .collect(),
            components: self
                .slots
                .iter()
                .map(|s| ComponentRecord {
                    id: s.id,
                    name: s.name.clone(),
                    state: s.component.snapshot(),
                })
                .collect(),
            links: self.core.links.links().to_vec(),
            exit_refcount: self.core.exit.refcount(),
            exit_primaries: self.core.exit.holds(),
            exit_end_candidate: self.core.exit.end_candidate(),
            last_event: self.core.last_event,
        }
    }

    /// 运行直到所有分区一致同意停止。
    ///
    /// 并行模式下，本地错误会先通过一次带错误标志的屏障通知其他分区，再返回。
    pub fn run(&mut self, end_time: SimTime) -> SimResult<RunOutcome> {
        info!(
            partition = %self.core.id,
            components = self.slots.len(),
            end_time = %end_time,
            "▶️  分区开始运行"
        );
        self.end_time = end_time;
        let result = self.start().and_then(|()| self.event_loop());
        match result {
            Ok(outcome) => {
                info!(
                    partition = %self.core.id,
                    reason = %outcome.reason,
                    end_time = %outcome.end_time,
                    events = self.core.stats.events,
                    "✅ 分区运行结束"
                );
                Ok(outcome)
            }
            Err(e) => {
                if self.sync.is_parallel() && !self.sync_broken {
                    self.abort_barrier();
                }
                Err(e)
            }
        }
    }

    /// 收集组件汇总与统计
    pub fn finish(&mut self, outcome: RunOutcome) -> PartitionReport {
        let components = self
            .slots
            .iter_mut()
            .map(|s| ComponentReport {
                id: s.id,
                name: s.name.clone(),
                summary: s.component.finish(outcome.end_time),
            })
            .collect();
        PartitionReport {
            partition: self.core.id,
            end_time: outcome.end_time,
            final_time: self.core.tv.current_time(),
            reason: outcome.reason,
            stats: self.stats(),
            components,
        }
    }

    fn start(&mut self) -> SimResult<()> {
        let start = self.core.tv.current_time();
        let local = self.core.links.min_remote_latency();
        if let Err(e) = self
            .sync
            .init(local, self.idle_sync_period, start, self.end_time)
        {
            self.sync_broken = true;
            return Err(e);
        }

        if !self.restored {
            for slot in &mut self.slots {
                let mut ctx = Context::new(&mut self.core, slot.id);
                slot.component.setup(&mut ctx)?;
            }
        }

        if self.sync.is_parallel() {
            self.schedule_sync(self.sync.next_sync())?;
        }
        if let Some(plan) = &self.checkpoint {
            let at = start.next_multiple_of(plan.period);
            if at <= self.end_time {
                self.core
                    .tv
                    .insert(Activity::action(at, priority::CHECKPOINT, Action::Checkpoint))?;
            }
        }
        Ok(())
    }

    fn event_loop(&mut self) -> SimResult<RunOutcome> {
        let parallel = self.sync.is_parallel();
        loop {
            if !self.stopping && self.signal.is_raised() {
                warn!(partition = %self.core.id, now = %self.now(), "收到中止信号，发起提前屏障");
                let mut tally = self.tally();
                tally.signal = 1;
                let verdict = self.barrier(tally)?;
                self.apply_verdict(verdict)?;
            }

            let next = match self.core.tv.front() {
                Ok(a) => a.time(),
                Err(SimError::QueueEmpty) if !parallel => {
                    return Ok(RunOutcome {
                        reason: StopReason::Quiescent,
                        end_time: self.core.last_event,
                    });
                }
                Err(e) => return Err(e),
            };
            if !parallel && next > self.end_time {
                return Ok(RunOutcome {
                    reason: StopReason::EndTime,
                    end_time: self.end_time,
                });
            }

            let activity = self.core.tv.pop()?;
            self.core.priority = activity.priority();
            if let Some(outcome) = self.dispatch(activity)? {
                return Ok(outcome);
            }
        }
    }

    fn slot_for(&self, key: &HandlerKey) -> SimResult<usize> {
        self.handlers.resolve(key).ok_or(SimError::MissingHandler {
            partition: self.core.id,
            key: *key,
        })
    }

    fn dispatch(&mut self, activity: Activity) -> SimResult<Option<RunOutcome>> {
        let time = activity.time();
        let priority = activity.priority();
        match activity.into_kind() {
            ActivityKind::Event(event) => {
                let key = event.handler;
                let HandlerKind::Port(port) = key.kind else {
                    return Err(SimError::MissingHandler {
                        partition: self.core.id,
                        key,
                    });
                };
                let slot = self.slot_for(&key)?;
                self.core.stats.events += 1;
                self.core.last_event = time;
                let s = &mut self.slots[slot];
                let mut ctx = Context::new(&mut self.core, s.id);
                s.component.handle_event(port, event, &mut ctx)?;
            }
            ActivityKind::ClockTick(tick) => {
                let key = tick.handler;
                let HandlerKind::Clock(tag) = key.kind else {
                    return Err(SimError::MissingHandler {
                        partition: self.core.id,
                        key,
                    });
                };
                match self.core.clocks.on_tick(&tick, priority) {
                    TickDisposition::Fire => {}
                    TickDisposition::Cancelled | TickDisposition::Stale => return Ok(None),
                }
                let slot = self.slot_for(&key)?;
                self.core.stats.clock_ticks += 1;
                self.core.last_event = time;
                let s = &mut self.slots[slot];
                let control = {
                    let mut ctx = Context::new(&mut self.core, s.id);
                    s.component.clock_tick(tag, time, &mut ctx)?
                };
                let id = ClockId {
                    period: tick.period,
                    priority,
                    handler: key,
                };
                let core = &mut self.core;
                core.clocks
                    .after_tick(&mut core.tv, id, time, control == ClockControl::Continue)?;
            }
            ActivityKind::Action(action) => return self.run_action(time, action),
        }
        Ok(None)
    }

    fn run_action(&mut self, time: SimTime, action: Action) -> SimResult<Option<RunOutcome>> {
        match action {
            Action::SyncBarrier => {
                if time != self.sync.next_sync() {
                    trace!(partition = %self.core.id, at = %time, "跳过过期的同步动作");
                    return Ok(None);
                }
                let verdict = self.barrier(self.tally())?;
                self.apply_verdict(verdict)?;
            }
            Action::ExitCheck => {
                if self.sync.is_parallel() {
                    return Ok(None);
                }
                let verdict = self.barrier(self.tally())?;
                self.apply_verdict(verdict)?;
            }
            Action::Checkpoint => {
                if self.sync.is_parallel() {
                    let verdict = self.barrier(self.tally())?;
                    let proceed = matches!(verdict, Verdict::Continue { .. });
                    self.apply_verdict(verdict)?;
                    if !proceed {
                        return Ok(None);
                    }
                }
                self.write_checkpoint(time)?;
            }
            Action::Stop { reason, end_time } => {
                return Ok(Some(RunOutcome { reason, end_time }));
            }
        }
        Ok(None)
    }

    fn write_checkpoint(&mut self, time: SimTime) -> SimResult<()> {
        let Some(plan) = &self.checkpoint else {
            return Ok(());
        };
        let period = plan.period;
        let writer = Arc::clone(&plan.writer);
        writer.write(&self.snapshot())?;
        self.core.stats.checkpoints += 1;

        let next = time.saturating_add(period);
        // 单分区模式下检查点动作不能让空闲的仿真一直活着
        let idle = !self.sync.is_parallel() && self.core.tv.next_model_time().is_never();
        if next <= self.end_time && !idle {
            self.core
                .tv
                .insert(Activity::action(next, priority::CHECKPOINT, Action::Checkpoint))?;
        }
        Ok(())
    }

    fn tally(&self) -> Tally {
        let exit = &self.core.exit;
        Tally {
            refcount: exit.refcount(),
            holds: exit.holds(),
            end_candidate: exit.end_candidate().map_or(0, |t| t.0),
            last_event: self.core.last_event.0,
            ..Tally::default()
        }
    }

    fn barrier(&mut self, tally: Tally) -> SimResult<Verdict> {
        match self.sync.barrier(&mut self.core.tv, tally) {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                self.sync_broken = true;
                Err(e)
            }
        }
    }

    fn schedule_sync(&mut self, at: SimTime) -> SimResult<()> {
        self.core
            .tv
            .insert(Activity::action(at, priority::SYNC, Action::SyncBarrier))?;
        Ok(())
    }

    /// 停止结论在当前屏障时刻生效。并行模式下退出和信号要等到下一次屏障才被发现，
    /// 所以 `final_time` 可能比一致的 `end_time` 晚，但不超过一个同步间隔。
    fn apply_verdict(&mut self, verdict: Verdict) -> SimResult<()> {
        let now = self.core.tv.current_time();
        match verdict {
            Verdict::Continue { next_sync } => {
                if self.sync.is_parallel() {
                    self.schedule_sync(next_sync)?;
                }
            }
            Verdict::Stop { reason, end_time } => {
                debug!(partition = %self.core.id, %reason, end_time = %end_time, "屏障结论：停止");
                self.stopping = true;
                self.core.tv.insert(Activity::action(
                    now,
                    priority::STOP,
                    Action::Stop { reason, end_time },
                ))?;
            }
            Verdict::Abort => {
                self.sync_broken = true;
                return Err(SimError::RemoteAbort {
                    partition: self.core.id,
                });
            }
        }
        Ok(())
    }

    /// 本地失败后通知其他分区：参加一次带错误标志的屏障
    fn abort_barrier(&mut self) {
        let mut tally = self.tally();
        tally.error = 1;
        if let Err(e) = self.sync.barrier(&mut self.core.tv, tally) {
            debug!(partition = %self.core.id, error = %e, "中止屏障失败");
        }
        self.sync_broken = true;
    }
}
