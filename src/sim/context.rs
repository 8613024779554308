//! 处理器上下文
//!
//! 组件回调通过 `Context` 访问所属分区：当前时间、发送事件、时钟与退出协议。
//! 上下文只借用分区核心，组件本身由分区单独持有。

use super::activity::{Action, Activity, Event, EventType};
use super::clock::{ClockId, ClockRegistry};
use super::error::{ConfigError, SimError, SimResult};
use super::id::{ComponentId, HandlerKey, PartitionId, PortId};
use super::partition::PartitionCore;
use super::priority::{self, Priority};
use super::time::SimTime;
use crate::model::LinkEnd;
use crate::sync::WireError;
use tracing::trace;

/// 发送选项：在链路延迟之外的额外延迟，以及事件优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub delay: SimTime,
    pub priority: Priority,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            delay: SimTime::ZERO,
            priority: priority::EVENT,
        }
    }
}

pub struct Context<'a> {
    core: &'a mut PartitionCore,
    component: ComponentId,
}

impl<'a> Context<'a> {
    pub(crate) fn new(core: &'a mut PartitionCore, component: ComponentId) -> Self {
        Self { core, component }
    }

    pub fn now(&self) -> SimTime {
        self.core.tv.current_time()
    }

    /// 正在执行的活动的优先级
    pub fn priority(&self) -> Priority {
        self.core.priority
    }

    pub fn partition(&self) -> PartitionId {
        self.core.id
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// 以默认优先级、不加额外延迟发送
    pub fn send(&mut self, port: PortId, ty: EventType, payload: Vec<u8>) -> SimResult<()> {
        self.send_with(port, SendOptions::default(), ty, payload)
    }

    /// 经由 `port` 上的链路发送事件，交付时间为 now + latency + delay。
    pub fn send_with(
        &mut self,
        port: PortId,
        opts: SendOptions,
        ty: EventType,
        payload: Vec<u8>,
    ) -> SimResult<()> {
        if !priority::is_model_priority(opts.priority) {
            return Err(ConfigError::ReservedPriority(opts.priority).into());
        }
        let link = self
            .core
            .links
            .lookup(self.component, port)
            .ok_or(ConfigError::UnwiredPort {
                component: self.component,
                port,
            })?;
        let (end, latency) = (link.end, link.latency);
        let event = Event {
            link: link.id,
            ty,
            payload,
            handler: link.target(),
        };
        if !self.core.event_types.contains(ty) {
            return Err(WireError::UnknownType(ty.tag()).into());
        }
        let time = self.now().saturating_add(latency).saturating_add(opts.delay);
        trace!(link = event.link.0, at = %time, priority = opts.priority, "发送事件");
        match end {
            LinkEnd::Local => {
                self.core
                    .tv
                    .insert(Activity::event(time, opts.priority, event))?;
            }
            LinkEnd::Remote { partition } => {
                let shared = self.core.outbound.as_ref().ok_or_else(|| {
                    SimError::from(ConfigError::Partitioning(format!(
                        "partition {} has a remote link but no sync queue",
                        self.core.id
                    )))
                })?;
                shared.route(partition, time, opts.priority, event)?;
                self.core.stats.remote_sent += 1;
            }
        }
        Ok(())
    }

    fn clock_id(&self, period: SimTime, priority: Priority, tag: u32) -> ClockId {
        ClockId {
            period,
            priority,
            handler: HandlerKey::clock(self.component, tag),
        }
    }

    /// 登记时钟，返回第一次触发的时间
    pub fn register_clock(
        &mut self,
        period: SimTime,
        priority: Priority,
        tag: u32,
    ) -> SimResult<SimTime> {
        let id = self.clock_id(period, priority, tag);
        let core = &mut *self.core;
        core.clocks.register(&mut core.tv, id)
    }

    /// 在下一次触发时移除时钟；返回是否存在活着的时钟
    pub fn unregister_clock(&mut self, period: SimTime, priority: Priority, tag: u32) -> bool {
        let id = self.clock_id(period, priority, tag);
        self.core.clocks.unregister(id)
    }

    pub fn reregister_clock(
        &mut self,
        period: SimTime,
        priority: Priority,
        tag: u32,
    ) -> SimResult<SimTime> {
        let id = self.clock_id(period, priority, tag);
        let core = &mut *self.core;
        core.clocks.reregister(&mut core.tv, id)
    }

    pub fn next_cycle(&self, period: SimTime, priority: Priority) -> SimTime {
        ClockRegistry::next_cycle(self.now(), self.core.priority, period, priority)
    }

    /// 请求仿真继续运行（退出引用计数 +1）
    pub fn keep_alive(&mut self) {
        self.core.exit.increment();
    }

    /// 声明本组件已完成（退出引用计数 -1）
    pub fn release(&mut self) -> SimResult<()> {
        let now = self.now();
        let reached_zero = self.core.exit.decrement(self.core.id, now)?;
        if reached_zero && self.core.serial {
            self.core
                .tv
                .insert(Activity::action(now, priority::EXIT_CHECK, Action::ExitCheck))?;
        }
        Ok(())
    }
}
