//! 时钟注册表
//!
//! 组件通过它登记周期性回调。每个 (period, priority, handler) 至多存在一个活着的
//! 时钟节拍；第一次触发在登记时刻之后一个周期，此后每个周期触发一次。

use super::activity::{Activity, ClockTick};
use super::error::{ConfigError, SimResult};
use super::id::HandlerKey;
use super::priority::{self, Priority};
use super::time::SimTime;
use super::time_vortex::TimeVortex;
use std::collections::HashMap;
use tracing::debug;

/// 时钟身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockId {
    pub period: SimTime,
    pub priority: Priority,
    pub handler: HandlerKey,
}

#[derive(Debug, Clone, Copy)]
struct ClockEntry {
    next_fire: SimTime,
    /// unregister 之后置位：下一次触发时移除节拍且不调用处理器
    cancelled: bool,
}

/// 节拍出队时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDisposition {
    Fire,
    Cancelled,
    /// 注册表里没有对应条目（不应发生，丢弃即可）
    Stale,
}

#[derive(Debug, Default)]
pub struct ClockRegistry {
    clocks: HashMap<ClockId, ClockEntry>,
}

impl ClockRegistry {
    /// 登记时钟并返回下一次触发时间。已经存在的节拍保持不变。
    pub fn register(&mut self, tv: &mut TimeVortex, id: ClockId) -> SimResult<SimTime> {
        self.ensure(tv, id)
    }

    /// 保证该处理器存在一个节拍；重复调用不会产生第二个节拍。
    pub fn reregister(&mut self, tv: &mut TimeVortex, id: ClockId) -> SimResult<SimTime> {
        self.ensure(tv, id)
    }

    fn ensure(&mut self, tv: &mut TimeVortex, id: ClockId) -> SimResult<SimTime> {
        if id.period == SimTime::ZERO {
            return Err(ConfigError::ZeroClockPeriod.into());
        }
        if !priority::is_model_priority(id.priority) {
            return Err(ConfigError::ReservedPriority(id.priority).into());
        }
        if let Some(entry) = self.clocks.get_mut(&id) {
            if entry.cancelled {
                debug!(handler = %id.handler, period = %id.period, "撤销未生效的注销");
                entry.cancelled = false;
            }
            return Ok(entry.next_fire);
        }

        let at = tv.current_time().saturating_add(id.period);
        tv.insert(Activity::clock_tick(
            at,
            id.priority,
            ClockTick {
                handler: id.handler,
                period: id.period,
            },
        ))?;
        self.clocks.insert(
            id,
            ClockEntry {
                next_fire: at,
                cancelled: false,
            },
        );
        debug!(handler = %id.handler, period = %id.period, first_fire = %at, "登记时钟");
        Ok(at)
    }

    /// 在下一次触发时移除节拍；没有活着的节拍时忽略请求。
    pub fn unregister(&mut self, id: ClockId) -> bool {
        match self.clocks.get_mut(&id) {
            Some(entry) if !entry.cancelled => {
                entry.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// 根据当前时间报告下一个周期边界（向上取整到 `period` 的整数倍）。
    ///
    /// 当前时刻恰好是周期整数倍、且该优先级的节拍尚未执行时，返回当前时刻。
    /// 这只是查询，与已登记节拍的实际相位无关。
    pub fn next_cycle(
        now: SimTime,
        current_priority: Priority,
        period: SimTime,
        priority: Priority,
    ) -> SimTime {
        if period.0 != 0 && now.0 % period.0 == 0 && priority > current_priority && now.0 != 0 {
            return now;
        }
        now.next_multiple_of(period)
    }

    /// 节拍出队时调用。
    pub fn on_tick(&mut self, tick: &ClockTick, priority: Priority) -> TickDisposition {
        let id = ClockId {
            period: tick.period,
            priority,
            handler: tick.handler,
        };
        match self.clocks.get(&id) {
            None => TickDisposition::Stale,
            Some(entry) if entry.cancelled => {
                self.clocks.remove(&id);
                debug!(handler = %id.handler, period = %id.period, "时钟已注销，移除节拍");
                TickDisposition::Cancelled
            }
            Some(_) => TickDisposition::Fire,
        }
    }

    /// 处理器返回后重新调度（Continue）或移除（Stop）。
    pub fn after_tick(
        &mut self,
        tv: &mut TimeVortex,
        id: ClockId,
        fired_at: SimTime,
        keep: bool,
    ) -> SimResult<()> {
        if !keep {
            self.clocks.remove(&id);
            debug!(handler = %id.handler, period = %id.period, "处理器返回 Stop，时钟停止");
            return Ok(());
        }
        let next = fired_at.saturating_add(id.period);
        tv.insert(Activity::clock_tick(
            next,
            id.priority,
            ClockTick {
                handler: id.handler,
                period: id.period,
            },
        ))?;
        if let Some(entry) = self.clocks.get_mut(&id) {
            entry.next_fire = next;
        }
        Ok(())
    }

    /// 恢复检查点中的节拍（对应的活动由调用方插入时间漩涡）。
    pub(crate) fn restore(&mut self, id: ClockId, next_fire: SimTime, cancelled: bool) {
        self.clocks.insert(
            id,
            ClockEntry {
                next_fire,
                cancelled,
            },
        );
    }

    pub fn is_live(&self, id: &ClockId) -> bool {
        self.clocks.get(id).is_some_and(|e| !e.cancelled)
    }

    /// 已注销但节拍还在队列里
    pub fn is_cancelled(&self, id: &ClockId) -> bool {
        self.clocks.get(id).is_some_and(|e| e.cancelled)
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}
