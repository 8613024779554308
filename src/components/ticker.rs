//! 定时器组件

use super::{decode_words, encode_words};
use crate::sim::{
    ClockControl, Component, ComponentSummary, ConfigError, Context, Event, PortId, Priority,
    SimResult, SimTime,
};

const TAG: u32 = 0;

/// 周期触发 `ticks` 次后停止；`ticks` 为 0 时一直运行，且不参与退出协议。
#[derive(Debug, Clone)]
pub struct Ticker {
    period: SimTime,
    ticks: u64,
    priority: Priority,
    fired: u64,
    last_fire: SimTime,
}

impl Ticker {
    pub fn new(period: SimTime, ticks: u64, priority: Priority) -> Self {
        Self {
            period,
            ticks,
            priority,
            fired: 0,
            last_fire: SimTime::ZERO,
        }
    }
}

impl Component for Ticker {
    fn setup(&mut self, ctx: &mut Context<'_>) -> SimResult<()> {
        ctx.register_clock(self.period, self.priority, TAG)?;
        if self.ticks > 0 {
            ctx.keep_alive();
        }
        Ok(())
    }

    fn handle_event(&mut self, _port: PortId, _event: Event, _ctx: &mut Context<'_>) -> SimResult<()> {
        Ok(())
    }

    fn clock_tick(
        &mut self,
        _tag: u32,
        cycle: SimTime,
        ctx: &mut Context<'_>,
    ) -> SimResult<ClockControl> {
        self.fired += 1;
        self.last_fire = cycle;
        if self.ticks > 0 && self.fired >= self.ticks {
            ctx.release()?;
            return Ok(ClockControl::Stop);
        }
        Ok(ClockControl::Continue)
    }

    fn finish(&mut self, _end_time: SimTime) -> ComponentSummary {
        ComponentSummary::default()
            .with("fired", self.fired)
            .with("last_fire", self.last_fire.0)
    }

    fn snapshot(&self) -> Vec<u8> {
        encode_words(&[self.fired, self.last_fire.0])
    }

    fn restore(&mut self, state: &[u8]) -> SimResult<()> {
        let [fired, last_fire] = decode_words::<2>(state)
            .ok_or_else(|| ConfigError::Model("malformed ticker state".to_string()))?;
        self.fired = fired;
        self.last_fire = SimTime(last_fire);
        Ok(())
    }
}
