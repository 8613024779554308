//! 乒乓组件
//!
//! 两个组件通过一对链路来回传球；球里带着剩余的回合数。
//! 发出或接到最后一个球（剩余 0）的一方释放退出计数。

use super::{decode_words, encode_words};
use crate::sim::{
    Component, ComponentSummary, ConfigError, Context, Event, EventType, PortId, SimResult,
    SimTime,
};
use tracing::trace;

pub const BALL: EventType = EventType::named("ping_pong.ball");

const PORT: PortId = PortId(0);

#[derive(Debug, Clone)]
pub struct PingPong {
    volleys: u64,
    serve: bool,
    sent: u64,
    received: u64,
    released: bool,
}

impl PingPong {
    pub fn new(volleys: u64, serve: bool) -> Self {
        Self {
            volleys,
            serve,
            sent: 0,
            received: 0,
            released: false,
        }
    }

    fn hit(&mut self, remaining: u64, ctx: &mut Context<'_>) -> SimResult<()> {
        ctx.send(PORT, BALL, encode_words(&[remaining]))?;
        self.sent += 1;
        if remaining == 0 {
            self.release(ctx)?;
        }
        Ok(())
    }

    fn release(&mut self, ctx: &mut Context<'_>) -> SimResult<()> {
        if !self.released {
            self.released = true;
            ctx.release()?;
        }
        Ok(())
    }
}

impl Component for PingPong {
    fn event_types(&self) -> &[&'static str] {
        &["ping_pong.ball"]
    }

    fn setup(&mut self, ctx: &mut Context<'_>) -> SimResult<()> {
        ctx.keep_alive();
        if self.serve {
            match self.volleys {
                0 => self.release(ctx)?,
                n => self.hit(n - 1, ctx)?,
            }
        }
        Ok(())
    }

    fn handle_event(&mut self, _port: PortId, event: Event, ctx: &mut Context<'_>) -> SimResult<()> {
        let [remaining] = decode_words::<1>(&event.payload).ok_or_else(|| {
            ConfigError::Model(format!("malformed ball of {} bytes", event.payload.len()))
        })?;
        self.received += 1;
        trace!(now = %ctx.now(), remaining, "接球");
        match remaining {
            0 => self.release(ctx),
            n => self.hit(n - 1, ctx),
        }
    }

    fn finish(&mut self, _end_time: SimTime) -> ComponentSummary {
        ComponentSummary::default()
            .with("sent", self.sent)
            .with("received", self.received)
    }

    fn snapshot(&self) -> Vec<u8> {
        encode_words(&[self.sent, self.received, u64::from(self.released)])
    }

    fn restore(&mut self, state: &[u8]) -> SimResult<()> {
        let [sent, received, released] = decode_words::<3>(state)
            .ok_or_else(|| ConfigError::Model("malformed ping_pong state".to_string()))?;
        self.sent = sent;
        self.received = received;
        self.released = released != 0;
        Ok(())
    }
}
