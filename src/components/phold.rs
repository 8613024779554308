//! PHOLD 负载
//!
//! 每条消息携带自己的 LCG 状态和剩余跳数。接收方用消息里的状态挑选下一个端口
//! 和额外延迟，因此事件总数与分区方式无关。

use super::{decode_words, encode_words};
use crate::sim::{
    Component, ComponentSummary, ConfigError, Context, Event, EventType, PortId, SendOptions,
    SimResult, SimTime, priority,
};

pub const MSG: EventType = EventType::named("phold.msg");

fn lcg(state: u64) -> u64 {
    state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407)
}

#[derive(Debug, Clone)]
pub struct Phold {
    seed: u64,
    initial: u32,
    hops: u64,
    max_delay: SimTime,
    ports: Vec<PortId>,
    sent: u64,
    received: u64,
    absorbed: u64,
}

impl Phold {
    pub fn new(seed: u64, initial: u32, hops: u64, max_delay: SimTime, ports: Vec<PortId>) -> Self {
        Self {
            seed,
            initial,
            hops,
            max_delay,
            ports,
            sent: 0,
            received: 0,
            absorbed: 0,
        }
    }

    fn forward(&mut self, state: u64, remaining: u64, ctx: &mut Context<'_>) -> SimResult<()> {
        if self.ports.is_empty() {
            self.absorbed += 1;
            return Ok(());
        }
        let state = lcg(state);
        let port = self.ports[(state >> 16) as usize % self.ports.len()];
        let delay = SimTime((state >> 33) % self.max_delay.0.saturating_add(1));
        ctx.send_with(
            port,
            SendOptions {
                delay,
                priority: priority::EVENT,
            },
            MSG,
            encode_words(&[state, remaining]),
        )?;
        self.sent += 1;
        Ok(())
    }
}

impl Component for Phold {
    fn event_types(&self) -> &[&'static str] {
        &["phold.msg"]
    }

    fn setup(&mut self, ctx: &mut Context<'_>) -> SimResult<()> {
        let base = self.seed ^ (u64::from(ctx.component().0) << 32);
        for i in 0..self.initial {
            self.forward(base.wrapping_add(u64::from(i)), self.hops, ctx)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, _port: PortId, event: Event, ctx: &mut Context<'_>) -> SimResult<()> {
        let [state, remaining] = decode_words::<2>(&event.payload).ok_or_else(|| {
            ConfigError::Model(format!("malformed phold message of {} bytes", event.payload.len()))
        })?;
        self.received += 1;
        if remaining == 0 {
            self.absorbed += 1;
            return Ok(());
        }
        self.forward(state, remaining - 1, ctx)
    }

    fn finish(&mut self, _end_time: SimTime) -> ComponentSummary {
        ComponentSummary::default()
            .with("sent", self.sent)
            .with("received", self.received)
            .with("absorbed", self.absorbed)
    }

    fn snapshot(&self) -> Vec<u8> {
        encode_words(&[self.sent, self.received, self.absorbed])
    }

    fn restore(&mut self, state: &[u8]) -> SimResult<()> {
        let [sent, received, absorbed] = decode_words::<3>(state)
            .ok_or_else(|| ConfigError::Model("malformed phold state".to_string()))?;
        self.sent = sent;
        self.received = received;
        self.absorbed = absorbed;
        Ok(())
    }
}
