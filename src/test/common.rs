use crate::config::RuntimeConfig;
use crate::model::ModelBuilder;
use crate::runtime::{SimReport, Simulation};
use crate::sim::{
    ClockControl, Component, ComponentSummary, Context, Event, EventType, Partition, PortId,
    Priority, SimResult, SimTime,
};
use std::sync::{Arc, Mutex};

pub const MSG: EventType = EventType::named("test.msg");

/// 测试组件记录的一条日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub who: &'static str,
    pub time: u64,
    pub priority: Priority,
    pub tag: u64,
}

pub type Log = Arc<Mutex<Vec<Entry>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<Entry> {
    log.lock().expect("log lock").clone()
}

pub fn push(log: &Log, who: &'static str, ctx: &Context<'_>, tag: u64) {
    log.lock().expect("log lock").push(Entry {
        who,
        time: ctx.now().0,
        priority: ctx.priority(),
        tag,
    });
}

pub fn tag_of(event: &Event) -> u64 {
    let mut raw = [0u8; 8];
    let n = event.payload.len().min(8);
    raw[..n].copy_from_slice(&event.payload[..n]);
    u64::from_le_bytes(raw)
}

pub fn payload(tag: u64) -> Vec<u8> {
    tag.to_le_bytes().to_vec()
}

type SetupFn = Box<dyn FnMut(&mut Context<'_>) -> SimResult<()> + Send>;
type EventFn = Box<dyn FnMut(PortId, Event, &mut Context<'_>) -> SimResult<()> + Send>;
type TickFn = Box<dyn FnMut(u32, SimTime, &mut Context<'_>) -> SimResult<ClockControl> + Send>;

/// 行为由闭包给出的测试组件
#[derive(Default)]
pub struct Script {
    setup: Option<SetupFn>,
    on_event: Option<EventFn>,
    on_tick: Option<TickFn>,
    state: Vec<u8>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_setup(
        mut self,
        f: impl FnMut(&mut Context<'_>) -> SimResult<()> + Send + 'static,
    ) -> Self {
        self.setup = Some(Box::new(f));
        self
    }

    pub fn on_event(
        mut self,
        f: impl FnMut(PortId, Event, &mut Context<'_>) -> SimResult<()> + Send + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(f));
        self
    }

    pub fn on_tick(
        mut self,
        f: impl FnMut(u32, SimTime, &mut Context<'_>) -> SimResult<ClockControl> + Send + 'static,
    ) -> Self {
        self.on_tick = Some(Box::new(f));
        self
    }

    pub fn boxed(self) -> Box<dyn Component> {
        Box::new(self)
    }
}

impl Component for Script {
    fn event_types(&self) -> &[&'static str] {
        &["test.msg"]
    }

    fn setup(&mut self, ctx: &mut Context<'_>) -> SimResult<()> {
        match self.setup.as_mut() {
            Some(f) => f(ctx),
            None => Ok(()),
        }
    }

    fn handle_event(&mut self, port: PortId, event: Event, ctx: &mut Context<'_>) -> SimResult<()> {
        match self.on_event.as_mut() {
            Some(f) => f(port, event, ctx),
            None => Ok(()),
        }
    }

    fn clock_tick(
        &mut self,
        tag: u32,
        cycle: SimTime,
        ctx: &mut Context<'_>,
    ) -> SimResult<ClockControl> {
        match self.on_tick.as_mut() {
            Some(f) => f(tag, cycle, ctx),
            None => Ok(ClockControl::Stop),
        }
    }

    fn finish(&mut self, _end_time: SimTime) -> ComponentSummary {
        ComponentSummary::default()
    }

    fn snapshot(&self) -> Vec<u8> {
        self.state.clone()
    }

    fn restore(&mut self, state: &[u8]) -> SimResult<()> {
        self.state = state.to_vec();
        Ok(())
    }
}

/// 把单分区模型构建成可以直接运行的分区
pub fn serial_partition(builder: ModelBuilder) -> Partition {
    let mut plans = builder.build(1, 1).expect("build model").into_partitions();
    Partition::serial(plans.pop().expect("one partition"))
}

pub fn config(ranks: u32, threads: u32) -> RuntimeConfig {
    RuntimeConfig {
        ranks,
        threads,
        ..RuntimeConfig::default()
    }
}

/// 以给定切分运行模型
pub fn run_model(builder: ModelBuilder, cfg: RuntimeConfig) -> SimResult<SimReport> {
    let model = builder.build(cfg.ranks, cfg.threads)?;
    Simulation::new(model, cfg).run()
}
