//! 仿真核心模块
//!
//! 此模块包含单个分区内的调度核心：仿真时间、活动与时间漩涡、组件接口、
//! 时钟注册表、退出协议以及分区调度循环。

// 子模块声明
mod activity;
mod clock;
mod component;
mod context;
mod error;
mod exit;
mod id;
mod partition;
pub mod priority;
mod signal;
mod time;
mod time_vortex;

// 重新导出公共接口
pub use activity::{Action, Activity, ActivityKind, ClockTick, Event, EventType, StopReason};
pub use clock::{ClockId, ClockRegistry, TickDisposition};
pub use component::{ClockControl, Component, ComponentSummary, HandlerTable};
pub use context::{Context, SendOptions};
pub use error::{ConfigError, ErrorKind, SimError, SimResult};
pub use exit::{Exit, Tally, Verdict};
pub use id::{ComponentId, HandlerKey, HandlerKind, LinkId, PartitionId, PortId};
pub use partition::{
    ComponentReport, Partition, PartitionCore, PartitionReport, PartitionStats, RunOutcome,
};
pub use priority::Priority;
pub use signal::SignalFlag;
pub use time::SimTime;
pub use time_vortex::TimeVortex;
