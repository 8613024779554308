//! 错误类型
//!
//! 核心的所有可失败操作都返回 `Result<T, SimError>`。致命错误在分区边界汇总，
//! 由运行时集中转换为一次中止。

use super::id::{ComponentId, HandlerKey, PartitionId, PortId};
use super::priority::Priority;
use super::time::SimTime;
use crate::checkpoint::CheckpointError;
use crate::sync::WireError;
use crate::transport::TransportError;
use thiserror::Error;

/// 错误种类（与具体字段无关），用于日志与退出码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CausalityViolation,
    QueueEmpty,
    TransportError,
    SerializationError,
    ConfigError,
    MissingHandler,
    RefcountUnderflow,
    RemoteAbort,
    SignalAbort,
    CheckpointError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CausalityViolation => "CausalityViolation",
            ErrorKind::QueueEmpty => "QueueEmpty",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::SerializationError => "SerializationError",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::MissingHandler => "MissingHandler",
            ErrorKind::RefcountUnderflow => "RefcountUnderflow",
            ErrorKind::RemoteAbort => "RemoteAbort",
            ErrorKind::SignalAbort => "SignalAbort",
            ErrorKind::CheckpointError => "CheckpointError",
        }
    }
}

/// 模型装配或运行配置错误；总是在 run() 开始之前报告。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("link {from}:{from_port} -> {to}:{to_port} has negative latency {latency}")]
    NegativeLatency {
        from: String,
        from_port: u32,
        to: String,
        to_port: u32,
        latency: i64,
    },
    #[error("link from component {from:?} to {to:?} crosses partitions with zero latency")]
    ZeroLookahead { from: ComponentId, to: ComponentId },
    #[error("unknown component `{0}`")]
    UnknownComponent(String),
    #[error("component `{0}` is defined twice")]
    DuplicateComponent(String),
    #[error("port {port:?} of component {component:?} is already wired")]
    PortAlreadyWired { component: ComponentId, port: PortId },
    #[error("port {port:?} of component {component:?} is not wired")]
    UnwiredPort { component: ComponentId, port: PortId },
    #[error("priority {0} is reserved for scheduler actions")]
    ReservedPriority(Priority),
    #[error("clock period must be positive")]
    ZeroClockPeriod,
    #[error("event types `{first}` and `{second}` share tag {tag:#010x}")]
    EventTypeCollision {
        first: String,
        second: String,
        tag: u32,
    },
    #[error("invalid value `{value}` for {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid partitioning: {0}")]
    Partitioning(String),
    #[error("invalid model: {0}")]
    Model(String),
}

/// 仿真核心的致命错误
#[derive(Debug, Error)]
pub enum SimError {
    #[error("partition {partition}: activity at {time} inserted while clock is at {now}")]
    CausalityViolation {
        partition: PartitionId,
        time: SimTime,
        now: SimTime,
    },
    #[error("time vortex is empty")]
    QueueEmpty,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Serialization(#[from] WireError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("partition {partition}: no handler registered for {key}")]
    MissingHandler {
        partition: PartitionId,
        key: HandlerKey,
    },
    #[error("partition {partition}: exit refcount decremented below zero at {time}")]
    RefcountUnderflow {
        partition: PartitionId,
        time: SimTime,
    },
    #[error("partition {partition}: aborted because another partition failed")]
    RemoteAbort { partition: PartitionId },
    #[error("aborted by signal")]
    SignalAbort,
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::CausalityViolation { .. } => ErrorKind::CausalityViolation,
            SimError::QueueEmpty => ErrorKind::QueueEmpty,
            SimError::Transport(_) => ErrorKind::TransportError,
            SimError::Serialization(_) => ErrorKind::SerializationError,
            SimError::Config(_) => ErrorKind::ConfigError,
            SimError::MissingHandler { .. } => ErrorKind::MissingHandler,
            SimError::RefcountUnderflow { .. } => ErrorKind::RefcountUnderflow,
            SimError::RemoteAbort { .. } => ErrorKind::RemoteAbort,
            SimError::SignalAbort => ErrorKind::SignalAbort,
            SimError::Checkpoint(_) => ErrorKind::CheckpointError,
        }
    }

    /// 进程退出码：信号中止为 2，其余致命错误为 1。
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::SignalAbort => 2,
            _ => 1,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
