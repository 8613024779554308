//! 配置
//!
//! `RuntimeConfig` 是运行参数（分区数、结束时间、检查点周期），可被环境变量覆盖；
//! `ModelSpec` 是 JSON 形式的模型描述，构建为 [`Model`]。

use crate::components::{PingPong, Phold, Ticker};
use crate::model::{Model, ModelBuilder};
use crate::sim::{Component, ConfigError, PortId, Priority, SimTime, priority};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const ENV_STOP_AT: &str = "SIM_STOP_AT";
pub const ENV_CHECKPOINT_PERIOD: &str = "SIM_CHECKPOINT_PERIOD";

/// 没有跨分区链路时的默认屏障间隔
pub const DEFAULT_IDLE_SYNC_PERIOD: SimTime = SimTime(1_000_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub ranks: u32,
    pub threads: u32,
    pub stop_at: Option<SimTime>,
    pub checkpoint_period: Option<SimTime>,
    pub idle_sync_period: SimTime,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ranks: 1,
            threads: 1,
            stop_at: None,
            checkpoint_period: None,
            idle_sync_period: DEFAULT_IDLE_SYNC_PERIOD,
        }
    }
}

fn parse_cycles(var: &'static str, value: &str) -> Result<SimTime, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(SimTime)
        .map_err(|_| ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        })
}

impl RuntimeConfig {
    /// 默认配置叠加进程环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// 默认配置叠加 `lookup` 提供的变量（测试时可以不碰进程环境）
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_with(lookup)?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|k| std::env::var(k).ok())
    }

    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup(ENV_STOP_AT) {
            self.stop_at = Some(parse_cycles(ENV_STOP_AT, &v)?);
        }
        if let Some(v) = lookup(ENV_CHECKPOINT_PERIOD) {
            let period = parse_cycles(ENV_CHECKPOINT_PERIOD, &v)?;
            if period == SimTime::ZERO {
                return Err(ConfigError::InvalidEnv {
                    var: ENV_CHECKPOINT_PERIOD,
                    value: v,
                });
            }
            self.checkpoint_period = Some(period);
        }
        debug!(stop_at = ?self.stop_at, checkpoint_period = ?self.checkpoint_period, "读取环境变量");
        Ok(())
    }

    pub fn partitions(&self) -> u32 {
        self.ranks.saturating_mul(self.threads)
    }

    /// run() 的结束时间；未设置时为“永不”
    pub fn end_time(&self) -> SimTime {
        self.stop_at.unwrap_or(SimTime::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ranks == 0 || self.threads == 0 {
            return Err(ConfigError::Partitioning(format!(
                "ranks ({}) and threads ({}) must be positive",
                self.ranks, self.threads
            )));
        }
        if self.checkpoint_period == Some(SimTime::ZERO) {
            return Err(ConfigError::Model(
                "checkpoint period must be positive".to_string(),
            ));
        }
        if self.idle_sync_period == SimTime::ZERO {
            return Err(ConfigError::Model(
                "idle sync period must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// JSON 模型描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    /// 线性分区提示
    #[serde(default)]
    pub partition: u32,
    #[serde(flatten)]
    pub kind: ComponentKind,
}

fn default_volleys() -> u64 {
    10
}

fn default_initial() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentKind {
    PingPong {
        #[serde(default = "default_volleys")]
        volleys: u64,
        #[serde(default)]
        serve: bool,
    },
    Ticker {
        period: u64,
        #[serde(default)]
        ticks: u64,
        #[serde(default)]
        priority: Option<Priority>,
    },
    Phold {
        #[serde(default)]
        seed: u64,
        #[serde(default = "default_initial")]
        initial: u32,
        hops: u64,
        #[serde(default)]
        max_delay: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    pub from: String,
    #[serde(default)]
    pub from_port: u32,
    pub to: String,
    #[serde(default)]
    pub to_port: u32,
    /// 有符号，负值在构建时报错
    pub latency: i64,
}

impl ModelSpec {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Model(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Model(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// 实例化组件、连接链路并按 ranks × threads 切分
    pub fn build(&self, ranks: u32, threads: u32) -> Result<Model, ConfigError> {
        // Phold 需要知道自己有哪些出端口
        let mut out_ports: BTreeMap<&str, Vec<PortId>> = BTreeMap::new();
        for link in &self.links {
            out_ports
                .entry(link.from.as_str())
                .or_default()
                .push(PortId(link.from_port));
        }

        let mut builder = ModelBuilder::new();
        for spec in &self.components {
            let ports = out_ports
                .get(spec.name.as_str())
                .cloned()
                .unwrap_or_default();
            builder.add_component(spec.name.clone(), spec.partition, spec.kind.instantiate(ports)?)?;
        }

        for link in &self.links {
            if link.latency < 0 {
                return Err(ConfigError::NegativeLatency {
                    from: link.from.clone(),
                    from_port: link.from_port,
                    to: link.to.clone(),
                    to_port: link.to_port,
                    latency: link.latency,
                });
            }
            let from = builder
                .component_id(&link.from)
                .ok_or_else(|| ConfigError::UnknownComponent(link.from.clone()))?;
            let to = builder
                .component_id(&link.to)
                .ok_or_else(|| ConfigError::UnknownComponent(link.to.clone()))?;
            builder.connect(
                from,
                PortId(link.from_port),
                to,
                PortId(link.to_port),
                SimTime(link.latency as u64),
            )?;
        }
        builder.build(ranks, threads)
    }
}

impl ComponentKind {
    fn instantiate(&self, mut ports: Vec<PortId>) -> Result<Box<dyn Component>, ConfigError> {
        Ok(match *self {
            ComponentKind::PingPong { volleys, serve } => Box::new(PingPong::new(volleys, serve)),
            ComponentKind::Ticker {
                period,
                ticks,
                priority: p,
            } => {
                if period == 0 {
                    return Err(ConfigError::ZeroClockPeriod);
                }
                let p = p.unwrap_or(priority::CLOCK);
                if !priority::is_model_priority(p) {
                    return Err(ConfigError::ReservedPriority(p));
                }
                Box::new(Ticker::new(SimTime(period), ticks, p))
            }
            ComponentKind::Phold {
                seed,
                initial,
                hops,
                max_delay,
            } => {
                ports.sort();
                ports.dedup();
                Box::new(Phold::new(seed, initial, hops, SimTime(max_delay), ports))
            }
        })
    }
}
