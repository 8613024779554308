//! 模型装配
//!
//! 装配阶段是单线程的：登记组件与链路、校验配置，最后按 rank × thread 切分成
//! 各分区的计划。`build` 之后所有表都只读。

use super::link::{Link, LinkEnd, LinkTable};
use crate::sim::{Component, ComponentId, ConfigError, LinkId, PartitionId, PortId, SimTime};
use crate::sync::{EventTypeRegistry, RemoteTarget};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// 分配到某个分区的组件
pub struct PlannedComponent {
    pub id: ComponentId,
    pub name: String,
    pub component: Box<dyn Component>,
}

/// 一个分区的装配结果
pub struct PartitionPlan {
    pub id: PartitionId,
    pub components: Vec<PlannedComponent>,
    pub links: LinkTable,
    /// 整个模型共用的事件类型表
    pub event_types: Arc<EventTypeRegistry>,
}

/// 装配完成、已按分区切分的模型
pub struct Model {
    pub(crate) ranks: u32,
    pub(crate) threads: u32,
    pub(crate) partitions: Vec<PartitionPlan>,
    /// 每个 rank 一张：远端链路 id -> (线程, 处理器)
    pub(crate) demux: Vec<HashMap<LinkId, RemoteTarget>>,
    pub(crate) event_types: Arc<EventTypeRegistry>,
}

impl Model {
    pub fn ranks(&self) -> u32 {
        self.ranks
    }

    pub fn threads(&self) -> u32 {
        self.threads
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partitions(&self) -> &[PartitionPlan] {
        &self.partitions
    }

    pub fn event_types(&self) -> &Arc<EventTypeRegistry> {
        &self.event_types
    }

    /// 拆出单个分区计划（单分区测试用）
    pub fn into_partitions(self) -> Vec<PartitionPlan> {
        self.partitions
    }
}

struct PendingComponent {
    id: ComponentId,
    name: String,
    hint: u32,
    component: Box<dyn Component>,
}

struct PendingLink {
    id: LinkId,
    from: ComponentId,
    from_port: PortId,
    to: ComponentId,
    to_port: PortId,
    latency: SimTime,
}

#[derive(Default)]
pub struct ModelBuilder {
    components: Vec<PendingComponent>,
    names: HashMap<String, ComponentId>,
    links: Vec<PendingLink>,
    wired: HashSet<(ComponentId, PortId)>,
    event_types: EventTypeRegistry,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加组件。`partition` 是线性分区提示，实际落在 `partition mod (ranks·threads)`。
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        partition: u32,
        component: Box<dyn Component>,
    ) -> Result<ComponentId, ConfigError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(ConfigError::DuplicateComponent(name));
        }
        for ty in component.event_types() {
            self.event_types.register(ty)?;
        }
        let id = ComponentId(self.components.len() as u32);
        self.names.insert(name.clone(), id);
        self.components.push(PendingComponent {
            id,
            name,
            hint: partition,
            component,
        });
        Ok(id)
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.names.get(name).copied()
    }

    /// 额外登记一个事件类型名
    pub fn register_event_type(&mut self, name: &str) -> Result<(), ConfigError> {
        self.event_types.register(name).map(|_| ())
    }

    /// 连接两个组件端口（创建单向链路）。from == to 时即自链路。
    pub fn connect(
        &mut self,
        from: ComponentId,
        from_port: PortId,
        to: ComponentId,
        to_port: PortId,
        latency: SimTime,
    ) -> Result<LinkId, ConfigError> {
        for c in [from, to] {
            if c.0 as usize >= self.components.len() {
                return Err(ConfigError::UnknownComponent(format!("#{}", c.0)));
            }
        }
        if !self.wired.insert((from, from_port)) {
            return Err(ConfigError::PortAlreadyWired {
                component: from,
                port: from_port,
            });
        }
        let id = LinkId(self.links.len() as u64);
        self.links.push(PendingLink {
            id,
            from,
            from_port,
            to,
            to_port,
            latency,
        });
        Ok(id)
    }

    /// 按 rank × thread 切分
    pub fn build(self, ranks: u32, threads: u32) -> Result<Model, ConfigError> {
        if ranks == 0 || threads == 0 {
            return Err(ConfigError::Partitioning(format!(
                "ranks ({ranks}) and threads ({threads}) must be positive"
            )));
        }
        let total = ranks.saturating_mul(threads);
        let placement: Vec<PartitionId> = self
            .components
            .iter()
            .map(|c| PartitionId::from_linear(c.hint % total, threads))
            .collect();

        let event_types = Arc::new(self.event_types);
        let mut partitions: Vec<PartitionPlan> = (0..total)
            .map(|q| PartitionPlan {
                id: PartitionId::from_linear(q, threads),
                components: Vec::new(),
                links: LinkTable::default(),
                event_types: Arc::clone(&event_types),
            })
            .collect();
        let mut demux: Vec<HashMap<LinkId, RemoteTarget>> =
            (0..ranks).map(|_| HashMap::new()).collect();

        for link in &self.links {
            let src = placement[link.from.0 as usize];
            let dst = placement[link.to.0 as usize];
            let end = if src == dst {
                LinkEnd::Local
            } else {
                if link.latency == SimTime::ZERO {
                    return Err(ConfigError::ZeroLookahead {
                        from: link.from,
                        to: link.to,
                    });
                }
                demux[dst.rank as usize].insert(
                    link.id,
                    RemoteTarget {
                        thread: dst.thread,
                        handler: crate::sim::HandlerKey::port(link.to, link.to_port),
                    },
                );
                LinkEnd::Remote { partition: dst }
            };
            partitions[src.linear(threads)].links.insert(Link {
                id: link.id,
                from: link.from,
                from_port: link.from_port,
                to: link.to,
                to_port: link.to_port,
                latency: link.latency,
                end,
            });
        }

        for (c, part) in self.components.into_iter().zip(&placement) {
            debug!(component = %c.name, partition = %part, "组件分配到分区");
            partitions[part.linear(threads)]
                .components
                .push(PlannedComponent {
                    id: c.id,
                    name: c.name,
                    component: c.component,
                });
        }

        info!(
            ranks,
            threads,
            links = self.links.len(),
            event_types = event_types.len(),
            "🔧 模型装配完成"
        );
        Ok(Model {
            ranks,
            threads,
            partitions,
            demux,
            event_types,
        })
    }
}
