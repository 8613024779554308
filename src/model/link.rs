//! 链路类型
//!
//! 链路是组件之间有固定最小延迟的单向通道，由源分区持有；装配完成后不可变。

use crate::sim::{ComponentId, HandlerKey, LinkId, PartitionId, PortId, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 链路的接收端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkEnd {
    /// 同一分区：直接插入本地时间漩涡
    Local,
    /// 其他分区：交给同步管理器的出站队列，远端凭链路 id 重建处理器
    Remote { partition: PartitionId },
}

/// 网络链路
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub from: ComponentId,
    pub from_port: PortId,
    pub to: ComponentId,
    pub to_port: PortId,
    pub latency: SimTime,
    pub end: LinkEnd,
}

impl Link {
    /// 接收端的处理器键
    pub fn target(&self) -> HandlerKey {
        HandlerKey::port(self.to, self.to_port)
    }

    pub fn crosses_partition(&self) -> bool {
        matches!(self.end, LinkEnd::Remote { .. })
    }
}

/// 分区持有的出站链路表，按 (组件, 端口) 查找
#[derive(Debug, Default, Clone)]
pub struct LinkTable {
    links: Vec<Link>,
    by_port: HashMap<(ComponentId, PortId), usize>,
}

impl LinkTable {
    pub fn insert(&mut self, link: Link) {
        self.by_port
            .insert((link.from, link.from_port), self.links.len());
        self.links.push(link);
    }

    pub fn lookup(&self, component: ComponentId, port: PortId) -> Option<&Link> {
        self.by_port
            .get(&(component, port))
            .map(|&i| &self.links[i])
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// 本分区出发的跨分区链路中的最小延迟
    pub fn min_remote_latency(&self) -> Option<SimTime> {
        self.links
            .iter()
            .filter(|l| l.crosses_partition())
            .map(|l| l.latency)
            .min()
    }
}
