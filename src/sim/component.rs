//! 组件接口
//!
//! 组件拥有自身状态，只通过链路事件和时钟节拍与外界交互。

use super::activity::Event;
use super::context::Context;
use super::error::SimResult;
use super::id::{ComponentId, HandlerKey, PortId};
use super::time::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 时钟处理器的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockControl {
    Continue,
    /// 本次之后不再重新调度
    Stop,
}

/// 组件在 finish() 时上报的计数器
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub counters: BTreeMap<String, u64>,
}

impl ComponentSummary {
    pub fn with(mut self, name: &str, value: u64) -> Self {
        self.counters.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }
}

/// 仿真组件。
///
/// 处理器同步执行直到返回，不能挂起；返回 `Err` 表示致命错误。
pub trait Component: Send {
    /// 组件会发送的事件类型名，装配时登记到事件类型表
    fn event_types(&self) -> &[&'static str] {
        &[]
    }

    /// 装配完成后、运行开始前调用一次（时间为 0）
    fn setup(&mut self, _ctx: &mut Context<'_>) -> SimResult<()> {
        Ok(())
    }

    /// 处理从 `port` 到达的事件
    fn handle_event(&mut self, port: PortId, event: Event, ctx: &mut Context<'_>) -> SimResult<()>;

    /// 处理时钟节拍
    fn clock_tick(
        &mut self,
        _tag: u32,
        _cycle: SimTime,
        _ctx: &mut Context<'_>,
    ) -> SimResult<ClockControl> {
        Ok(ClockControl::Stop)
    }

    fn finish(&mut self, _end_time: SimTime) -> ComponentSummary {
        ComponentSummary::default()
    }

    /// 检查点：组件状态的不透明字节
    fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }

    fn restore(&mut self, _state: &[u8]) -> SimResult<()> {
        Ok(())
    }
}

/// 分区本地的处理器表：组件 id -> 组件在分区内的下标。
///
/// 装配阶段填充，运行期间只读。
#[derive(Debug, Default, Clone)]
pub struct HandlerTable {
    index: HashMap<ComponentId, usize>,
}

impl HandlerTable {
    pub fn insert(&mut self, component: ComponentId, slot: usize) {
        self.index.insert(component, slot);
    }

    pub fn resolve(&self, key: &HandlerKey) -> Option<usize> {
        self.index.get(&key.component).copied()
    }

    pub fn slot(&self, component: ComponentId) -> Option<usize> {
        self.index.get(&component).copied()
    }

    pub fn contains(&self, key: &HandlerKey) -> bool {
        self.index.contains_key(&key.component)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
