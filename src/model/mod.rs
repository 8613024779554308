//! 模型装配模块
//!
//! 此模块包含链路定义与模型构建器：把组件和链路切分到各个分区。

// 子模块声明
mod builder;
mod link;

// 重新导出公共接口
pub use builder::{Model, ModelBuilder, PartitionPlan, PlannedComponent};
pub use link::{Link, LinkEnd, LinkTable};
