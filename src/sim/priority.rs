//! 活动优先级
//!
//! 同一时刻的活动按优先级从小到大执行。保留的动作优先级低于所有模型优先级，
//! 保证在同步视界 H 上的屏障先于 H 时刻的任何模型活动。

/// 优先级：数值越小越早执行。
pub type Priority = i32;

/// 终止动作
pub const STOP: Priority = -1000;
/// 同步屏障
pub const SYNC: Priority = -900;
/// 检查点屏障
pub const CHECKPOINT: Priority = -800;
/// 模型活动允许的最小优先级（不含）
pub const RESERVED_MAX: Priority = CHECKPOINT;

/// 时钟默认优先级
pub const CLOCK: Priority = 40;
/// 事件默认优先级
pub const EVENT: Priority = 50;
/// 单分区模式下的退出检查，排在同一周期内所有模型活动之后
pub const EXIT_CHECK: Priority = 99;

/// 模型活动是否可以使用该优先级
pub fn is_model_priority(p: Priority) -> bool {
    p > RESERVED_MAX
}
