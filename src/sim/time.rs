//! 仿真时间类型
//!
//! 定义仿真时间（周期数）及其饱和运算。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 仿真时间（周期数），仿真开始时为 0。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    /// 表示“永远不会到达”的时间，用作 MIN 归约的单位元。
    pub const MAX: SimTime = SimTime(u64::MAX);

    pub fn cycles(n: u64) -> SimTime {
        SimTime(n)
    }

    pub fn saturating_add(self, delta: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(delta.0))
    }

    pub fn is_never(self) -> bool {
        self == SimTime::MAX
    }

    /// 严格大于当前时间的、`period` 的最小整数倍。
    ///
    /// `period` 为 0 时返回 `self`。
    pub fn next_multiple_of(self, period: SimTime) -> SimTime {
        if period.0 == 0 {
            return self;
        }
        let k = (self.0 / period.0).saturating_add(1);
        SimTime(k.saturating_mul(period.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "never")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
