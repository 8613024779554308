//! 信号标志
//!
//! SIGINT/SIGTERM 只设置一个原子标志；调度循环在两个活动之间检查它，
//! 正在执行的处理器总会先执行完。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 进程内共享的中止请求标志
#[derive(Debug, Clone, Default)]
pub struct SignalFlag(Arc<AtomicBool>);

impl SignalFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建标志并登记 SIGINT 与 SIGTERM
    pub fn install() -> std::io::Result<Self> {
        let flag = Self::new();
        #[cfg(unix)]
        {
            use signal_hook::consts::{SIGINT, SIGTERM};
            signal_hook::flag::register(SIGINT, Arc::clone(&flag.0))?;
            signal_hook::flag::register(SIGTERM, Arc::clone(&flag.0))?;
        }
        Ok(flag)
    }

    /// 以编程方式触发（测试用）
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
