//! 同一 rank 内线程之间的入站队列
//!
//! 共享内存下直接交接活动本身，不需要序列化。

use crate::sim::{Activity, ActivityKind};

#[derive(Debug, Default)]
pub struct ThreadSyncQueue {
    items: Vec<Activity>,
}

impl ThreadSyncQueue {
    pub fn push(&mut self, activity: Activity) {
        self.items.push(activity);
    }

    /// 取出全部活动，按 (time, priority, link) 稳定排序。
    ///
    /// 多个线程并发写入同一个队列时到达顺序不确定；同一链路上的事件来自同一个
    /// 发送方，稳定排序保留它们的先后。
    pub fn drain(&mut self) -> Vec<Activity> {
        let mut items = std::mem::take(&mut self.items);
        items.sort_by_key(|a| {
            let link = match a.kind() {
                ActivityKind::Event(ev) => ev.link.0,
                _ => u64::MAX,
            };
            (a.time(), a.priority(), link)
        });
        items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
