//! 跨 rank 的出站队列
//!
//! 每个远端 rank 一个，事件在入队时直接序列化进字节缓冲区，屏障时整体交给传输层。

use super::wire::{self, WireError};
use crate::sim::{Event, Priority, SimTime};

#[derive(Debug)]
pub struct RankSyncQueue {
    buf: Vec<u8>,
    count: usize,
}

impl Default for RankSyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RankSyncQueue {
    pub fn new() -> Self {
        let mut buf = Vec::new();
        wire::begin_buffer(&mut buf);
        Self { buf, count: 0 }
    }

    /// 序列化一条事件；编码失败时队列不变。
    pub fn push(
        &mut self,
        time: SimTime,
        priority: Priority,
        event: &Event,
    ) -> Result<(), WireError> {
        wire::encode_event(&mut self.buf, time, priority, event)?;
        self.count += 1;
        Ok(())
    }

    /// 取出带头部的完整缓冲区，队列复位为空。
    pub fn take_buffer(&mut self) -> Vec<u8> {
        let mut out = std::mem::take(&mut self.buf);
        wire::finish_buffer(&mut out);
        wire::begin_buffer(&mut self.buf);
        self.count = 0;
        out
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 当前缓冲区字节数（含头部）
    pub fn bytes(&self) -> usize {
        self.buf.len()
    }
}
