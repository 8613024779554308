//! 字节传输层抽象
//!
//! rank 之间只通过这里定义的集合通信与点对点收发交换数据。核心不关心底层实现：
//! 单 rank 时退化为本地读取，多 rank 时可以是进程内的 [`Fabric`] 或者其他实现。

mod fabric;
mod single;

pub use fabric::{Fabric, FabricEndpoint};
pub use single::SingleRank;

use thiserror::Error;

/// 归约运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    pub fn combine(self, acc: &mut [u64], input: &[u64]) {
        for (a, b) in acc.iter_mut().zip(input) {
            *a = match self {
                ReduceOp::Sum => a.saturating_add(*b),
                ReduceOp::Max => (*a).max(*b),
                ReduceOp::Min => (*a).min(*b),
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("rank {rank} does not exist")]
    NoSuchRank { rank: u32 },
    #[error("rank {rank} left the transport")]
    PeerDeparted { rank: u32 },
    #[error("all-reduce length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// 一个 rank 的传输端点。只有该 rank 的 0 号线程会使用它。
pub trait Transport: Send {
    fn rank(&self) -> u32;

    fn size(&self) -> u32;

    /// 对定宽整数做全归约，所有 rank 得到相同结果
    fn all_reduce(&mut self, input: &[u64], op: ReduceOp) -> Result<Vec<u64>, TransportError>;

    fn send(&mut self, dest: u32, bytes: Vec<u8>) -> Result<(), TransportError>;

    fn recv(&mut self, src: u32) -> Result<Vec<u8>, TransportError>;

    /// 与其他每个 rank 交换一个缓冲区。`outgoing[r]` 发往 rank r（自身的槽位忽略），
    /// 返回 (来源 rank, 缓冲区)，按 rank 升序。
    fn exchange(&mut self, outgoing: Vec<Vec<u8>>) -> Result<Vec<(u32, Vec<u8>)>, TransportError> {
        let me = self.rank();
        for (dest, bytes) in outgoing.into_iter().enumerate() {
            let dest = dest as u32;
            if dest != me {
                self.send(dest, bytes)?;
            }
        }
        let mut incoming = Vec::with_capacity(self.size().saturating_sub(1) as usize);
        for src in 0..self.size() {
            if src != me {
                incoming.push((src, self.recv(src)?));
            }
        }
        Ok(incoming)
    }
}
