//! 单 rank 传输：集合通信退化为本地读取。

use super::{ReduceOp, Transport, TransportError};

#[derive(Debug, Default)]
pub struct SingleRank;

impl SingleRank {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for SingleRank {
    fn rank(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        1
    }

    fn all_reduce(&mut self, input: &[u64], _op: ReduceOp) -> Result<Vec<u64>, TransportError> {
        Ok(input.to_vec())
    }

    fn send(&mut self, dest: u32, _bytes: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::NoSuchRank { rank: dest })
    }

    fn recv(&mut self, src: u32) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::NoSuchRank { rank: src })
    }

    fn exchange(&mut self, _outgoing: Vec<Vec<u8>>) -> Result<Vec<(u32, Vec<u8>)>, TransportError> {
        Ok(Vec::new())
    }
}
