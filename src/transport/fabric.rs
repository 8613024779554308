//! 进程内多 rank 传输
//!
//! 每个 rank 持有一个端点；点对点消息放进 (src, dst) 信箱，全归约按代次计数。
//! 端点被丢弃后只影响依赖它的操作：发往它、等它的信箱、或等它参加的全归约
//! 得到 `PeerDeparted`，其余 rank 之间照常通信。

use super::{ReduceOp, Transport, TransportError};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct ReduceRound {
    arrived: u32,
    acc: Option<Vec<u64>>,
    generation: u64,
    result: Vec<u64>,
}

#[derive(Debug, Default)]
struct FabricState {
    mailboxes: HashMap<(u32, u32), VecDeque<Vec<u8>>>,
    reduce: ReduceRound,
    /// 已经离开的 rank
    departed: BTreeSet<u32>,
}

impl FabricState {
    fn first_departed(&self) -> Result<(), TransportError> {
        match self.departed.first() {
            Some(&rank) => Err(TransportError::PeerDeparted { rank }),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct FabricShared {
    size: u32,
    state: Mutex<FabricState>,
    cv: Condvar,
}

/// 进程内传输网络的构造器
pub struct Fabric;

impl Fabric {
    /// 创建 `size` 个互联的端点，下标即 rank。
    pub fn new(size: u32) -> Vec<FabricEndpoint> {
        let shared = Arc::new(FabricShared {
            size: size.max(1),
            state: Mutex::new(FabricState::default()),
            cv: Condvar::new(),
        });
        (0..size.max(1))
            .map(|rank| FabricEndpoint {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct FabricEndpoint {
    rank: u32,
    shared: Arc<FabricShared>,
}

impl Transport for FabricEndpoint {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.shared.size
    }

    fn all_reduce(&mut self, input: &[u64], op: ReduceOp) -> Result<Vec<u64>, TransportError> {
        let mut st = self.shared.state.lock();
        // 有成员离开后这一代永远凑不齐
        st.first_departed()?;
        let generation = st.reduce.generation;
        match st.reduce.acc.as_mut() {
            None => st.reduce.acc = Some(input.to_vec()),
            Some(acc) => {
                if acc.len() != input.len() {
                    return Err(TransportError::LengthMismatch {
                        expected: acc.len(),
                        got: input.len(),
                    });
                }
                op.combine(acc, input);
            }
        }
        st.reduce.arrived += 1;
        trace!(rank = self.rank, arrived = st.reduce.arrived, "all_reduce 到达");

        if st.reduce.arrived == self.shared.size {
            let result = st.reduce.acc.take().unwrap_or_default();
            st.reduce.result = result.clone();
            st.reduce.arrived = 0;
            st.reduce.generation = st.reduce.generation.wrapping_add(1);
            self.shared.cv.notify_all();
            return Ok(result);
        }

        loop {
            self.shared.cv.wait(&mut st);
            if st.reduce.generation != generation {
                return Ok(st.reduce.result.clone());
            }
            st.first_departed()?;
        }
    }

    fn send(&mut self, dest: u32, bytes: Vec<u8>) -> Result<(), TransportError> {
        if dest >= self.shared.size {
            return Err(TransportError::NoSuchRank { rank: dest });
        }
        let mut st = self.shared.state.lock();
        if st.departed.contains(&dest) {
            return Err(TransportError::PeerDeparted { rank: dest });
        }
        trace!(src = self.rank, dest, bytes = bytes.len(), "发送缓冲区");
        st.mailboxes
            .entry((self.rank, dest))
            .or_default()
            .push_back(bytes);
        self.shared.cv.notify_all();
        Ok(())
    }

    fn recv(&mut self, src: u32) -> Result<Vec<u8>, TransportError> {
        if src >= self.shared.size {
            return Err(TransportError::NoSuchRank { rank: src });
        }
        let mut st = self.shared.state.lock();
        loop {
            if let Some(bytes) = st
                .mailboxes
                .get_mut(&(src, self.rank))
                .and_then(VecDeque::pop_front)
            {
                return Ok(bytes);
            }
            if st.departed.contains(&src) {
                return Err(TransportError::PeerDeparted { rank: src });
            }
            self.shared.cv.wait(&mut st);
        }
    }
}

impl Drop for FabricEndpoint {
    fn drop(&mut self) {
        let mut st = self.shared.state.lock();
        debug!(rank = self.rank, "传输端点离开");
        st.departed.insert(self.rank);
        self.shared.cv.notify_all();
    }
}
