//! 跨分区同步模块
//!
//! 此模块包含活动的线格式、rank/线程间的出入站队列，以及驱动保守同步屏障的同步管理器。

// 子模块声明
mod rank_queue;
mod rank_shared;
mod sync_manager;
mod thread_queue;
mod wire;

// 重新导出公共接口
pub use rank_queue::RankSyncQueue;
pub use rank_shared::{RankFault, RankShared, RemoteTarget};
pub use sync_manager::SyncManager;
pub use thread_queue::ThreadSyncQueue;
pub use wire::{
    EventTypeRegistry, HEADER_LEN, RECORD_FIXED_LEN, WireError, WireEvent, begin_buffer,
    decode_buffer, encode_event, finish_buffer, payload_len,
};
