//! 内置组件
//!
//! 此模块包含 JSON 模型可以直接引用的组件：乒乓、定时器和 PHOLD 负载。

// 子模块声明
mod phold;
mod ping_pong;
mod ticker;

// 重新导出公共接口
pub use phold::{MSG, Phold};
pub use ping_pong::{BALL, PingPong};
pub use ticker::Ticker;

/// 解析 8 字节小端整数序列；长度不符时返回 None
pub(crate) fn decode_words<const N: usize>(bytes: &[u8]) -> Option<[u64; N]> {
    if bytes.len() != N * 8 {
        return None;
    }
    let mut out = [0u64; N];
    for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        *word = u64::from_le_bytes(raw);
    }
    Some(out)
}

pub(crate) fn encode_words(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
