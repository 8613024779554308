//! 活动序列化
//!
//! 跨 rank 交换的缓冲区格式（小端）：
//!
//! ```text
//! header { u64 buffer_size }                      // 含头部在内的总字节数
//! body   repeated { u32 type_tag; u64 delivery_time; i32 priority;
//!                   u64 link_id;  u32 payload_len; u8 payload[payload_len] }
//! ```
//!
//! 插入序号不参与序列化，由接收分区重新分配。

use crate::sim::{ConfigError, Event, EventType, LinkId, Priority, SimTime};
use std::collections::HashMap;
use thiserror::Error;

pub const HEADER_LEN: usize = 8;
/// 单条记录除 payload 以外的字节数
pub const RECORD_FIXED_LEN: usize = 4 + 8 + 4 + 8 + 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("buffer truncated at offset {offset}: need {needed} bytes, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("buffer header declares {declared} bytes but {actual} were received")]
    SizeMismatch { declared: u64, actual: usize },
    #[error("unknown event type tag {0:#010x}")]
    UnknownType(u32),
    #[error("no remote endpoint for link {0:?} on this rank")]
    UnknownLink(LinkId),
    #[error("payload of {len} bytes does not fit the u32 length field")]
    PayloadTooLarge { len: usize },
}

/// 解码后的一条跨 rank 事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEvent {
    pub ty: EventType,
    pub time: SimTime,
    pub priority: Priority,
    pub link: LinkId,
    pub payload: Vec<u8>,
}

/// 事件类型表：装配时填充，之后只读。
#[derive(Debug, Default, Clone)]
pub struct EventTypeRegistry {
    names: HashMap<u32, String>,
}

impl EventTypeRegistry {
    /// 登记事件类型；同名重复登记是幂等的，不同名字散列冲突则报错。
    pub fn register(&mut self, name: &str) -> Result<EventType, ConfigError> {
        let ty = EventType::named(name);
        match self.names.get(&ty.tag()) {
            Some(existing) if existing != name => Err(ConfigError::EventTypeCollision {
                first: existing.clone(),
                second: name.to_string(),
                tag: ty.tag(),
            }),
            Some(_) => Ok(ty),
            None => {
                self.names.insert(ty.tag(), name.to_string());
                Ok(ty)
            }
        }
    }

    pub fn contains(&self, ty: EventType) -> bool {
        self.names.contains_key(&ty.tag())
    }

    pub fn name(&self, ty: EventType) -> Option<&str> {
        self.names.get(&ty.tag()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// 写入一个空缓冲区的头部占位
pub fn begin_buffer(buf: &mut Vec<u8>) {
    buf.clear();
    buf.extend_from_slice(&0u64.to_le_bytes());
}

/// payload 长度字段。超过 `u32::MAX` 的 payload 无法编码。
pub fn payload_len(len: usize) -> Result<u32, WireError> {
    u32::try_from(len).map_err(|_| WireError::PayloadTooLarge { len })
}

/// 追加一条事件记录。出错时缓冲区保持不变。
pub fn encode_event(
    buf: &mut Vec<u8>,
    time: SimTime,
    priority: Priority,
    event: &Event,
) -> Result<(), WireError> {
    let len = payload_len(event.payload.len())?;
    buf.reserve(RECORD_FIXED_LEN + event.payload.len());
    buf.extend_from_slice(&event.ty.tag().to_le_bytes());
    buf.extend_from_slice(&time.0.to_le_bytes());
    buf.extend_from_slice(&priority.to_le_bytes());
    buf.extend_from_slice(&event.link.0.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&event.payload);
    Ok(())
}

/// 把总长度写回头部
pub fn finish_buffer(buf: &mut [u8]) {
    let len = buf.len() as u64;
    buf[..HEADER_LEN].copy_from_slice(&len.to_le_bytes());
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(WireError::Truncated {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}

/// 解码完整缓冲区。未知类型标签或截断都是致命错误。
pub fn decode_buffer(
    buf: &[u8],
    registry: &EventTypeRegistry,
) -> Result<Vec<WireEvent>, WireError> {
    let mut r = Reader { buf, pos: 0 };
    let declared = r.u64()?;
    if declared != buf.len() as u64 {
        return Err(WireError::SizeMismatch {
            declared,
            actual: buf.len(),
        });
    }

    let mut out = Vec::new();
    while !r.at_end() {
        let ty = EventType(r.u32()?);
        let time = SimTime(r.u64()?);
        let priority = r.i32()?;
        let link = LinkId(r.u64()?);
        let len = r.u32()? as usize;
        let payload = r.take(len)?.to_vec();
        if !registry.contains(ty) {
            return Err(WireError::UnknownType(ty.tag()));
        }
        out.push(WireEvent {
            ty,
            time,
            priority,
            link,
            payload,
        });
    }
    Ok(out)
}
