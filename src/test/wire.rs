use crate::sim::{
    ComponentId, ErrorKind, Event, EventType, HandlerKey, LinkId, PartitionId, PortId, SimTime,
};
use crate::sync::{
    EventTypeRegistry, HEADER_LEN, RECORD_FIXED_LEN, RankShared, WireError, begin_buffer,
    decode_buffer, encode_event, finish_buffer, payload_len,
};
use std::collections::HashMap;
use std::sync::Arc;

fn registry() -> EventTypeRegistry {
    let mut reg = EventTypeRegistry::default();
    reg.register("wire.a").expect("register");
    reg.register("wire.b").expect("register");
    reg
}

fn event(name: &str, link: u64, payload: &[u8]) -> Event {
    Event {
        link: LinkId(link),
        ty: EventType::named(name),
        payload: payload.to_vec(),
        handler: HandlerKey::port(ComponentId(0), PortId(0)),
    }
}

#[test]
fn buffer_carries_events_in_order() {
    let mut buf = Vec::new();
    begin_buffer(&mut buf);
    encode_event(&mut buf, SimTime(10), 50, &event("wire.a", 3, b"hello")).expect("encode");
    encode_event(&mut buf, SimTime(12), -7, &event("wire.b", 9, b"")).expect("encode");
    finish_buffer(&mut buf);
    assert_eq!(buf.len(), HEADER_LEN + 2 * RECORD_FIXED_LEN + 5);

    let out = decode_buffer(&buf, &registry()).expect("decode");
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].time, SimTime(10));
    assert_eq!(out[0].priority, 50);
    assert_eq!(out[0].link, LinkId(3));
    assert_eq!(out[0].payload, b"hello");
    assert_eq!(out[1].ty, EventType::named("wire.b"));
    assert_eq!(out[1].priority, -7);
    assert!(out[1].payload.is_empty());
}

#[test]
fn empty_buffer_is_header_only() {
    let mut buf = Vec::new();
    begin_buffer(&mut buf);
    finish_buffer(&mut buf);
    assert_eq!(buf.len(), HEADER_LEN);
    assert!(decode_buffer(&buf, &registry()).expect("decode").is_empty());
}

#[test]
fn unknown_type_is_rejected() {
    let mut buf = Vec::new();
    begin_buffer(&mut buf);
    encode_event(&mut buf, SimTime(1), 50, &event("wire.unknown", 0, b"x")).expect("encode");
    finish_buffer(&mut buf);
    assert_eq!(
        decode_buffer(&buf, &registry()),
        Err(WireError::UnknownType(EventType::named("wire.unknown").tag()))
    );
}

#[test]
fn truncated_and_resized_buffers_are_rejected() {
    let mut buf = Vec::new();
    begin_buffer(&mut buf);
    encode_event(&mut buf, SimTime(1), 50, &event("wire.a", 0, b"abcdef")).expect("encode");
    finish_buffer(&mut buf);

    let mut short = buf.clone();
    short.truncate(buf.len() - 2);
    assert!(matches!(
        decode_buffer(&short, &registry()),
        Err(WireError::SizeMismatch { .. })
    ));

    // 头部与长度一致但记录被截断
    finish_buffer(&mut short);
    assert!(matches!(
        decode_buffer(&short, &registry()),
        Err(WireError::Truncated { .. })
    ));

    assert!(matches!(
        decode_buffer(&buf[..4], &registry()),
        Err(WireError::Truncated { offset: 0, .. })
    ));
}

#[test]
fn registration_is_idempotent() {
    let mut reg = EventTypeRegistry::default();
    let a = reg.register("wire.a").expect("first");
    let again = reg.register("wire.a").expect("second");
    assert_eq!(a, again);
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.name(a), Some("wire.a"));
    assert!(!reg.contains(EventType::named("wire.b")));
}

#[test]
fn event_type_tags_are_stable() {
    // FNV-1a 32 位
    assert_eq!(EventType::named("").tag(), 0x811c_9dc5);
    assert_eq!(EventType::named("a").tag(), 0xe40c_292c);
}

#[test]
fn payload_length_must_fit_u32() {
    assert_eq!(payload_len(0), Ok(0));
    assert_eq!(payload_len(u32::MAX as usize), Ok(u32::MAX));
    let len = u32::MAX as usize + 1;
    assert_eq!(payload_len(len), Err(WireError::PayloadTooLarge { len }));
}

#[test]
fn route_checks_type_and_destination() {
    let shared = RankShared::new(0, 2, 2, HashMap::new(), Arc::new(registry()));

    shared
        .route(PartitionId::new(0, 1), SimTime(5), 50, event("wire.a", 0, b"x"))
        .expect("same rank");
    shared
        .route(PartitionId::new(1, 0), SimTime(5), 50, event("wire.b", 1, b"y"))
        .expect("other rank");
    assert_eq!(shared.drain_inbox(1).len(), 1);

    // 同 rank 与跨 rank 对未登记类型给出同一种错误
    for dest in [PartitionId::new(0, 1), PartitionId::new(1, 0)] {
        let err = shared
            .route(dest, SimTime(5), 50, event("wire.unknown", 0, b""))
            .expect_err("undeclared type");
        assert_eq!(err.kind(), ErrorKind::SerializationError, "{dest}");
    }

    for dest in [PartitionId::new(0, 7), PartitionId::new(4, 0)] {
        let err = shared
            .route(dest, SimTime(5), 50, event("wire.a", 0, b""))
            .expect_err("no such partition");
        assert_eq!(err.kind(), ErrorKind::ConfigError, "{dest}");
    }
}
