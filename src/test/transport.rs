use crate::transport::{Fabric, ReduceOp, SingleRank, Transport, TransportError};
use std::thread;

#[test]
fn single_rank_reduces_locally() {
    let mut t = SingleRank::new();
    assert_eq!(t.size(), 1);
    assert_eq!(t.all_reduce(&[3, 4], ReduceOp::Min).expect("reduce"), vec![3, 4]);
    assert!(t.exchange(vec![Vec::new()]).expect("exchange").is_empty());
    assert_eq!(t.send(1, vec![1]), Err(TransportError::NoSuchRank { rank: 1 }));
}

#[test]
fn fabric_all_reduce_agrees_on_every_rank() {
    let endpoints = Fabric::new(3);
    let results: Vec<Vec<Vec<u64>>> = thread::scope(|s| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|mut ep| {
                s.spawn(move || {
                    let r = u64::from(ep.rank());
                    let mut out = Vec::new();
                    for op in [ReduceOp::Sum, ReduceOp::Max, ReduceOp::Min] {
                        out.push(ep.all_reduce(&[r + 1, 10 - r], op).expect("reduce"));
                    }
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });
    for per_rank in &results {
        assert_eq!(per_rank[0], vec![6, 27]);
        assert_eq!(per_rank[1], vec![3, 10]);
        assert_eq!(per_rank[2], vec![1, 8]);
    }
}

#[test]
fn fabric_exchange_delivers_by_source_rank() {
    let endpoints = Fabric::new(3);
    let results: Vec<(u32, Vec<(u32, Vec<u8>)>)> = thread::scope(|s| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|mut ep| {
                s.spawn(move || {
                    let me = ep.rank() as u8;
                    let outgoing = (0..3u8).map(|dest| vec![me, dest]).collect();
                    (ep.rank(), ep.exchange(outgoing).expect("exchange"))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });
    for (rank, incoming) in results {
        let srcs: Vec<u32> = incoming.iter().map(|(src, _)| *src).collect();
        assert_eq!(srcs, (0..3).filter(|r| *r != rank).collect::<Vec<_>>());
        for (src, bytes) in incoming {
            assert_eq!(bytes, vec![src as u8, rank as u8]);
        }
    }
}

#[test]
fn dropped_endpoint_wakes_waiting_peer() {
    let mut endpoints = Fabric::new(2);
    let gone = endpoints.pop().expect("rank 1");
    let mut ep = endpoints.pop().expect("rank 0");
    let waiter = thread::spawn(move || ep.recv(1));
    drop(gone);
    assert_eq!(
        waiter.join().expect("join"),
        Err(TransportError::PeerDeparted { rank: 1 })
    );
}

#[test]
fn departed_rank_does_not_cut_off_the_others() {
    let mut endpoints = Fabric::new(3);
    let mut r2 = endpoints.pop().expect("rank 2");
    let mut r1 = endpoints.pop().expect("rank 1");
    drop(endpoints.pop().expect("rank 0"));

    r1.send(2, vec![7]).expect("send to a live rank");
    assert_eq!(r2.recv(1).expect("recv from a live rank"), vec![7]);
    r2.send(1, vec![8]).expect("send back");
    assert_eq!(r1.recv(2).expect("recv back"), vec![8]);

    assert_eq!(r1.send(0, vec![1]), Err(TransportError::PeerDeparted { rank: 0 }));
    assert_eq!(r2.recv(0), Err(TransportError::PeerDeparted { rank: 0 }));
    assert_eq!(
        r1.all_reduce(&[1], ReduceOp::Sum),
        Err(TransportError::PeerDeparted { rank: 0 })
    );
}

#[test]
fn queued_message_survives_sender_departure() {
    let mut endpoints = Fabric::new(2);
    let mut r1 = endpoints.pop().expect("rank 1");
    let mut r0 = endpoints.pop().expect("rank 0");
    r0.send(1, vec![3, 4]).expect("send");
    drop(r0);
    assert_eq!(r1.recv(0).expect("queued bytes"), vec![3, 4]);
    assert_eq!(r1.recv(0), Err(TransportError::PeerDeparted { rank: 0 }));
}
