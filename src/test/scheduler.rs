use super::common::{MSG, Script, entries, new_log, payload, push, serial_partition, tag_of};
use crate::components::PingPong;
use crate::model::ModelBuilder;
use crate::sim::{
    ClockControl, ClockRegistry, ConfigError, ErrorKind, PortId, SendOptions, SimError, SimTime,
    StopReason,
};

#[test]
fn clock_reschedules_until_end_time() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| {
                assert_eq!(ctx.register_clock(SimTime(10), 0, 0)?, SimTime(10));
                Ok(())
            })
            .on_tick(move |_, cycle, ctx| {
                assert_eq!(cycle, ctx.now());
                push(&l, "h", ctx, 0);
                Ok(ClockControl::Continue)
            })
            .boxed(),
    )
    .expect("add");

    let mut p = serial_partition(b);
    let outcome = p.run(SimTime(35)).expect("run");
    let times: Vec<u64> = entries(&log).iter().map(|e| e.time).collect();
    assert_eq!(times, vec![10, 20, 30]);
    assert_eq!(outcome.reason, StopReason::EndTime);
    assert_eq!(outcome.end_time, SimTime(35));
    assert_eq!(p.stats().clock_ticks, 3);
}

#[test]
fn activity_at_end_time_is_dispatched() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| ctx.register_clock(SimTime(10), 40, 0).map(|_| ()))
            .on_tick(move |_, _, ctx| {
                push(&l, "h", ctx, 0);
                Ok(ClockControl::Continue)
            })
            .boxed(),
    )
    .expect("add");

    let mut p = serial_partition(b);
    p.run(SimTime(30)).expect("run");
    assert_eq!(entries(&log).last().map(|e| e.time), Some(30));
}

#[test]
fn zero_delay_self_event_runs_between_priorities() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    let x = b
        .add_component(
            "x",
            0,
            Script::new()
                .on_setup(|ctx| {
                    for (tag, priority) in [(1, 3), (2, 3), (3, 6)] {
                        let opts = SendOptions {
                            delay: SimTime(7),
                            priority,
                        };
                        ctx.send_with(PortId(0), opts, MSG, payload(tag))?;
                    }
                    Ok(())
                })
                .on_event(move |_, ev, ctx| {
                    let tag = tag_of(&ev);
                    push(&l, "x", ctx, tag);
                    if tag == 1 {
                        assert_eq!(ctx.priority(), 3);
                        let opts = SendOptions {
                            delay: SimTime::ZERO,
                            priority: 5,
                        };
                        ctx.send_with(PortId(0), opts, MSG, payload(4))?;
                    }
                    Ok(())
                })
                .boxed(),
        )
        .expect("add");
    b.connect(x, PortId(0), x, PortId(0), SimTime::ZERO)
        .expect("self link");

    let mut p = serial_partition(b);
    let outcome = p.run(SimTime(100)).expect("run");

    let got: Vec<(u64, i32, u64)> = entries(&log)
        .iter()
        .map(|e| (e.time, e.priority, e.tag))
        .collect();
    assert_eq!(got, vec![(7, 3, 1), (7, 3, 2), (7, 5, 4), (7, 6, 3)]);
    assert_eq!(outcome.reason, StopReason::Quiescent);
    assert_eq!(outcome.end_time, SimTime(7));
}

#[test]
fn unregister_before_first_firing_suppresses_handler() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| {
                ctx.register_clock(SimTime(10), 40, 1)?;
                assert!(ctx.unregister_clock(SimTime(10), 40, 1));
                // 第二次注销没有活着的时钟
                assert!(!ctx.unregister_clock(SimTime(10), 40, 1));
                Ok(())
            })
            .on_tick(move |_, _, ctx| {
                push(&l, "h", ctx, 0);
                Ok(ClockControl::Continue)
            })
            .boxed(),
    )
    .expect("add");

    let mut p = serial_partition(b);
    let outcome = p.run(SimTime(100)).expect("run");
    assert!(entries(&log).is_empty());
    assert_eq!(outcome.reason, StopReason::Quiescent);
    assert!(p.time_vortex().is_empty());
}

#[test]
fn reregister_is_idempotent() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| {
                ctx.register_clock(SimTime(10), 40, 0)?;
                for _ in 0..3 {
                    assert_eq!(ctx.reregister_clock(SimTime(10), 40, 0)?, SimTime(10));
                }
                Ok(())
            })
            .on_tick(move |_, _, ctx| {
                push(&l, "h", ctx, 0);
                Ok(ClockControl::Continue)
            })
            .boxed(),
    )
    .expect("add");

    let mut p = serial_partition(b);
    p.run(SimTime(35)).expect("run");
    let times: Vec<u64> = entries(&log).iter().map(|e| e.time).collect();
    assert_eq!(times, vec![10, 20, 30]);
}

#[test]
fn reregister_after_unregister_keeps_clock_alive() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| {
                ctx.register_clock(SimTime(10), 40, 0)?;
                ctx.unregister_clock(SimTime(10), 40, 0);
                ctx.reregister_clock(SimTime(10), 40, 0)?;
                Ok(())
            })
            .on_tick(move |_, _, ctx| {
                push(&l, "h", ctx, 0);
                Ok(ClockControl::Continue)
            })
            .boxed(),
    )
    .expect("add");

    let mut p = serial_partition(b);
    p.run(SimTime(25)).expect("run");
    assert_eq!(entries(&log).len(), 2);
}

#[test]
fn stopped_clock_is_not_reinserted() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| ctx.register_clock(SimTime(10), 40, 0).map(|_| ()))
            .on_tick(move |_, _, ctx| {
                push(&l, "h", ctx, 0);
                Ok(ClockControl::Stop)
            })
            .boxed(),
    )
    .expect("add");

    let mut p = serial_partition(b);
    let outcome = p.run(SimTime(1_000)).expect("run");
    assert_eq!(entries(&log).len(), 1);
    assert_eq!(outcome.reason, StopReason::Quiescent);
    assert_eq!(outcome.end_time, SimTime(10));
}

#[test]
fn unregister_inside_handler_takes_effect_on_next_firing() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| ctx.register_clock(SimTime(10), 40, 0).map(|_| ()))
            .on_tick(move |_, cycle, ctx| {
                push(&l, "h", ctx, 0);
                if cycle == SimTime(20) {
                    ctx.unregister_clock(SimTime(10), 40, 0);
                }
                Ok(ClockControl::Continue)
            })
            .boxed(),
    )
    .expect("add");

    let mut p = serial_partition(b);
    p.run(SimTime(100)).expect("run");
    let times: Vec<u64> = entries(&log).iter().map(|e| e.time).collect();
    assert_eq!(times, vec![10, 20]);
}

#[test]
fn clock_registered_mid_cycle_fires_one_period_later() {
    let log = new_log();
    let l = log.clone();
    let mut b = ModelBuilder::new();
    let x = b
        .add_component(
            "x",
            0,
            Script::new()
                .on_setup(|ctx| {
                    let opts = SendOptions {
                        delay: SimTime(15),
                        ..SendOptions::default()
                    };
                    ctx.send_with(PortId(0), opts, MSG, payload(0))
                })
                .on_event(|_, _, ctx| {
                    // next_cycle 只是取整查询；节拍从登记时刻起算
                    assert_eq!(ctx.next_cycle(SimTime(10), 40), SimTime(20));
                    assert_eq!(ctx.register_clock(SimTime(10), 40, 0)?, SimTime(25));
                    Ok(())
                })
                .on_tick(move |_, _, ctx| {
                    push(&l, "x", ctx, 0);
                    Ok(ClockControl::Continue)
                })
                .boxed(),
        )
        .expect("add");
    b.connect(x, PortId(0), x, PortId(0), SimTime::ZERO)
        .expect("self link");

    let mut p = serial_partition(b);
    p.run(SimTime(45)).expect("run");
    let times: Vec<u64> = entries(&log).iter().map(|e| e.time).collect();
    assert_eq!(times, vec![25, 35, 45]);
}

#[test]
fn next_cycle_reports_current_boundary_only_before_tick_runs() {
    // 当前优先级低于时钟优先级：本周期的节拍还没执行
    assert_eq!(
        ClockRegistry::next_cycle(SimTime(20), 30, SimTime(10), 40),
        SimTime(20)
    );
    assert_eq!(
        ClockRegistry::next_cycle(SimTime(20), 50, SimTime(10), 40),
        SimTime(30)
    );
    assert_eq!(
        ClockRegistry::next_cycle(SimTime(23), 0, SimTime(10), 40),
        SimTime(30)
    );
    assert_eq!(
        ClockRegistry::next_cycle(SimTime::ZERO, 0, SimTime(10), 40),
        SimTime(10)
    );
}

#[test]
fn zero_period_clock_is_config_error() {
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| ctx.register_clock(SimTime::ZERO, 40, 0).map(|_| ()))
            .boxed(),
    )
    .expect("add");

    let err = serial_partition(b).run(SimTime(10)).expect_err("must fail");
    assert!(matches!(
        err,
        SimError::Config(ConfigError::ZeroClockPeriod)
    ));
}

#[test]
fn reserved_priority_and_unwired_port_are_rejected() {
    let mut b = ModelBuilder::new();
    let x = b
        .add_component(
            "x",
            0,
            Script::new()
                .on_setup(|ctx| {
                    let opts = SendOptions {
                        delay: SimTime(1),
                        priority: -900,
                    };
                    let err = ctx
                        .send_with(PortId(0), opts, MSG, Vec::new())
                        .expect_err("reserved");
                    assert!(matches!(
                        err,
                        SimError::Config(ConfigError::ReservedPriority(-900))
                    ));
                    let err = ctx.send(PortId(9), MSG, Vec::new()).expect_err("unwired");
                    assert!(matches!(
                        err,
                        SimError::Config(ConfigError::UnwiredPort { .. })
                    ));
                    Ok(())
                })
                .boxed(),
        )
        .expect("add");
    b.connect(x, PortId(0), x, PortId(0), SimTime(1))
        .expect("self link");

    serial_partition(b).run(SimTime(10)).expect("run");
}

#[test]
fn release_without_keep_alive_underflows() {
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new().on_setup(|ctx| ctx.release()).boxed(),
    )
    .expect("add");

    let err = serial_partition(b).run(SimTime(10)).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::RefcountUnderflow);
}

#[test]
fn handler_error_stops_serial_run() {
    let mut b = ModelBuilder::new();
    b.add_component(
        "h",
        0,
        Script::new()
            .on_setup(|ctx| ctx.register_clock(SimTime(5), 40, 0).map(|_| ()))
            .on_tick(|_, cycle, _| {
                if cycle == SimTime(15) {
                    return Err(ConfigError::Model("boom".to_string()).into());
                }
                Ok(ClockControl::Continue)
            })
            .boxed(),
    )
    .expect("add");

    let mut p = serial_partition(b);
    let err = p.run(SimTime(100)).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(p.now(), SimTime(15));
}

#[test]
fn serial_ping_pong_stops_on_exit() {
    let mut b = ModelBuilder::new();
    let a = b
        .add_component("a", 0, Box::new(PingPong::new(4, true)))
        .expect("add");
    let c = b
        .add_component("b", 0, Box::new(PingPong::new(4, false)))
        .expect("add");
    b.connect(a, PortId(0), c, PortId(0), SimTime(5))
        .expect("link");
    b.connect(c, PortId(0), a, PortId(0), SimTime(5))
        .expect("link");

    let mut p = serial_partition(b);
    let outcome = p.run(SimTime::MAX).expect("run");
    assert_eq!(outcome.reason, StopReason::Exit);
    assert_eq!(outcome.end_time, SimTime(20));

    let report = p.finish(outcome);
    assert_eq!(report.stats.events, 4);
    for c in &report.components {
        assert_eq!(c.summary.get("sent"), Some(2));
        assert_eq!(c.summary.get("received"), Some(2));
    }
}
