use super::common::Script;
use crate::config::{
    ComponentKind, ENV_CHECKPOINT_PERIOD, ENV_STOP_AT, ModelSpec, RuntimeConfig,
};
use crate::model::ModelBuilder;
use crate::sim::{ComponentId, ConfigError, PortId, SimTime};
use std::collections::HashMap;

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k: &str| map.get(k).cloned()
}

#[test]
fn env_overrides_defaults() {
    let cfg = RuntimeConfig::from_env_with(env(&[])).expect("defaults");
    assert_eq!(cfg, RuntimeConfig::default());
    assert_eq!(cfg.end_time(), SimTime::MAX);

    let cfg = RuntimeConfig::from_env_with(env(&[
        (ENV_STOP_AT, " 500 "),
        (ENV_CHECKPOINT_PERIOD, "100"),
    ]))
    .expect("parse");
    assert_eq!(cfg.stop_at, Some(SimTime(500)));
    assert_eq!(cfg.end_time(), SimTime(500));
    assert_eq!(cfg.checkpoint_period, Some(SimTime(100)));
}

#[test]
fn bad_env_values_are_rejected() {
    let err = RuntimeConfig::from_env_with(env(&[(ENV_STOP_AT, "soon")])).expect_err("must fail");
    assert_eq!(
        err,
        ConfigError::InvalidEnv {
            var: ENV_STOP_AT,
            value: "soon".to_string()
        }
    );

    let err = RuntimeConfig::from_env_with(env(&[(ENV_CHECKPOINT_PERIOD, "0")]))
        .expect_err("zero period");
    assert!(matches!(
        err,
        ConfigError::InvalidEnv {
            var: ENV_CHECKPOINT_PERIOD,
            ..
        }
    ));

    assert!(RuntimeConfig::from_env_with(env(&[(ENV_STOP_AT, "-3")])).is_err());
}

#[test]
fn validate_rejects_empty_partitioning() {
    let cfg = RuntimeConfig {
        threads: 0,
        ..RuntimeConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::Partitioning(_))));

    let cfg = RuntimeConfig {
        ranks: 2,
        threads: 3,
        ..RuntimeConfig::default()
    };
    assert_eq!(cfg.partitions(), 6);
    assert!(cfg.validate().is_ok());
}

#[test]
fn model_json_parses_with_defaults() {
    let spec = ModelSpec::from_json(
        r#"{
            "components": [
                { "name": "a", "kind": "ping_pong", "serve": true },
                { "name": "b", "partition": 1, "kind": "ping_pong" },
                { "name": "t", "kind": "ticker", "period": 5 }
            ],
            "links": [
                { "from": "a", "to": "b", "latency": 2 },
                { "from": "b", "to": "a", "latency": 2 }
            ]
        }"#,
    )
    .expect("parse");
    assert_eq!(spec.components.len(), 3);
    assert_eq!(spec.components[0].partition, 0);
    assert!(matches!(
        spec.components[1].kind,
        ComponentKind::PingPong {
            volleys: 10,
            serve: false
        }
    ));
    assert!(matches!(
        spec.components[2].kind,
        ComponentKind::Ticker {
            period: 5,
            ticks: 0,
            priority: None
        }
    ));
    assert_eq!(spec.links[0].from_port, 0);

    let model = spec.build(1, 2).expect("build");
    assert_eq!(model.partition_count(), 2);
    assert_eq!(model.partitions()[0].components.len(), 2);
    assert_eq!(model.partitions()[1].components.len(), 1);
}

#[test]
fn malformed_models_are_rejected() {
    assert!(matches!(
        ModelSpec::from_json("{ \"components\": 3 }"),
        Err(ConfigError::Model(_))
    ));
    assert!(matches!(
        ModelSpec::from_json(r#"{ "components": [ { "name": "x", "kind": "teapot" } ] }"#),
        Err(ConfigError::Model(_))
    ));

    let negative = ModelSpec::from_json(
        r#"{
            "components": [ { "name": "a", "kind": "ping_pong" }, { "name": "b", "kind": "ping_pong" } ],
            "links": [ { "from": "a", "to": "b", "latency": -1 } ]
        }"#,
    )
    .expect("parse");
    assert!(matches!(
        negative.build(1, 1),
        Err(ConfigError::NegativeLatency { latency: -1, .. })
    ));

    let unknown = ModelSpec::from_json(
        r#"{
            "components": [ { "name": "a", "kind": "ping_pong" } ],
            "links": [ { "from": "a", "to": "ghost", "latency": 1 } ]
        }"#,
    )
    .expect("parse");
    assert!(matches!(
        unknown.build(1, 1),
        Err(ConfigError::UnknownComponent(name)) if name == "ghost"
    ));

    let zero_clock = ModelSpec::from_json(
        r#"{ "components": [ { "name": "t", "kind": "ticker", "period": 0 } ] }"#,
    )
    .expect("parse");
    assert!(matches!(zero_clock.build(1, 1), Err(ConfigError::ZeroClockPeriod)));

    let reserved = ModelSpec::from_json(
        r#"{ "components": [ { "name": "t", "kind": "ticker", "period": 3, "priority": -900 } ] }"#,
    )
    .expect("parse");
    assert!(matches!(
        reserved.build(1, 1),
        Err(ConfigError::ReservedPriority(-900))
    ));
}

#[test]
fn builder_rejects_duplicates_and_double_wiring() {
    let mut b = ModelBuilder::new();
    let a = b.add_component("a", 0, Script::new().boxed()).expect("a");
    let c = b.add_component("c", 0, Script::new().boxed()).expect("c");
    assert!(matches!(
        b.add_component("a", 1, Script::new().boxed()),
        Err(ConfigError::DuplicateComponent(name)) if name == "a"
    ));
    assert_eq!(b.component_id("c"), Some(c));

    b.connect(a, PortId(0), c, PortId(0), SimTime(1)).expect("first link");
    assert!(matches!(
        b.connect(a, PortId(0), c, PortId(1), SimTime(1)),
        Err(ConfigError::PortAlreadyWired { .. })
    ));
    assert!(matches!(
        b.connect(a, PortId(1), ComponentId(7), PortId(0), SimTime(1)),
        Err(ConfigError::UnknownComponent(_))
    ));
    assert!(matches!(b.build(0, 1), Err(ConfigError::Partitioning(_))));
}
