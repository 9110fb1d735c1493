use std::time::Duration;

use stampede_core::{
    DEFAULT_GRACEFUL_STOP, Error, RunConfig, ScenarioExecutor, ScenarioOptions, Stage,
    TestOptions, scenarios_from_options,
};

fn scenario(name: &str, executor: &str) -> ScenarioOptions {
    ScenarioOptions {
        name: name.to_string(),
        executor: Some(executor.to_string()),
        ..ScenarioOptions::default()
    }
}

#[test]
fn cli_overrides_convert_ramping_vus_to_constant_vus() {
    let opts = TestOptions {
        // Missing ramping fields are ignored once CLI overrides are present.
        scenarios: vec![scenario("HighLoad", "ramping-vus")],
        ..TestOptions::default()
    };

    let cfg = RunConfig {
        iterations: Some(1),
        vus: Some(1),
        duration: None,
    };

    let scenarios = scenarios_from_options(opts, cfg)
        .unwrap_or_else(|e| panic!("expected scenarios to be valid: {e}"));
    assert_eq!(scenarios.len(), 1);

    let s = &scenarios[0];
    assert_eq!(s.name, "HighLoad");
    assert_eq!(s.iterations, Some(1));
    assert_eq!(s.duration, None);
    assert_eq!(s.executor, ScenarioExecutor::ConstantVus { vus: 1 });
}

#[test]
fn ramping_vus_still_validates_when_no_cli_overrides() {
    let opts = TestOptions {
        scenarios: vec![ScenarioOptions {
            start_vus: Some(1),
            stages: vec![Stage {
                duration: Duration::from_secs(1),
                target: 2,
            }],
            ..scenario("HighLoad", "ramping-vus")
        }],
        ..TestOptions::default()
    };

    let scenarios = scenarios_from_options(opts, RunConfig::default())
        .unwrap_or_else(|e| panic!("expected scenarios to be valid: {e}"));
    assert_eq!(scenarios.len(), 1);

    match &scenarios[0].executor {
        ScenarioExecutor::RampingVus { start_vus, stages } => {
            assert_eq!(*start_vus, 1);
            assert_eq!(stages.len(), 1);
        }
        other => panic!("expected ramping-vus executor, got {other:?}"),
    }
    assert_eq!(scenarios[0].duration, Some(Duration::from_secs(1)));

    let opts = TestOptions {
        scenarios: vec![scenario("HighLoad", "ramping-vus")],
        ..TestOptions::default()
    };
    assert!(matches!(
        scenarios_from_options(opts, RunConfig::default()),
        Err(Error::InvalidStages)
    ));
}

#[test]
fn cli_overrides_convert_arrival_rate_to_constant_vus() {
    let opts = TestOptions {
        scenarios: vec![
            scenario("HighRps", "ramping-arrival-rate"),
            scenario("FlatRps", "constant-arrival-rate"),
        ],
        ..TestOptions::default()
    };

    let cfg = RunConfig {
        iterations: None,
        vus: Some(3),
        duration: Some(Duration::from_secs(10)),
    };

    let scenarios = scenarios_from_options(opts, cfg)
        .unwrap_or_else(|e| panic!("expected scenarios to be valid: {e}"));
    for s in &scenarios {
        assert_eq!(s.executor, ScenarioExecutor::ConstantVus { vus: 3 });
        assert_eq!(s.duration, Some(Duration::from_secs(10)));
    }
}

#[test]
fn scenario_fields_beat_top_level_options() {
    let opts = TestOptions {
        vus: Some(10),
        duration: Some(Duration::from_secs(60)),
        scenarios: vec![
            ScenarioOptions {
                vus: Some(2),
                ..scenario("a", "constant-vus")
            },
            ScenarioOptions {
                duration: Some(Duration::from_secs(5)),
                graceful_stop: Some(Duration::from_secs(1)),
                start_time: Some(Duration::from_secs(60)),
                ..scenario("b", "constant")
            },
        ],
        ..TestOptions::default()
    };

    let scenarios = scenarios_from_options(opts, RunConfig::default())
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(scenarios[0].executor, ScenarioExecutor::ConstantVus { vus: 2 });
    assert_eq!(scenarios[0].duration, Some(Duration::from_secs(60)));
    assert_eq!(scenarios[0].graceful_stop, DEFAULT_GRACEFUL_STOP);

    assert_eq!(scenarios[1].executor, ScenarioExecutor::ConstantVus { vus: 10 });
    assert_eq!(scenarios[1].duration, Some(Duration::from_secs(5)));
    assert_eq!(scenarios[1].graceful_stop, Duration::from_secs(1));
    assert_eq!(scenarios[1].start_time, Duration::from_secs(60));
}

#[test]
fn top_level_options_build_a_single_default_scenario() {
    let scenarios = scenarios_from_options(TestOptions::default(), RunConfig::default())
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(scenarios.len(), 1);
    assert_eq!(scenarios[0].name, "default");
    assert_eq!(scenarios[0].iterations, Some(1));

    let cfg = RunConfig {
        duration: Some(Duration::from_secs(3)),
        ..RunConfig::default()
    };
    let scenarios =
        scenarios_from_options(TestOptions::default(), cfg).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(scenarios[0].iterations, None);
}

#[test]
fn invalid_plans_are_rejected() {
    let cases: Vec<(TestOptions, fn(&Error) -> bool)> = vec![
        (
            TestOptions {
                scenarios: vec![scenario("a", "per-vu-iterations")],
                ..TestOptions::default()
            },
            |e| matches!(e, Error::InvalidExecutor(name) if name == "per-vu-iterations"),
        ),
        (
            TestOptions {
                scenarios: vec![scenario("a", "constant-vus"), scenario("a", "constant-vus")],
                ..TestOptions::default()
            },
            |e| matches!(e, Error::DuplicateScenario(name) if name == "a"),
        ),
        (
            TestOptions {
                scenarios: vec![ScenarioOptions {
                    rate: Some(10),
                    ..scenario("rps", "constant-arrival-rate")
                }],
                ..TestOptions::default()
            },
            |e| matches!(e, Error::InvalidDuration(name) if name == "rps"),
        ),
        (
            TestOptions {
                scenarios: vec![ScenarioOptions {
                    rate: Some(10),
                    duration: Some(Duration::from_secs(1)),
                    pre_allocated_vus: Some(4),
                    max_vus: Some(2),
                    ..scenario("rps", "constant-arrival-rate")
                }],
                ..TestOptions::default()
            },
            |e| matches!(e, Error::InvalidMaxVus),
        ),
        (
            TestOptions {
                scenarios: vec![ScenarioOptions {
                    rate: Some(10),
                    duration: Some(Duration::from_secs(1)),
                    pacing: Some(Duration::from_millis(100)),
                    ..scenario("rps", "constant-arrival-rate")
                }],
                ..TestOptions::default()
            },
            |e| matches!(e, Error::InvalidPacing(_)),
        ),
        (
            TestOptions {
                scenarios: vec![ScenarioOptions {
                    vus: Some(0),
                    ..scenario("a", "constant-vus")
                }],
                ..TestOptions::default()
            },
            |e| matches!(e, Error::InvalidVus),
        ),
    ];

    for (opts, check) in cases {
        match scenarios_from_options(opts, RunConfig::default()) {
            Ok(s) => panic!("expected an error, got {s:?}"),
            Err(err) => assert!(check(&err), "unexpected error: {err}"),
        }
    }
}
