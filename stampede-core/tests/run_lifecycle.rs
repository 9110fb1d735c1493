mod common;

use std::time::Duration;

use common::{Calls, Sim};
use stampede_core::builtin::{INTERRUPTED_ITERATIONS, ITERATIONS, ITERATIONS_FAILED};
use stampede_core::{
    AbortCause, Credential, Error, HarnessConfig, RunController, RunPhase, ScenarioConfig,
    ScenarioPhase, StopReason, ThresholdSet, ThresholdSpec,
};

fn harness(scenarios: Vec<ScenarioConfig>) -> HarnessConfig {
    let mut config = HarnessConfig::new("http://127.0.0.1:9");
    config.scenarios = scenarios;
    config
}

#[tokio::test(start_paused = true)]
async fn constant_vus_end_to_end() {
    let sim = Sim::new(Duration::from_millis(50), Duration::from_secs(1));
    let calls = sim.calls.clone();

    let mut config = harness(vec![ScenarioConfig::constant_vus(
        "Minimal_Load",
        1,
        Duration::from_secs(5),
    )]);
    config.thresholds = vec![
        ThresholdSet::new("Errors", ["count<100"]),
        ThresholdSet::new("Success", ["count>100"]),
    ];

    let report = RunController::new(config, sim)
        .run()
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let rtt = report
        .metrics
        .trend("RTT")
        .unwrap_or_else(|| panic!("RTT missing"));
    assert_eq!(rtt.count(), 5);
    let avg = rtt.avg().unwrap_or_default();
    assert!((avg - 50.0).abs() < 2.0, "avg {avg}");

    assert_eq!(report.metrics.counter("Errors").map(|c| c.total), Some(0.0));
    assert_eq!(report.metrics.counter("Success").map(|c| c.total), Some(5.0));
    assert_eq!(report.metrics.counter(ITERATIONS).map(|c| c.total), Some(5.0));

    assert!(report.thresholds[0].passed);
    assert!(!report.thresholds[1].passed);
    assert_eq!(report.thresholds[1].margin(), Some(-95.0));
    assert!(!report.overall_pass());
    assert_eq!(report.failure_phase(), None);

    let scenario = report
        .scenario("Minimal_Load")
        .unwrap_or_else(|| panic!("scenario summary missing"));
    assert_eq!(scenario.stop_reason, StopReason::DurationElapsed);
    assert_eq!(scenario.iterations, 5);
    assert_eq!(scenario.peak_concurrency, 1);
    assert!(!scenario.graceful_overrun);
    assert_eq!(
        scenario.phase_sequence(),
        vec![
            ScenarioPhase::Idle,
            ScenarioPhase::RampUp,
            ScenarioPhase::Steady,
            ScenarioPhase::RampDown,
            ScenarioPhase::GracefulStop,
            ScenarioPhase::Done,
        ]
    );

    assert_eq!(Calls::get(&calls.setup), 1);
    assert_eq!(Calls::get(&calls.teardown), 1);
}

#[tokio::test(start_paused = true)]
async fn graceful_stop_lets_the_last_iteration_finish() {
    let graceful = Duration::from_millis(100);
    let mut sim = Sim::new(Duration::ZERO, Duration::ZERO);
    // Second iteration starts 1ms before the deadline and runs for twice the window.
    sim.request = vec![Duration::from_millis(999), graceful * 2];

    let config = harness(vec![
        ScenarioConfig::constant_vus("s", 1, Duration::from_secs(1)).with_graceful_stop(graceful),
    ]);

    let report = RunController::new(config, sim)
        .run()
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let rtt = report
        .metrics
        .trend("RTT")
        .unwrap_or_else(|| panic!("RTT missing"));
    assert_eq!(rtt.count(), 2);
    let max = rtt.max().unwrap_or_default();
    assert!((max - 200.0).abs() < 2.0, "max {max}");

    let scenario = &report.scenarios[0];
    assert!(scenario.graceful_overrun);
    assert_eq!(scenario.interrupted_iterations, 0);
    assert!(scenario.elapsed >= Duration::from_millis(1199));
}

#[tokio::test(start_paused = true)]
async fn hard_stop_interrupts_stragglers_and_keeps_samples() {
    let mut sim = Sim::new(Duration::ZERO, Duration::ZERO);
    sim.request = vec![Duration::from_millis(500), Duration::from_secs(3600)];

    let mut config = harness(vec![
        ScenarioConfig::constant_vus("s", 2, Duration::from_secs(1))
            .with_graceful_stop(Duration::from_millis(100)),
    ]);
    config.hard_stop = Some(Duration::from_millis(400));

    let report = RunController::new(config, sim)
        .run()
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let scenario = &report.scenarios[0];
    assert!(scenario.graceful_overrun);
    assert_eq!(scenario.interrupted_iterations, 2);
    assert!(scenario.elapsed < Duration::from_secs(2));

    assert_eq!(
        report.metrics.counter(INTERRUPTED_ITERATIONS).map(|c| c.total),
        Some(2.0)
    );
    // Both first iterations completed before the stop and stay recorded.
    assert_eq!(report.metrics.trend("RTT").map(|t| t.count()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn setup_failure_aborts_before_any_vu() {
    let mut sim = Sim::new(Duration::from_millis(10), Duration::ZERO);
    sim.setup_error = Some("missing fixture");
    let calls = sim.calls.clone();

    let config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        4,
        Duration::from_secs(1),
    )]);

    let err = match RunController::new(config, sim).run().await {
        Ok(report) => panic!("expected setup failure, got {report:?}"),
        Err(err) => err,
    };
    assert!(matches!(err, Error::Setup(_)));
    assert_eq!(err.phase(), RunPhase::Setup);
    assert_eq!(Calls::get(&calls.iterations), 0);
    assert_eq!(Calls::get(&calls.teardown), 0);
}

#[tokio::test]
async fn auth_failure_aborts_before_setup() {
    let server = stampede_testserver::TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let sim = Sim::new(Duration::from_millis(10), Duration::ZERO);
    let calls = sim.calls.clone();

    let mut config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        2,
        Duration::from_secs(1),
    )]);
    config.target = server.base_url().to_string();
    config.credentials = vec![
        Credential::new(
            stampede_testserver::DEFAULT_CLIENT_ID,
            stampede_testserver::DEFAULT_CLIENT_SECRET,
        ),
        Credential::new("intruder", "wrong"),
    ];

    let err = match RunController::new(config, sim).run().await {
        Ok(report) => panic!("expected auth failure, got {report:?}"),
        Err(err) => err,
    };
    match &err {
        Error::AuthSetup(auth) => {
            assert_eq!(auth.index, 1);
            assert_eq!(auth.credential_id, "intruder");
            assert_eq!(auth.status, Some(401));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(err.phase(), RunPhase::Setup);
    assert_eq!(Calls::get(&calls.setup), 0);
    assert_eq!(Calls::get(&calls.iterations), 0);
    assert_eq!(server.stats().tokens_issued(), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_failure_fails_the_verdict() {
    let mut sim = Sim::new(Duration::from_millis(10), Duration::ZERO);
    sim.teardown_error = Some("could not delete fixture");

    let mut config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        1,
        Duration::from_millis(100),
    )]);
    config.thresholds = vec![ThresholdSet::new("Errors", ["count<1"])];

    let report = RunController::new(config, sim)
        .run()
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert!(report.thresholds_passed());
    assert_eq!(report.failure_phase(), Some(RunPhase::Teardown));
    assert!(!report.overall_pass());
}

#[tokio::test(start_paused = true)]
async fn fatal_vu_error_retires_only_that_vu() {
    let mut sim = Sim::new(Duration::from_millis(100), Duration::ZERO);
    sim.fatal_vus = vec![2];

    let config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        3,
        Duration::from_secs(1),
    )]);

    let report = RunController::new(config, sim)
        .run()
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let scenario = &report.scenarios[0];
    assert_eq!(scenario.vu_failures.len(), 1);
    assert_eq!(scenario.vu_failures[0].vu_id, 2);
    assert_eq!(scenario.stop_reason, StopReason::DurationElapsed);

    // VUs 1 and 3 keep going for the whole second.
    assert_eq!(report.metrics.trend("RTT").map(|t| t.count()), Some(20));
    assert_eq!(
        report.metrics.counter(ITERATIONS_FAILED).map(|c| c.total),
        Some(1.0)
    );
    assert!(report.overall_pass());
}

#[tokio::test(start_paused = true)]
async fn request_failures_become_metrics() {
    let mut sim = Sim::new(Duration::from_millis(100), Duration::ZERO);
    sim.status = 503;

    let mut config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        1,
        Duration::from_millis(500),
    )]);
    config.thresholds = vec![ThresholdSet::new("Errors", ["count<100"])];

    let report = RunController::new(config, sim)
        .run()
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.scenarios[0].iterations, 5);
    assert_eq!(report.scenarios[0].failed_iterations, 5);
    assert_eq!(
        report.metrics.counter("Errors").map(|c| c.total),
        Some(5.0 * 503.0)
    );
    assert!(!report.thresholds_passed());
    assert_eq!(report.failure_phase(), None);
}

#[tokio::test(start_paused = true)]
async fn abort_handle_stops_the_run_and_teardown_still_runs() {
    let sim = Sim::new(Duration::from_millis(100), Duration::ZERO);
    let calls = sim.calls.clone();

    let config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        1,
        Duration::from_secs(3600),
    )]);

    let controller = RunController::new(config, sim);
    let abort = controller.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1050)).await;
        abort.abort();
    });

    let report = controller.run().await.unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(report.aborted, Some(AbortCause::User));
    assert_eq!(report.scenarios[0].stop_reason, StopReason::Aborted);
    assert!(report.elapsed < Duration::from_secs(2));
    assert_eq!(Calls::get(&calls.teardown), 1);
}

#[tokio::test(start_paused = true)]
async fn abort_on_fail_threshold_stops_the_run() {
    let mut sim = Sim::new(Duration::from_millis(100), Duration::ZERO);
    sim.status = 500;

    let mut config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        1,
        Duration::from_secs(3600),
    )]);
    let mut set = ThresholdSet::new("Errors", Vec::<String>::new());
    set.thresholds
        .push(ThresholdSpec::new("count<1").abort_on_fail(Some(Duration::from_secs(5))));
    config.thresholds = vec![set];
    config.threshold_interval = Some(Duration::from_secs(1));

    let report = RunController::new(config, sim)
        .run()
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    match &report.aborted {
        Some(AbortCause::Threshold(outcome)) => assert_eq!(outcome.expression, "count<1"),
        other => panic!("expected threshold abort, got {other:?}"),
    }
    // Failing from the first second, but the abort waits for the 5s delay.
    assert!(report.elapsed >= Duration::from_secs(5));
    assert!(report.elapsed < Duration::from_secs(6));
    assert!(!report.thresholds_passed());
}

#[tokio::test(start_paused = true)]
async fn threshold_on_unknown_metric_is_a_config_error() {
    let sim = Sim::new(Duration::from_millis(10), Duration::ZERO);
    let calls = sim.calls.clone();

    let mut config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        1,
        Duration::from_secs(1),
    )]);
    config.thresholds = vec![ThresholdSet::new("Latency", ["p(95)<350"])];

    let err = match RunController::new(config, sim).run().await {
        Ok(report) => panic!("expected config error, got {report:?}"),
        Err(err) => err,
    };
    assert_eq!(err.phase(), RunPhase::Config);
    assert_eq!(Calls::get(&calls.setup), 0);
}

#[tokio::test(start_paused = true)]
async fn zero_threshold_interval_is_a_config_error() {
    let sim = Sim::new(Duration::from_millis(10), Duration::ZERO);
    let calls = sim.calls.clone();

    let mut config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        1,
        Duration::from_secs(1),
    )]);
    config.thresholds = vec![ThresholdSet::new("Errors", ["count<1"])];
    config.threshold_interval = Some(Duration::ZERO);

    let err = match RunController::new(config, sim).run().await {
        Ok(report) => panic!("expected config error, got {report:?}"),
        Err(err) => err,
    };
    assert!(matches!(err, Error::InvalidThresholdInterval));
    assert_eq!(err.phase(), RunPhase::Config);
    assert_eq!(Calls::get(&calls.setup), 0);
}

#[tokio::test(start_paused = true)]
async fn zero_request_timeout_is_a_config_error() {
    let sim = Sim::new(Duration::from_millis(10), Duration::ZERO);

    let mut config = harness(vec![ScenarioConfig::constant_vus(
        "s",
        1,
        Duration::from_secs(1),
    )]);
    config.request_timeout = Some(Duration::ZERO);

    let err = match RunController::new(config, sim).run().await {
        Ok(report) => panic!("expected config error, got {report:?}"),
        Err(err) => err,
    };
    assert!(matches!(err, Error::InvalidRequestTimeout));
    assert_eq!(err.phase(), RunPhase::Config);
}
