use std::sync::Arc;
use std::time::Duration;

use checks4shell_core::CheckRunner;
use checks4shell_core::checks::CheckRunConclusion;
use checks4shell_core::signals::SignalSubscription;
use core_test_support::RecordingChecksService;
use core_test_support::gated;
use core_test_support::manual_clock;
use core_test_support::sample_context;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn final_report_waits_for_in_flight_periodic_update() {
    let tmp = TempDir::new().expect("tempdir");
    let gate = tmp.path().join("gate");
    let checks = Arc::new(RecordingChecksService::new(20).with_update_delay(Duration::from_millis(300)));
    let clock = manual_clock();
    let (_signals, subscription) = SignalSubscription::channel();

    let runner = CheckRunner::new(sample_context(gated(&gate, "echo done")), checks.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_signals(subscription);
    let run = tokio::spawn(runner.run());

    clock.wait_for_sleepers(1).await;
    clock.advance_next();
    // The periodic update has started and is still sleeping in the service
    // when the command exits.
    checks.wait_for_calls(2).await;
    std::fs::write(&gate, "").expect("open gate");

    run.await.expect("run task").expect("run");

    let calls = checks.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].conclusion(), None);
    assert!(calls[2].is_final());
    assert_eq!(calls[2].conclusion(), Some(CheckRunConclusion::Success));
    assert_eq!(checks.max_in_flight(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_periodic_update_follows_the_final_report() {
    let tmp = TempDir::new().expect("tempdir");
    let gate = tmp.path().join("gate");
    let checks = Arc::new(RecordingChecksService::new(21));
    let clock = manual_clock();
    let (_signals, subscription) = SignalSubscription::channel();

    let runner = CheckRunner::new(sample_context(gated(&gate, "echo done")), checks.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_signals(subscription);
    let run = tokio::spawn(runner.run());

    for ticks in 1..=3 {
        clock.wait_for_sleepers(1).await;
        clock.advance_next();
        checks.wait_for_calls(1 + ticks).await;
    }
    std::fs::write(&gate, "").expect("open gate");
    run.await.expect("run task").expect("run");

    // Time keeps moving after the run; the ticker is gone.
    clock.advance(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = checks.calls();
    assert_eq!(calls.len(), 5);
    let finals: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| call.is_final())
        .map(|(index, _)| index)
        .collect();
    assert_eq!(finals, vec![4]);
}
