use std::sync::Arc;
use std::time::Duration;

use checks4shell_core::CheckRunner;
use checks4shell_core::checks::CheckRunConclusion;
use checks4shell_core::checks::CheckRunId;
use checks4shell_core::checks::CheckRunOutput;
use checks4shell_core::checks::CheckRunReport;
use checks4shell_core::checks::CheckRunStatus;
use checks4shell_core::checks::CreateCheckRun;
use checks4shell_core::checks::UpdateCheckRun;
use checks4shell_core::clock::Clock;
use checks4shell_core::fence_output;
use checks4shell_core::signals::SignalSubscription;
use chrono::DateTime;
use chrono::Utc;
use core_test_support::HIGHLIGHT;
use core_test_support::RecordedCall;
use core_test_support::RecordingChecksService;
use core_test_support::SAMPLE_DETAILS_URL;
use core_test_support::SAMPLE_EXTERNAL_ID;
use core_test_support::SAMPLE_HEAD_SHA;
use core_test_support::SAMPLE_NAME;
use core_test_support::SAMPLE_OWNER;
use core_test_support::SAMPLE_REPO;
use core_test_support::SAMPLE_SUMMARY;
use core_test_support::SAMPLE_TITLE;
use core_test_support::SharedSink;
use core_test_support::gated;
use core_test_support::manual_clock;
use core_test_support::sample_context;
use core_test_support::sh;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn report(text: Option<&str>, completed: Option<(CheckRunConclusion, DateTime<Utc>)>) -> CheckRunReport {
    CheckRunReport {
        status: if completed.is_some() {
            CheckRunStatus::Completed
        } else {
            CheckRunStatus::InProgress
        },
        conclusion: completed.map(|(conclusion, _)| conclusion),
        completed_at: completed.map(|(_, at)| at),
        output: CheckRunOutput {
            title: Some(SAMPLE_TITLE.to_string()),
            summary: SAMPLE_SUMMARY.to_string(),
            text: text.map(|text| fence_output(text, HIGHLIGHT)),
            ..Default::default()
        },
    }
}

fn expected_create(report: CheckRunReport) -> RecordedCall {
    RecordedCall::Create {
        owner: SAMPLE_OWNER.to_string(),
        repo: SAMPLE_REPO.to_string(),
        request: CreateCheckRun {
            name: SAMPLE_NAME.to_string(),
            head_sha: SAMPLE_HEAD_SHA.to_string(),
            details_url: Some(SAMPLE_DETAILS_URL.to_string()),
            external_id: Some(SAMPLE_EXTERNAL_ID.to_string()),
            report,
        },
    }
}

fn expected_update(id: i64, report: CheckRunReport) -> RecordedCall {
    RecordedCall::Update {
        owner: SAMPLE_OWNER.to_string(),
        repo: SAMPLE_REPO.to_string(),
        id: CheckRunId(id),
        request: UpdateCheckRun {
            name: SAMPLE_NAME.to_string(),
            details_url: Some(SAMPLE_DETAILS_URL.to_string()),
            external_id: Some(SAMPLE_EXTERNAL_ID.to_string()),
            report,
        },
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn echo_reports_create_tick_and_final_update() {
    let tmp = TempDir::new().expect("tempdir");
    let gate = tmp.path().join("gate");
    let checks = Arc::new(RecordingChecksService::new(1));
    let clock = manual_clock();
    let (_signals, subscription) = SignalSubscription::channel();

    let runner = CheckRunner::new(
        sample_context(gated(&gate, "echo 'testing echo'")),
        checks.clone(),
    )
    .with_clock(Arc::new(clock.clone()))
    .with_signals(subscription);
    let run = tokio::spawn(runner.run());

    // One periodic update while the command is still blocked on the gate.
    clock.wait_for_sleepers(1).await;
    clock.advance_next();
    checks.wait_for_calls(2).await;
    std::fs::write(&gate, "").expect("open gate");

    let exit = run.await.expect("run task").expect("run");
    assert!(exit.success());

    let done_at = clock.now();
    assert_eq!(
        checks.calls(),
        vec![
            expected_create(report(None, None)),
            expected_update(1, report(None, None)),
            expected_update(
                1,
                report(
                    Some("testing echo"),
                    Some((CheckRunConclusion::Success, done_at))
                )
            ),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_update_shows_partial_output() {
    let tmp = TempDir::new().expect("tempdir");
    let gate = tmp.path().join("gate");
    let checks = Arc::new(RecordingChecksService::new(3));
    let clock = manual_clock();
    let (_signals, subscription) = SignalSubscription::channel();

    let runner = CheckRunner::new(
        sample_context(sh(&format!(
            "echo 'line 1'; while [ ! -e '{}' ]; do sleep 0.01; done; echo 'line 2'",
            gate.display()
        ))),
        checks.clone(),
    )
    .with_clock(Arc::new(clock.clone()))
    .with_signals(subscription);
    let terminal = runner.terminal();
    let run = tokio::spawn(runner.run());

    assert!(
        core_test_support::wait_for_text(&terminal, "line 1", Duration::from_secs(10)).await,
        "first line never arrived"
    );
    clock.wait_for_sleepers(1).await;
    clock.advance_next();
    checks.wait_for_calls(2).await;
    std::fs::write(&gate, "").expect("open gate");

    run.await.expect("run task").expect("run");

    let calls = checks.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1], expected_update(3, report(Some("line 1"), None)));
    assert_eq!(calls[2].text(), Some(fence_output("line 1\nline 2", HIGHLIGHT).as_str()));
    assert_eq!(calls[2].conclusion(), Some(CheckRunConclusion::Success));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn output_respects_terminal_control_sequences() {
    let checks = Arc::new(RecordingChecksService::new(2));
    let (_signals, subscription) = SignalSubscription::channel();

    let runner = CheckRunner::new(
        sample_context(sh(r"printf 'starting\n\033[1A\033[K\nstuff\bff\bs\n'")),
        checks.clone(),
    )
    .with_clock(Arc::new(manual_clock()))
    .with_signals(subscription);
    runner.run().await.expect("run");

    let calls = checks.calls();
    let last = calls.last().expect("final update");
    assert!(last.is_final());
    assert_eq!(last.text(), Some(fence_output("\nstuffs", HIGHLIGHT).as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_zero_exit_concludes_failure_with_captured_output() {
    let checks = Arc::new(RecordingChecksService::new(4));
    let clock = manual_clock();
    let (_signals, subscription) = SignalSubscription::channel();

    let runner = CheckRunner::new(
        sample_context(sh("echo 'error 1' 1>&2; echo details 1>&2; exit 126")),
        checks.clone(),
    )
    .with_clock(Arc::new(clock.clone()))
    .with_signals(subscription);
    let exit = runner.run().await.expect("reports were delivered");

    assert_eq!(exit.code, Some(126));
    assert_eq!(exit.exit_code(), 126);
    assert_eq!(
        checks.calls().last().cloned(),
        Some(expected_update(
            4,
            report(
                Some("error 1\ndetails"),
                Some((CheckRunConclusion::Failure, clock.now()))
            )
        ))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mirrors_receive_raw_output() {
    let checks = Arc::new(RecordingChecksService::new(5));
    let sink = SharedSink::default();
    let (_signals, subscription) = SignalSubscription::channel();

    let runner = CheckRunner::new(sample_context(sh(r"printf 'a\rb\n'")), checks.clone())
        .with_clock(Arc::new(manual_clock()))
        .with_signals(subscription)
        .with_mirror(Box::new(sink.clone()));
    runner.run().await.expect("run");

    assert_eq!(sink.contents(), b"a\rb\n");
    assert_eq!(
        checks.calls().last().and_then(RecordedCall::text),
        Some(fence_output("b", HIGHLIGHT).as_str())
    );
}
