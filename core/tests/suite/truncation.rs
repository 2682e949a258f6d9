use std::sync::Arc;

use checks4shell_core::CheckRunner;
use checks4shell_core::RunContext;
use checks4shell_core::SUMMARY_LIMIT;
use checks4shell_core::TEXT_LIMIT;
use checks4shell_core::signals::SignalSubscription;
use checks4shell_utils_string::TRUNCATION_MARKER;
use core_test_support::RecordingChecksService;
use core_test_support::gated;
use core_test_support::manual_clock;
use core_test_support::sample_context;
use core_test_support::sh;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wide_output_is_truncated_on_character_boundaries() {
    let tmp = TempDir::new().expect("tempdir");
    let input = tmp.path().join("wide.txt");
    std::fs::write(&input, format!("{} 129024\n", "你好".repeat(21 * 1024)))
        .expect("write input");

    let checks = Arc::new(RecordingChecksService::new(9));
    let (_signals, subscription) = SignalSubscription::channel();
    let runner = CheckRunner::new(
        sample_context(sh(&format!("cat '{}'", input.display()))),
        checks.clone(),
    )
    .with_clock(Arc::new(manual_clock()))
    .with_signals(subscription);
    runner.run().await.expect("run");

    let calls = checks.calls();
    let text = calls.last().and_then(|call| call.text()).expect("final text");
    assert!(text.len() <= TEXT_LIMIT);
    let body = text
        .strip_prefix("```bash\n")
        .and_then(|rest| rest.strip_suffix("\n```"))
        .expect("fenced output");
    let tail = body
        .strip_prefix(TRUNCATION_MARKER)
        .expect("truncation marker");
    assert_eq!(tail.len(), 65506);
    assert!(tail.starts_with('你') || tail.starts_with('好'));
    assert!(tail.ends_with("你好 129024"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn long_summary_file_is_truncated() {
    let tmp = TempDir::new().expect("tempdir");
    let summary = tmp.path().join("summary.md");
    std::fs::write(&summary, format!("{}\nlast line", "a".repeat(SUMMARY_LIMIT))).expect("write");

    let checks = Arc::new(RecordingChecksService::new(10));
    let (_signals, subscription) = SignalSubscription::channel();
    let context = RunContext {
        summary: summary.to_string_lossy().into_owned(),
        ..sample_context(sh("true"))
    };
    CheckRunner::new(context, checks.clone())
        .with_clock(Arc::new(manual_clock()))
        .with_signals(subscription)
        .run()
        .await
        .expect("run");

    for call in checks.calls() {
        let summary = &call.report().output.summary;
        assert_eq!(summary.len(), SUMMARY_LIMIT);
        assert!(summary.starts_with(TRUNCATION_MARKER));
        assert!(summary.ends_with("\nlast line"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn summary_file_written_by_the_command_is_picked_up() {
    let tmp = TempDir::new().expect("tempdir");
    let summary = tmp.path().join("summary.md");
    std::fs::write(&summary, "").expect("create empty summary");

    let gate = tmp.path().join("gate");
    let checks = Arc::new(RecordingChecksService::new(6));
    let (_signals, subscription) = SignalSubscription::channel();
    let context = RunContext {
        summary: summary.to_string_lossy().into_owned(),
        ..sample_context(gated(
            &gate,
            &format!("printf 'summary content' > '{}'; echo stdout", summary.display()),
        ))
    };
    let run = tokio::spawn(
        CheckRunner::new(context, checks.clone())
            .with_clock(Arc::new(manual_clock()))
            .with_signals(subscription)
            .run(),
    );

    // The summary is still empty when the check run is created.
    checks.wait_for_calls(1).await;
    std::fs::write(&gate, "").expect("open gate");
    run.await.expect("run task").expect("run");

    let summaries: Vec<_> = checks
        .calls()
        .iter()
        .map(|call| call.report().output.summary.clone())
        .collect();
    assert_eq!(summaries, vec![String::new(), "summary content".to_string()]);
}
