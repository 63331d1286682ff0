mod support;

use ucsi_core::command::CommandKind;
use ucsi_core::host::MessageSeverity;
use ucsi_core::sim::{CompletionMode, ScriptedStack};
use ucsi_core::telemetry::{TelemetryEventKind, TelemetryPayload};
use ucsi_core::{Ucsi, UcsiOptions};

use support::{RecordingHost, context, drive};

#[test]
fn failed_init_is_retried_with_the_same_configuration() {
    let stack = ScriptedStack::new()
        .with_completion(CompletionMode::Immediate)
        .failing_inits(1);
    let mut ucsi = context(stack);

    assert!(ucsi.apply_new_config(3));
    ucsi.service().expect("first init attempt");
    assert!(!ucsi.is_initialized());
    assert_eq!(ucsi.queued(), 1, "init should be queued again");
    assert_eq!(ucsi.init_failures(), 1);
    assert!(
        ucsi.host()
            .has_message("init reported error (0x0B), restarting...")
    );

    ucsi.service().expect("second init attempt");
    assert!(ucsi.is_initialized());
    assert_eq!(ucsi.init_dispatches(), 2);
    assert_eq!(ucsi.stack().call_count(CommandKind::Init), 2);
    assert_eq!(ucsi.stack().active_config(), Some(&3));
    assert_eq!(ucsi.init_failures(), 0, "success resets the failure count");
}

#[test]
fn retries_stop_once_the_budget_is_spent() {
    let stack = ScriptedStack::new()
        .with_completion(CompletionMode::Immediate)
        .failing_inits(10);
    let options = UcsiOptions::default().with_init_retry_budget(Some(2));
    let mut ucsi: Ucsi<_, _> = Ucsi::new(stack, RecordingHost::default(), options);

    assert!(ucsi.apply_new_config(1));
    for _ in 0..5 {
        ucsi.service().expect("service");
    }

    assert_eq!(ucsi.init_dispatches(), 3);
    assert_eq!(ucsi.queued(), 0);
    assert!(!ucsi.is_initialized());
    assert!(ucsi.host().has_message("giving up after 3 attempts"));
    assert_eq!(ucsi.host().messages_at(MessageSeverity::Error), 3);

    let telemetry = ucsi.telemetry();
    assert_eq!(telemetry.count(TelemetryEventKind::InitRetry), 2);
    assert_eq!(telemetry.count(TelemetryEventKind::InitRetryExhausted), 1);
    match telemetry.latest().map(|record| record.details) {
        Some(TelemetryPayload::Retry(retry)) => {
            assert_eq!(retry.failures, 3);
            assert_eq!(retry.budget, Some(2));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn new_configuration_restores_the_budget() {
    let stack = ScriptedStack::new()
        .with_completion(CompletionMode::Immediate)
        .failing_inits(3);
    let options = UcsiOptions::default().with_init_retry_budget(Some(1));
    let mut ucsi: Ucsi<_, _> = Ucsi::new(stack, RecordingHost::default(), options);

    assert!(ucsi.apply_new_config(1));
    ucsi.service().expect("first attempt");
    ucsi.service().expect("retry");
    assert_eq!(ucsi.queued(), 0, "budget of one retry is spent");

    assert!(ucsi.apply_new_config(2));
    assert_eq!(ucsi.init_failures(), 0);
    ucsi.service().expect("third failure");
    ucsi.service().expect("success");
    assert!(ucsi.is_initialized());
    assert_eq!(ucsi.stack().active_config(), Some(&2));
}

#[test]
fn unbounded_budget_keeps_retrying() {
    let stack = ScriptedStack::new().failing_inits(6);
    let options = UcsiOptions::default().with_init_retry_budget(None);
    let mut ucsi: Ucsi<_, _> = Ucsi::new(stack, RecordingHost::default(), options);

    assert!(ucsi.apply_new_config(1));
    drive(&mut ucsi);

    assert!(ucsi.is_initialized());
    assert_eq!(ucsi.init_dispatches(), 7);
    assert_eq!(
        ucsi.telemetry()
            .count(TelemetryEventKind::InitRetryExhausted),
        0
    );
}
