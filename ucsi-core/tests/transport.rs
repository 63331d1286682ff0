mod support;

use core::time::Duration;

use ucsi_core::host::APP_TIMER_CANCEL;
use ucsi_core::integration::MAX_TX_FRAME;
use ucsi_core::sim::{INIT_FRAME_LEN, INIT_TIMER_MS, ScriptedStack, SimEvent};
use ucsi_core::telemetry::TelemetryEventKind;

use support::{context, drive};

#[test]
fn application_timer_is_armed_replaced_and_cancelled() {
    let mut ucsi = context(ScriptedStack::new());

    assert!(ucsi.apply_new_config(1));
    ucsi.service().expect("dispatch init");
    assert_eq!(
        ucsi.host().timer,
        Some(Duration::from_millis(u64::from(INIT_TIMER_MS)))
    );

    assert!(ucsi.stack_mut().schedule(SimEvent::AppTimer(0)));
    assert!(ucsi.stack_mut().schedule(SimEvent::AppTimer(APP_TIMER_CANCEL)));
    ucsi.service().expect("tick");

    assert_eq!(
        ucsi.host().timer_log,
        [
            Some(Duration::from_millis(u64::from(INIT_TIMER_MS))),
            Some(Duration::ZERO),
            None,
        ]
    );
    assert_eq!(ucsi.host().timer, None);

    let telemetry = ucsi.telemetry();
    assert_eq!(telemetry.count(TelemetryEventKind::TimerArmed), 2);
    assert_eq!(telemetry.count(TelemetryEventKind::TimerCancelled), 1);
}

#[test]
fn timer_expiry_is_reported_to_the_stack() {
    let mut ucsi = context(ScriptedStack::new());

    ucsi.on_timer_expired().expect("timer expiry");
    ucsi.on_timer_expired().expect("timer expiry");

    assert_eq!(ucsi.stack().timeouts(), 2);
    assert_eq!(
        ucsi.telemetry().count(TelemetryEventKind::TimerExpired),
        2
    );
}

#[test]
fn frames_are_gathered_and_oversized_ones_dropped() {
    let mut ucsi = context(ScriptedStack::new());

    assert!(ucsi.apply_new_config(1));
    ucsi.service().expect("dispatch init");
    assert!(ucsi.stack_mut().schedule(SimEvent::Transmit(MAX_TX_FRAME + 8)));
    assert!(ucsi.stack_mut().schedule(SimEvent::Transmit(MAX_TX_FRAME)));
    ucsi.service().expect("tick");

    let lengths: Vec<usize> = ucsi.host().frames.iter().map(Vec::len).collect();
    assert_eq!(lengths, [INIT_FRAME_LEN, MAX_TX_FRAME]);
    assert!(
        ucsi.host()
            .has_message("transmit frame of 80 bytes exceeds the 72 byte limit, dropped")
    );
    assert_eq!(
        ucsi.telemetry()
            .count(TelemetryEventKind::TransmitDropped),
        1
    );
}

#[test]
fn received_bytes_need_a_started_transport() {
    let mut ucsi = context(ScriptedStack::new());

    assert!(!ucsi.submit_received_bytes(&[0x01, 0x02]));
    assert_eq!(ucsi.stack().rx_bytes(), 0);

    assert!(ucsi.apply_new_config(1));
    drive(&mut ucsi);
    assert!(ucsi.transport_attached());
    assert!(ucsi.submit_received_bytes(&[0x01, 0x02]));
    assert_eq!(ucsi.stack().rx_bytes(), 2);
}

#[test]
fn refused_bytes_can_be_offered_again_after_release() {
    let mut ucsi = context(ScriptedStack::new().with_rx_buffers(1));
    assert!(ucsi.apply_new_config(1));
    drive(&mut ucsi);

    assert!(ucsi.submit_received_bytes(&[0xAA; 8]));
    assert!(!ucsi.submit_received_bytes(&[0xBB; 4]));

    let requests = ucsi.host().service_requests;
    ucsi.service().expect("tick releases the buffer");
    assert!(
        ucsi.host().service_requests > requests,
        "buffer release should ask for another service call"
    );
    assert!(ucsi.submit_received_bytes(&[0xBB; 4]));
    assert_eq!(ucsi.stack().rx_bytes(), 12);
}
