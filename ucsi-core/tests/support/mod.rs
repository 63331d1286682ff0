#![allow(dead_code)]

use core::fmt;
use core::time::Duration;

use ucsi_core::command::CommandKind;
use ucsi_core::host::{IntegrationHost, MessageSeverity};
use ucsi_core::sim::ScriptedStack;
use ucsi_core::stack::{ManagementReport, MostErrorMessage, NodeInfo};
use ucsi_core::telemetry::TelemetryInstant;
use ucsi_core::{Ucsi, UcsiOptions};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestInstant(pub u64);

impl TelemetryInstant for TestInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Host that records everything the integration asks of it.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub now_ms: u64,
    pub service_requests: usize,
    pub timer: Option<Duration>,
    pub timer_log: Vec<Option<Duration>>,
    pub messages: Vec<(MessageSeverity, String)>,
    pub frames: Vec<Vec<u8>>,
    pub stopped: usize,
    pub reports: Vec<(ManagementReport, u16, Option<NodeInfo>)>,
    pub most_errors: Vec<ForwardedError>,
}

/// Owned copy of a forwarded node error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardedError {
    pub source_address: u16,
    pub fblock: u8,
    pub instance: u8,
    pub function: u16,
    pub op_type: u8,
    pub payload: Vec<u8>,
}

impl RecordingHost {
    pub fn has_message(&self, needle: &str) -> bool {
        self.messages.iter().any(|(_, text)| text.contains(needle))
    }

    pub fn messages_at(&self, severity: MessageSeverity) -> usize {
        self.messages
            .iter()
            .filter(|(level, _)| *level == severity)
            .count()
    }
}

impl IntegrationHost for RecordingHost {
    type Instant = TestInstant;

    fn now(&self) -> TestInstant {
        TestInstant(self.now_ms)
    }

    fn tick_ms(&self) -> u16 {
        u16::try_from(self.now_ms % 65_536).unwrap_or_default()
    }

    fn arm_timer(&mut self, after: Duration) {
        self.timer = Some(after);
        self.timer_log.push(Some(after));
    }

    fn cancel_timer(&mut self) {
        self.timer = None;
        self.timer_log.push(None);
    }

    fn request_service(&mut self) {
        self.service_requests += 1;
    }

    fn user_message(&mut self, severity: MessageSeverity, message: fmt::Arguments<'_>) {
        self.messages.push((severity, message.to_string()));
    }

    fn send_bytes(&mut self, frame: &[u8]) {
        self.frames.push(frame.to_vec());
    }

    fn on_stopped(&mut self) {
        self.stopped += 1;
    }

    fn on_management_report(&mut self, report: ManagementReport, address: u16, node: Option<NodeInfo>) {
        self.reports.push((report, address, node));
    }

    fn on_most_error(&mut self, message: &MostErrorMessage<'_>) {
        self.most_errors.push(ForwardedError {
            source_address: message.source_address,
            fblock: message.fblock,
            instance: message.instance,
            function: message.function,
            op_type: message.op_type,
            payload: message.payload.to_vec(),
        });
    }
}

pub type TestUcsi = Ucsi<ScriptedStack<u8>, RecordingHost>;

pub fn context(stack: ScriptedStack<u8>) -> TestUcsi {
    Ucsi::new(stack, RecordingHost::default(), UcsiOptions::default())
}

/// Runs service iterations until the context has nothing left to do.
pub fn drive(ucsi: &mut TestUcsi) -> usize {
    let mut iterations = 0;
    while iterations < 32
        && (ucsi.service_pending() || (ucsi.in_flight().is_none() && ucsi.queued() > 0))
    {
        ucsi.service().expect("service loop should not latch a violation");
        iterations += 1;
    }
    iterations
}

pub fn pending_kinds(ucsi: &TestUcsi) -> Vec<CommandKind> {
    ucsi.pending_commands().map(|command| command.kind()).collect()
}

pub fn call_kinds(ucsi: &TestUcsi) -> Vec<CommandKind> {
    ucsi.stack().calls().map(|call| call.kind()).collect()
}
