//! Stack callback handlers.
//!
//! The bridge borrows the context state and the host for the duration of one
//! stack call. Handlers update state and may queue follow-up commands; they
//! never dispatch, so no stack call is ever nested inside another.

use core::fmt;

use heapless::Vec;

use crate::command::{CommandKind, StackCommand};
use crate::host::{IntegrationHost, MessageSeverity, TimerRequest};
use crate::stack::{
    GeneralError, InitResult, ManagementReport, MostErrorMessage, NetworkStack, NodeDescriptor,
    NodeInfo, NodeScriptResult, PortStatus, ResourceReport, RouteInfo, StackCallbacks, StdResult,
    TraceLevel,
};
use crate::telemetry::{
    RetryTelemetry, StackErrorTelemetry, TelemetryEventKind, TelemetryPayload,
};

use super::{CoreState, MAX_TX_FRAME, ProtocolViolation, UcsiCommand, UcsiOptions};

pub(crate) struct CallbackBridge<'a, S, H, const N: usize>
where
    S: NetworkStack,
    H: IntegrationHost,
{
    state: &'a mut CoreState<S, H::Instant, N>,
    host: &'a mut H,
    options: &'a UcsiOptions,
}

impl<'a, S, H, const N: usize> CallbackBridge<'a, S, H, N>
where
    S: NetworkStack,
    H: IntegrationHost,
{
    pub(crate) fn new(
        state: &'a mut CoreState<S, H::Instant, N>,
        host: &'a mut H,
        options: &'a UcsiOptions,
    ) -> Self {
        Self {
            state,
            host,
            options,
        }
    }

    /// Pops the in-flight command when `callback` matches it.
    ///
    /// A mismatch latches a [`ProtocolViolation`] and leaves the queue as is.
    fn finish_in_flight(
        &mut self,
        callback: CommandKind,
    ) -> Result<Option<UcsiCommand<S>>, ProtocolViolation> {
        match self.state.in_flight {
            Some(current) if current == callback => {
                self.state.in_flight = None;
                let finished = self.state.queue.pop_front();
                self.state.telemetry.record_command_completed(
                    callback,
                    self.state.queue.len(),
                    self.host.now(),
                );
                Ok(finished)
            }
            in_flight => {
                let violation = ProtocolViolation {
                    callback,
                    in_flight,
                };
                self.state.latch_violation(&mut *self.host, violation);
                Err(violation)
            }
        }
    }

    fn message(&mut self, severity: MessageSeverity, args: fmt::Arguments<'_>) {
        self.host.user_message(severity, args);
    }

    fn retry_init(&mut self, finished: Option<UcsiCommand<S>>, result: InitResult) {
        self.state.init_failures = self.state.init_failures.saturating_add(1);
        let failures = self.state.init_failures;
        let budget = self.options.init_retry_budget;
        let retrying = budget.is_none_or(|limit| failures <= limit);

        self.state.telemetry.record_init_failure(
            RetryTelemetry {
                failures,
                budget,
                result,
            },
            retrying,
            self.host.now(),
        );

        if !retrying {
            self.message(
                MessageSeverity::Error,
                format_args!(
                    "init reported error (0x{:02X}), giving up after {failures} attempts",
                    result.to_raw()
                ),
            );
            return;
        }

        self.message(
            MessageSeverity::Error,
            format_args!(
                "init reported error (0x{:02X}), restarting...",
                result.to_raw()
            ),
        );
        if let Some(StackCommand::Init(config)) = finished {
            self.state
                .enqueue(&mut *self.host, StackCommand::Init(config));
        }
    }
}

impl<S, H, const N: usize> StackCallbacks<S::Route, S::Node> for CallbackBridge<'_, S, H, N>
where
    S: NetworkStack,
    H: IntegrationHost,
{
    fn tick_ms(&mut self) -> u16 {
        self.host.tick_ms()
    }

    fn request_service(&mut self) {
        self.state.service_pending = true;
        self.host.request_service();
    }

    fn set_app_timer(&mut self, timeout_ms: u16) {
        let request = TimerRequest::from_raw(timeout_ms);
        self.state.telemetry.record_timer_request(
            timeout_ms,
            request == TimerRequest::Cancel,
            self.host.now(),
        );
        match request {
            TimerRequest::Arm(after) => self.host.arm_timer(after),
            TimerRequest::Cancel => self.host.cancel_timer(),
        }
    }

    fn general_error(&mut self, error: GeneralError) {
        self.state.telemetry.record(
            TelemetryEventKind::StackError,
            TelemetryPayload::Stack(StackErrorTelemetry::General(error.to_raw())),
            self.host.now(),
        );
        self.message(
            MessageSeverity::Error,
            format_args!("network stack general error, code=0x{:X}", error.to_raw()),
        );
    }

    fn most_error(&mut self, message: &MostErrorMessage<'_>) {
        self.host.on_most_error(message);
    }

    fn transport_started(&mut self) {
        self.state.transport_attached = true;
        self.message(MessageSeverity::Debug, format_args!("transport started"));
    }

    fn transport_stopped(&mut self) {
        self.state.transport_attached = false;
        self.message(MessageSeverity::Debug, format_args!("transport stopped"));
    }

    fn rx_buffers_available(&mut self) {
        self.host.request_service();
    }

    fn transmit(&mut self, segments: &[&[u8]]) {
        let total: usize = segments.iter().map(|segment| segment.len()).sum();
        let mut frame: Vec<u8, MAX_TX_FRAME> = Vec::new();
        let gathered = segments
            .iter()
            .all(|segment| frame.extend_from_slice(segment).is_ok());

        if gathered {
            self.host.send_bytes(&frame);
        } else {
            self.state
                .telemetry
                .record_transmit_dropped(total, self.host.now());
            self.message(
                MessageSeverity::Error,
                format_args!(
                    "transmit frame of {total} bytes exceeds the {MAX_TX_FRAME} byte limit, dropped"
                ),
            );
        }
    }

    fn init_result(&mut self, result: InitResult) {
        let Ok(finished) = self.finish_in_flight(CommandKind::Init) else {
            return;
        };
        self.state.initialized = result.is_success();
        if result.is_success() {
            self.state.init_failures = 0;
            self.message(MessageSeverity::Info, format_args!("network stack initialized"));
        } else {
            self.retry_init(finished, result);
        }
    }

    fn stop_result(&mut self, result: StdResult) {
        if self.finish_in_flight(CommandKind::Stop).is_err() {
            return;
        }
        self.state.initialized = false;
        if !result.is_success() {
            self.message(
                MessageSeverity::Warning,
                format_args!("stop reported error (0x{:02X})", result.to_raw()),
            );
        }
        self.host.on_stopped();
    }

    fn node_script_result(&mut self, result: NodeScriptResult, node: &S::Node) {
        if self.finish_in_flight(CommandKind::RunNodeScript).is_err() {
            return;
        }
        let (severity, outcome) = match result {
            NodeScriptResult::Success => (MessageSeverity::Info, "succeeded"),
            NodeScriptResult::Error => (MessageSeverity::Error, "failed"),
        };
        self.message(
            severity,
            format_args!("node 0x{:03X}: script execution {outcome}", node.address()),
        );
    }

    fn route_report(&mut self, route: &S::Route, info: RouteInfo) {
        self.message(
            MessageSeverity::Debug,
            format_args!("route {route:?} {}", info.label()),
        );
    }

    fn port_status(&mut self, status: PortStatus) {
        self.message(
            MessageSeverity::Debug,
            format_args!(
                "port 0x{:04X} available={} free-bandwidth={}",
                status.port_id, status.available, status.free_bandwidth
            ),
        );
    }

    fn resource_report(&mut self, report: ResourceReport) {
        if !self.options.resource_debug_enabled {
            return;
        }
        self.message(
            MessageSeverity::Debug,
            format_args!(
                "resource debug (0x{:03X}): {} {}",
                report.node_address,
                report.kind.label(),
                report.state.label()
            ),
        );
    }

    fn management_report(
        &mut self,
        report: ManagementReport,
        address: u16,
        node: Option<&S::Node>,
    ) {
        if let Some(node) = node.filter(|node| node.has_scripts()) {
            // A full queue drops the script run; the enqueue already warned.
            self.state
                .enqueue(&mut *self.host, StackCommand::RunNodeScript(*node));
        }
        self.host
            .on_management_report(report, address, node.map(NodeInfo::of));
    }

    fn trace(&mut self, level: TraceLevel, module: &str, message: fmt::Arguments<'_>) {
        let severity = match level {
            TraceLevel::Error => MessageSeverity::Error,
            TraceLevel::Info => MessageSeverity::Info,
        };
        self.message(severity, format_args!("{module} | {message}"));
    }
}
