//! Integration context bridging the network stack with the host event loop.
//!
//! [`Ucsi`] owns the stack, the host and the command queue. The host drives
//! it from a single thread through four entry points:
//!
//! - [`Ucsi::apply_new_config`] / [`Ucsi::set_route_active`] queue work,
//! - [`Ucsi::service`] runs the stack's service tick and dispatches at most
//!   one queued command,
//! - [`Ucsi::on_timer_expired`] reports application timer expiry,
//! - [`Ucsi::submit_received_bytes`] feeds the transport receive path.
//!
//! Callbacks raised by the stack land in [`callbacks`], which may queue
//! follow-up commands but never dispatches them. Dispatch happens only from
//! [`Ucsi::service`], so at most one command is in flight toward the stack.

mod callbacks;

use core::fmt;

use heapless::Vec;

use crate::command::{CommandKind, DEFAULT_COMMAND_QUEUE_DEPTH, StackCommand};
use crate::console::status::StatusSnapshot;
use crate::host::{IntegrationHost, MessageSeverity};
use crate::queue::CommandRing;
use crate::stack::{InitRequest, NetworkStack, ReturnCode, StackInitOptions};
use crate::telemetry::{
    TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecorder,
};

use callbacks::CallbackBridge;

/// Largest control frame the transport accepts, in bytes.
pub const MAX_TX_FRAME: usize = 72;

/// Consecutive init failures retried before the context gives up.
pub const DEFAULT_INIT_RETRY_BUDGET: u8 = 3;

/// Command type queued for a given stack.
pub type UcsiCommand<S> = StackCommand<
    <S as NetworkStack>::Config,
    <S as NetworkStack>::Route,
    <S as NetworkStack>::Node,
>;

/// Tunables applied when the context is created.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UcsiOptions {
    pub inic_watchdog_enabled: bool,
    pub ams_enabled: bool,
    /// Log resource manager debug reports.
    pub resource_debug_enabled: bool,
    /// Consecutive init failures that are retried. `None` retries forever.
    pub init_retry_budget: Option<u8>,
}

impl UcsiOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inic_watchdog_enabled: false,
            ams_enabled: true,
            resource_debug_enabled: true,
            init_retry_budget: Some(DEFAULT_INIT_RETRY_BUDGET),
        }
    }

    #[must_use]
    pub const fn with_init_retry_budget(mut self, budget: Option<u8>) -> Self {
        self.init_retry_budget = budget;
        self
    }

    #[must_use]
    pub const fn with_resource_debug(mut self, enabled: bool) -> Self {
        self.resource_debug_enabled = enabled;
        self
    }

    const fn stack_init_options(&self) -> StackInitOptions {
        StackInitOptions {
            inic_watchdog_enabled: self.inic_watchdog_enabled,
            ams_enabled: self.ams_enabled,
            resource_debug_enabled: self.resource_debug_enabled,
        }
    }
}

impl Default for UcsiOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A completion callback did not match the command in flight.
///
/// This is a contract breach by the network stack. The context latches the
/// first violation and every later entry point returns it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolViolation {
    /// Command kind the completion callback was raised for.
    pub callback: CommandKind,
    /// Command kind recorded as in flight, if any.
    pub in_flight: Option<CommandKind>,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.in_flight {
            Some(current) => write!(
                f,
                "{} completion raised while {current} is in flight",
                self.callback
            ),
            None => write!(
                f,
                "{} completion raised with no command in flight",
                self.callback
            ),
        }
    }
}

/// Result of handing one command to the stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    /// Accepted; a completion callback will follow.
    Pending,
    /// Accepted and finished inside the call.
    Completed,
    /// Refused by the stack.
    Rejected(ReturnCode),
}

/// Mutable state shared between the entry points and the stack callbacks.
pub(crate) struct CoreState<S, I, const N: usize>
where
    S: NetworkStack,
    I: Copy,
{
    pub(crate) queue: CommandRing<UcsiCommand<S>, N>,
    pub(crate) in_flight: Option<CommandKind>,
    pub(crate) initialized: bool,
    pub(crate) transport_attached: bool,
    pub(crate) service_pending: bool,
    pub(crate) violation: Option<ProtocolViolation>,
    pub(crate) init_failures: u8,
    pub(crate) init_dispatches: u32,
    pub(crate) telemetry: TelemetryRecorder<I>,
}

impl<S, I, const N: usize> CoreState<S, I, N>
where
    S: NetworkStack,
    I: TelemetryInstant,
{
    const fn new() -> Self {
        Self {
            queue: CommandRing::new(),
            in_flight: None,
            initialized: false,
            transport_attached: false,
            service_pending: false,
            violation: None,
            init_failures: 0,
            init_dispatches: 0,
            telemetry: TelemetryRecorder::new(),
        }
    }

    /// Queues a command and asks the host for a service call.
    ///
    /// A full queue is reported to the host as a warning and leaves the
    /// queue untouched.
    pub(crate) fn enqueue<H>(&mut self, host: &mut H, command: UcsiCommand<S>) -> bool
    where
        H: IntegrationHost<Instant = I>,
    {
        let kind = command.kind();
        match self.queue.enqueue(command) {
            Ok(()) => {
                self.telemetry
                    .record_command_queued(kind, self.queue.len(), host.now());
                host.request_service();
                true
            }
            Err(_) => {
                self.telemetry
                    .record_queue_full(kind, self.queue.len(), host.now());
                host.user_message(
                    MessageSeverity::Warning,
                    format_args!(
                        "could not enqueue {kind}: command queue full ({} entries)",
                        self.queue.capacity()
                    ),
                );
                false
            }
        }
    }

    /// Clears the in-flight guard for a command the stack finished inside
    /// the dispatch call.
    fn complete_sync<H>(&mut self, host: &mut H, kind: CommandKind)
    where
        H: IntegrationHost<Instant = I>,
    {
        if self.in_flight == Some(kind) {
            self.in_flight = None;
            let _ = self.queue.pop_front();
            self.telemetry
                .record_command_completed(kind, self.queue.len(), host.now());
        }
    }

    /// Drops a command the stack refused.
    fn drop_rejected<H>(&mut self, host: &mut H, kind: CommandKind, code: ReturnCode)
    where
        H: IntegrationHost<Instant = I>,
    {
        host.user_message(
            MessageSeverity::Error,
            format_args!("network stack rejected {kind}: {code}"),
        );
        self.telemetry
            .record_command_rejected(kind, code, host.now());
        // A completion raised inside the refused call has already popped it.
        if self.in_flight == Some(kind) {
            self.in_flight = None;
            let _ = self.queue.pop_front();
        }
    }

    pub(crate) fn latch_violation<H>(&mut self, host: &mut H, violation: ProtocolViolation)
    where
        H: IntegrationHost<Instant = I>,
    {
        host.user_message(
            MessageSeverity::Error,
            format_args!("protocol violation: {violation}"),
        );
        self.telemetry.record_violation(violation, host.now());
        if self.violation.is_none() {
            self.violation = Some(violation);
        }
    }

    fn check(&self) -> Result<(), ProtocolViolation> {
        match self.violation {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

/// Integration context for one controller instance.
pub struct Ucsi<S, H, const N: usize = DEFAULT_COMMAND_QUEUE_DEPTH>
where
    S: NetworkStack,
    H: IntegrationHost,
{
    stack: S,
    host: H,
    options: UcsiOptions,
    state: CoreState<S, H::Instant, N>,
}

impl<S, H, const N: usize> Ucsi<S, H, N>
where
    S: NetworkStack,
    H: IntegrationHost,
{
    /// Creates an idle context. Nothing is queued until the first
    /// [`Ucsi::apply_new_config`].
    pub fn new(stack: S, host: H, options: UcsiOptions) -> Self {
        Self {
            stack,
            host,
            options,
            state: CoreState::new(),
        }
    }

    /// Queues a restart of the stack with `config`.
    ///
    /// A running stack is stopped first. Returns `false` when either command
    /// could not be queued; the caller may retry later.
    pub fn apply_new_config(&mut self, config: S::Config) -> bool {
        if self.state.initialized && !self.state.enqueue(&mut self.host, StackCommand::Stop) {
            return false;
        }
        self.state.init_failures = 0;
        self.state
            .enqueue(&mut self.host, StackCommand::Init(config))
    }

    /// Queues a route activation change. Returns `false` when the queue is full.
    pub fn set_route_active(&mut self, route: S::Route, active: bool) -> bool {
        self.state
            .enqueue(&mut self.host, StackCommand::SetRoute { route, active })
    }

    /// Offers transport bytes to the stack.
    ///
    /// Returns `false` when the transport is not started or the stack has no
    /// receive buffer. The caller must keep the bytes and offer them again
    /// after the next service request.
    pub fn submit_received_bytes(&mut self, bytes: &[u8]) -> bool {
        if !self.state.transport_attached {
            return false;
        }
        let (stack, mut bridge) = self.split();
        stack.receive(bytes, &mut bridge).is_ok()
    }

    /// Runs one service loop iteration.
    ///
    /// # Errors
    ///
    /// Returns the latched [`ProtocolViolation`] once the stack has raised a
    /// completion that does not match the in-flight command.
    pub fn service(&mut self) -> Result<(), ProtocolViolation> {
        self.state.check()?;

        if self.state.service_pending {
            self.state.service_pending = false;
            self.state.telemetry.record(
                TelemetryEventKind::ServiceTick,
                TelemetryPayload::none(),
                self.host.now(),
            );
            let (stack, mut bridge) = self.split();
            stack.service(&mut bridge);
            self.state.check()?;
        }

        if self.state.in_flight.is_some() {
            return Ok(());
        }
        let Some(command) = self.state.queue.peek_front().cloned() else {
            return Ok(());
        };

        let kind = command.kind();
        self.state.in_flight = Some(kind);
        if kind == CommandKind::Init {
            self.state.init_dispatches = self.state.init_dispatches.wrapping_add(1);
        }
        self.state
            .telemetry
            .record_command_dispatched(kind, self.state.queue.len(), self.host.now());

        match self.dispatch(&command) {
            DispatchOutcome::Pending => {}
            DispatchOutcome::Completed => self.state.complete_sync(&mut self.host, kind),
            DispatchOutcome::Rejected(code) => {
                self.state.drop_rejected(&mut self.host, kind, code);
            }
        }

        self.state.check()
    }

    /// Reports application timer expiry to the stack.
    ///
    /// # Errors
    ///
    /// Returns the latched [`ProtocolViolation`], as [`Ucsi::service`] does.
    pub fn on_timer_expired(&mut self) -> Result<(), ProtocolViolation> {
        self.state.check()?;
        self.state.telemetry.record(
            TelemetryEventKind::TimerExpired,
            TelemetryPayload::none(),
            self.host.now(),
        );
        let (stack, mut bridge) = self.split();
        stack.report_timeout(&mut bridge);
        self.state.check()
    }

    fn dispatch(&mut self, command: &UcsiCommand<S>) -> DispatchOutcome {
        let options = self.options.stack_init_options();
        let (stack, mut bridge) = self.split();
        let result = match command {
            StackCommand::Init(config) => {
                stack.init(&InitRequest { config, options }, &mut bridge)
            }
            StackCommand::Stop => stack.stop(&mut bridge),
            StackCommand::SetRoute { route, active } => {
                stack.set_route_active(*route, *active, &mut bridge)
            }
            StackCommand::RunNodeScript(node) => stack.run_node_script(*node, &mut bridge),
        };

        match result {
            Err(code) => DispatchOutcome::Rejected(code),
            Ok(()) if command.kind().completes_async() => DispatchOutcome::Pending,
            Ok(()) => DispatchOutcome::Completed,
        }
    }

    fn split(&mut self) -> (&mut S, CallbackBridge<'_, S, H, N>) {
        (
            &mut self.stack,
            CallbackBridge::new(&mut self.state, &mut self.host, &self.options),
        )
    }

    /// Returns `true` once the stack reported a successful init and has not
    /// been stopped since.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    /// Returns `true` while the stack's transport toward the chip is started.
    #[must_use]
    pub fn transport_attached(&self) -> bool {
        self.state.transport_attached
    }

    /// Kind of the command awaiting its completion callback.
    #[must_use]
    pub fn in_flight(&self) -> Option<CommandKind> {
        self.state.in_flight
    }

    /// Number of queued commands, including the in-flight one.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.queue.len()
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.state.queue.capacity()
    }

    /// Iterates queued commands from oldest to newest.
    pub fn pending_commands(&self) -> impl Iterator<Item = &UcsiCommand<S>> {
        self.state.queue.iter()
    }

    /// Returns `true` when the stack asked for its service tick.
    #[must_use]
    pub fn service_pending(&self) -> bool {
        self.state.service_pending
    }

    /// Number of init commands handed to the stack so far.
    #[must_use]
    pub fn init_dispatches(&self) -> u32 {
        self.state.init_dispatches
    }

    /// Consecutive init failures since the last success or new configuration.
    #[must_use]
    pub fn init_failures(&self) -> u8 {
        self.state.init_failures
    }

    /// Copies the state shown by the `status` console command.
    #[must_use]
    pub fn status_snapshot(&self) -> StatusSnapshot {
        let mut queued = Vec::new();
        for command in self.state.queue.iter() {
            if queued.push(command.kind()).is_err() {
                break;
            }
        }
        StatusSnapshot {
            initialized: self.state.initialized,
            transport_attached: self.state.transport_attached,
            service_pending: self.state.service_pending,
            in_flight: self.state.in_flight,
            queued,
            queue_len: self.state.queue.len(),
            queue_capacity: self.state.queue.capacity(),
            init_failures: self.state.init_failures,
            init_dispatches: self.state.init_dispatches,
            init_retry_budget: self.options.init_retry_budget,
            violation: self.state.violation,
        }
    }

    #[must_use]
    pub fn violation(&self) -> Option<ProtocolViolation> {
        self.state.violation
    }

    #[must_use]
    pub fn options(&self) -> &UcsiOptions {
        &self.options
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder<H::Instant> {
        &self.state.telemetry
    }

    #[must_use]
    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}
