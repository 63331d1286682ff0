//! Deterministic stand-in for the network stack.
//!
//! [`ScriptedStack`] implements [`NetworkStack`] without any hardware. It
//! records every call, completes asynchronous commands on its next service
//! tick (or inside the call, or never, see [`CompletionMode`]) and lets the
//! caller inject stack events such as management reports. Integration tests
//! and the emulator both drive the integration core against it.

use heapless::{Deque, HistoryBuf, OldestOrdered, Vec};

use crate::command::CommandKind;
use crate::stack::{
    GeneralError, InitRequest, InitResult, ManagementReport, MostErrorMessage, NetworkStack,
    NodeDescriptor, NodeScriptResult, PortStatus, ResourceReport, ReturnCode, RouteInfo, RxRejected,
    StackCallbacks, StackInitOptions, StdResult, TraceLevel,
};

/// Number of stack calls retained for inspection.
pub const CALL_HISTORY: usize = 32;
/// Maximum number of injected events waiting for the next service tick.
pub const MAX_PENDING_EVENTS: usize = 16;
/// Nodes announced after a successful init.
pub const MAX_SIM_NODES: usize = 8;
/// Size of the control frame the stack sends while starting.
pub const INIT_FRAME_LEN: usize = 12;
/// Application timer requested while starting.
pub const INIT_TIMER_MS: u16 = 50;

/// Route handle used by the scripted stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SimRoute(pub u16);

/// Node handle used by the scripted stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SimNode {
    pub address: u16,
    pub scripts: u8,
}

impl SimNode {
    #[must_use]
    pub const fn new(address: u16, scripts: u8) -> Self {
        Self { address, scripts }
    }
}

impl NodeDescriptor for SimNode {
    fn address(&self) -> u16 {
        self.address
    }

    fn script_count(&self) -> usize {
        usize::from(self.scripts)
    }
}

/// How the scripted stack reports asynchronous command results.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum CompletionMode {
    /// Results are delivered on the next service tick.
    #[default]
    OnService,
    /// Results are delivered before the command call returns.
    Immediate,
    /// Results are never generated; the caller injects them with
    /// [`ScriptedStack::schedule`].
    Manual,
}

/// Stack call recorded by the scripted stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StackCall {
    Init,
    Stop,
    SetRoute { route: SimRoute, active: bool },
    RunNodeScript { address: u16 },
}

impl StackCall {
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            StackCall::Init => CommandKind::Init,
            StackCall::Stop => CommandKind::Stop,
            StackCall::SetRoute { .. } => CommandKind::SetRoute,
            StackCall::RunNodeScript { .. } => CommandKind::RunNodeScript,
        }
    }
}

/// Event delivered to the integration on a service tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimEvent {
    InitResult(InitResult),
    StopResult(StdResult),
    NodeScriptResult(NodeScriptResult, SimNode),
    ManagementReport {
        report: ManagementReport,
        address: u16,
        node: Option<SimNode>,
    },
    GeneralError(GeneralError),
    /// Error message from a remote node, forwarded as received.
    MostError(MostErrorMessage<'static>),
    RouteReport(SimRoute, RouteInfo),
    PortStatus(PortStatus),
    ResourceReport(ResourceReport),
    AppTimer(u16),
    /// Control frame of the given length, sent as two segments.
    Transmit(usize),
    Trace(TraceLevel, &'static str),
}

/// Scripted network stack.
pub struct ScriptedStack<C> {
    mode: CompletionMode,
    calls: HistoryBuf<StackCall, CALL_HISTORY>,
    pending: Deque<SimEvent, MAX_PENDING_EVENTS>,
    nodes: Vec<SimNode, MAX_SIM_NODES>,
    init_failures_left: u8,
    reject_next: Option<(CommandKind, ReturnCode)>,
    rx_buffers: u8,
    rx_in_use: u8,
    rx_starved: bool,
    rx_bytes: usize,
    running: bool,
    active_config: Option<C>,
    last_options: Option<StackInitOptions>,
    service_ticks: u32,
    timeouts: u32,
}

impl<C: Clone> ScriptedStack<C> {
    /// Creates a stack that completes commands on its next service tick and
    /// owns two receive buffers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: CompletionMode::OnService,
            calls: HistoryBuf::new(),
            pending: Deque::new(),
            nodes: Vec::new(),
            init_failures_left: 0,
            reject_next: None,
            rx_buffers: 2,
            rx_in_use: 0,
            rx_starved: false,
            rx_bytes: 0,
            running: false,
            active_config: None,
            last_options: None,
            service_ticks: 0,
            timeouts: 0,
        }
    }

    #[must_use]
    pub const fn with_completion(mut self, mode: CompletionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Makes the next `count` init attempts report [`InitResult::ErrTimeout`].
    #[must_use]
    pub const fn failing_inits(mut self, count: u8) -> Self {
        self.init_failures_left = count;
        self
    }

    #[must_use]
    pub const fn with_rx_buffers(mut self, count: u8) -> Self {
        self.rx_buffers = count;
        self
    }

    /// Announces `node` as available after every successful init.
    ///
    /// Nodes beyond [`MAX_SIM_NODES`] are ignored.
    #[must_use]
    pub fn with_node(mut self, node: SimNode) -> Self {
        let _ = self.nodes.push(node);
        self
    }

    pub fn set_completion(&mut self, mode: CompletionMode) {
        self.mode = mode;
    }

    pub fn fail_next_inits(&mut self, count: u8) {
        self.init_failures_left = count;
    }

    /// Makes the next call of `kind` return `code` instead of running.
    pub fn reject_next(&mut self, kind: CommandKind, code: ReturnCode) {
        self.reject_next = Some((kind, code));
    }

    /// Queues an event for the next service tick. Returns `false` when the
    /// event backlog is full.
    pub fn schedule(&mut self, event: SimEvent) -> bool {
        self.pending.push_back(event).is_ok()
    }

    /// Calls the integration made, oldest first.
    #[must_use]
    pub fn calls(&self) -> OldestOrdered<'_, StackCall> {
        self.calls.oldest_ordered()
    }

    /// Number of retained calls of `kind`.
    #[must_use]
    pub fn call_count(&self, kind: CommandKind) -> usize {
        self.calls
            .oldest_ordered()
            .filter(|call| call.kind() == kind)
            .count()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Configuration of the last successful init.
    #[must_use]
    pub fn active_config(&self) -> Option<&C> {
        self.active_config.as_ref()
    }

    /// Options passed with the most recent init request.
    #[must_use]
    pub fn last_init_options(&self) -> Option<StackInitOptions> {
        self.last_options
    }

    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn service_ticks(&self) -> u32 {
        self.service_ticks
    }

    #[must_use]
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// Total bytes accepted on the receive path.
    #[must_use]
    pub fn rx_bytes(&self) -> usize {
        self.rx_bytes
    }

    fn take_rejection(&mut self, kind: CommandKind) -> Result<(), ReturnCode> {
        match self.reject_next {
            Some((target, code)) if target == kind => {
                self.reject_next = None;
                Err(code)
            }
            _ => Ok(()),
        }
    }

    fn complete(
        &mut self,
        event: SimEvent,
        callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>,
    ) {
        match self.mode {
            CompletionMode::Immediate => self.deliver(event, callbacks),
            CompletionMode::OnService => {
                let _ = self.pending.push_back(event);
                callbacks.request_service();
            }
            CompletionMode::Manual => callbacks.request_service(),
        }
    }

    fn deliver(&mut self, event: SimEvent, callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>) {
        match event {
            SimEvent::InitResult(result) => {
                self.running = result.is_success();
                callbacks.init_result(result);
                if self.running {
                    for node in self.nodes.clone() {
                        let _ = self.pending.push_back(SimEvent::ManagementReport {
                            report: ManagementReport::Available,
                            address: node.address,
                            node: Some(node),
                        });
                    }
                    if !self.pending.is_empty() {
                        callbacks.request_service();
                    }
                }
            }
            SimEvent::StopResult(result) => {
                self.running = false;
                callbacks.transport_stopped();
                callbacks.stop_result(result);
            }
            SimEvent::NodeScriptResult(result, node) => callbacks.node_script_result(result, &node),
            SimEvent::ManagementReport {
                report,
                address,
                node,
            } => callbacks.management_report(report, address, node.as_ref()),
            SimEvent::GeneralError(error) => callbacks.general_error(error),
            SimEvent::MostError(message) => callbacks.most_error(&message),
            SimEvent::RouteReport(route, info) => callbacks.route_report(&route, info),
            SimEvent::PortStatus(status) => callbacks.port_status(status),
            SimEvent::ResourceReport(report) => callbacks.resource_report(report),
            SimEvent::AppTimer(timeout_ms) => callbacks.set_app_timer(timeout_ms),
            SimEvent::Transmit(len) => send_frame(len, callbacks),
            SimEvent::Trace(level, text) => {
                callbacks.trace(level, "SIM", format_args!("{text}"));
            }
        }
    }
}

impl<C: Clone> Default for ScriptedStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clone> NetworkStack for ScriptedStack<C> {
    type Config = C;
    type Route = SimRoute;
    type Node = SimNode;

    fn init(
        &mut self,
        request: &InitRequest<'_, C>,
        callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>,
    ) -> Result<(), ReturnCode> {
        self.calls.write(StackCall::Init);
        self.take_rejection(CommandKind::Init)?;
        self.last_options = Some(request.options);

        callbacks.transport_started();
        send_frame(INIT_FRAME_LEN, callbacks);
        callbacks.set_app_timer(INIT_TIMER_MS);

        let result = if self.init_failures_left > 0 {
            self.init_failures_left -= 1;
            InitResult::ErrTimeout
        } else {
            self.active_config = Some(request.config.clone());
            InitResult::Success
        };
        self.complete(SimEvent::InitResult(result), callbacks);
        Ok(())
    }

    fn stop(
        &mut self,
        callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>,
    ) -> Result<(), ReturnCode> {
        self.calls.write(StackCall::Stop);
        self.take_rejection(CommandKind::Stop)?;
        self.complete(SimEvent::StopResult(StdResult::Success), callbacks);
        Ok(())
    }

    fn set_route_active(
        &mut self,
        route: SimRoute,
        active: bool,
        callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>,
    ) -> Result<(), ReturnCode> {
        self.calls.write(StackCall::SetRoute { route, active });
        self.take_rejection(CommandKind::SetRoute)?;
        if !self.running {
            return Err(ReturnCode::NotInitialized);
        }
        let info = if active {
            RouteInfo::Built
        } else {
            RouteInfo::Destroyed
        };
        callbacks.route_report(&route, info);
        Ok(())
    }

    fn run_node_script(
        &mut self,
        node: SimNode,
        callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>,
    ) -> Result<(), ReturnCode> {
        self.calls.write(StackCall::RunNodeScript {
            address: node.address,
        });
        self.take_rejection(CommandKind::RunNodeScript)?;
        self.complete(
            SimEvent::NodeScriptResult(NodeScriptResult::Success, node),
            callbacks,
        );
        Ok(())
    }

    fn service(&mut self, callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>) {
        self.service_ticks = self.service_ticks.wrapping_add(1);
        let _ = callbacks.tick_ms();

        if self.rx_in_use > 0 {
            self.rx_in_use = 0;
            if self.rx_starved {
                self.rx_starved = false;
                callbacks.rx_buffers_available();
            }
        }

        // Events raised while delivering wait for the next tick.
        for _ in 0..self.pending.len() {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            self.deliver(event, callbacks);
        }
    }

    fn report_timeout(&mut self, callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>) {
        self.timeouts = self.timeouts.wrapping_add(1);
        if !self.pending.is_empty() {
            callbacks.request_service();
        }
    }

    fn receive(
        &mut self,
        bytes: &[u8],
        callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>,
    ) -> Result<(), RxRejected> {
        if self.rx_in_use >= self.rx_buffers {
            self.rx_starved = true;
            return Err(RxRejected);
        }
        self.rx_in_use += 1;
        self.rx_bytes += bytes.len();
        callbacks.request_service();
        Ok(())
    }
}

fn send_frame(len: usize, callbacks: &mut dyn StackCallbacks<SimRoute, SimNode>) {
    const FILL: [u8; 128] = [0xA5; 128];
    let len = len.min(FILL.len());
    let (header, body) = FILL[..len].split_at(len.min(4));
    callbacks.transmit(&[header, body]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::MostErrorMessage;
    use core::fmt;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Seen {
        ServiceRequest,
        Timer(u16),
        TransportStarted,
        TransportStopped,
        RxAvailable,
        Frame(usize),
        Init(InitResult),
        Stop(StdResult),
        Script(u16),
        Route(SimRoute, RouteInfo),
        Report(ManagementReport, u16),
        Other,
    }

    #[derive(Default)]
    struct Recorder {
        seen: Vec<Seen, 32>,
    }

    impl Recorder {
        fn push(&mut self, event: Seen) {
            self.seen.push(event).expect("recorder capacity");
        }

        fn contains(&self, event: &Seen) -> bool {
            self.seen.iter().any(|seen| seen == event)
        }
    }

    impl StackCallbacks<SimRoute, SimNode> for Recorder {
        fn tick_ms(&mut self) -> u16 {
            0
        }
        fn request_service(&mut self) {
            self.push(Seen::ServiceRequest);
        }
        fn set_app_timer(&mut self, timeout_ms: u16) {
            self.push(Seen::Timer(timeout_ms));
        }
        fn general_error(&mut self, _error: GeneralError) {
            self.push(Seen::Other);
        }
        fn most_error(&mut self, _message: &MostErrorMessage<'_>) {
            self.push(Seen::Other);
        }
        fn transport_started(&mut self) {
            self.push(Seen::TransportStarted);
        }
        fn transport_stopped(&mut self) {
            self.push(Seen::TransportStopped);
        }
        fn rx_buffers_available(&mut self) {
            self.push(Seen::RxAvailable);
        }
        fn transmit(&mut self, segments: &[&[u8]]) {
            self.push(Seen::Frame(segments.iter().map(|s| s.len()).sum()));
        }
        fn init_result(&mut self, result: InitResult) {
            self.push(Seen::Init(result));
        }
        fn stop_result(&mut self, result: StdResult) {
            self.push(Seen::Stop(result));
        }
        fn node_script_result(&mut self, _result: NodeScriptResult, node: &SimNode) {
            self.push(Seen::Script(node.address));
        }
        fn route_report(&mut self, route: &SimRoute, info: RouteInfo) {
            self.push(Seen::Route(*route, info));
        }
        fn port_status(&mut self, _status: PortStatus) {
            self.push(Seen::Other);
        }
        fn resource_report(&mut self, _report: ResourceReport) {
            self.push(Seen::Other);
        }
        fn management_report(&mut self, report: ManagementReport, address: u16, _node: Option<&SimNode>) {
            self.push(Seen::Report(report, address));
        }
        fn trace(&mut self, _level: TraceLevel, _module: &str, _message: fmt::Arguments<'_>) {
            self.push(Seen::Other);
        }
    }

    fn init(stack: &mut ScriptedStack<u8>, recorder: &mut Recorder) -> Result<(), ReturnCode> {
        let options = StackInitOptions {
            inic_watchdog_enabled: false,
            ams_enabled: true,
            resource_debug_enabled: true,
        };
        stack.init(&InitRequest { config: &7, options }, recorder)
    }

    #[test]
    fn init_completes_on_the_next_service_tick() {
        let mut stack = ScriptedStack::<u8>::new();
        let mut recorder = Recorder::default();

        init(&mut stack, &mut recorder).expect("init accepted");
        assert_eq!(
            recorder.seen.as_slice(),
            &[
                Seen::TransportStarted,
                Seen::Frame(INIT_FRAME_LEN),
                Seen::Timer(INIT_TIMER_MS),
                Seen::ServiceRequest,
            ]
        );
        assert!(!recorder.contains(&Seen::Init(InitResult::Success)));

        stack.service(&mut recorder);
        assert!(recorder.contains(&Seen::Init(InitResult::Success)));
        assert!(stack.is_running());
        assert_eq!(stack.active_config(), Some(&7));
    }

    #[test]
    fn immediate_mode_reports_failures_inside_the_call() {
        let mut stack = ScriptedStack::<u8>::new()
            .with_completion(CompletionMode::Immediate)
            .failing_inits(1);
        let mut recorder = Recorder::default();

        init(&mut stack, &mut recorder).expect("init accepted");
        assert!(recorder.contains(&Seen::Init(InitResult::ErrTimeout)));
        assert!(stack.active_config().is_none());

        init(&mut stack, &mut recorder).expect("init accepted");
        assert!(recorder.contains(&Seen::Init(InitResult::Success)));
        assert_eq!(stack.call_count(CommandKind::Init), 2);
    }

    #[test]
    fn rejection_applies_once() {
        let mut stack = ScriptedStack::<u8>::new();
        let mut recorder = Recorder::default();
        stack.reject_next(CommandKind::Init, ReturnCode::ApiLocked);

        assert_eq!(init(&mut stack, &mut recorder), Err(ReturnCode::ApiLocked));
        assert!(recorder.seen.is_empty());
        assert_eq!(init(&mut stack, &mut recorder), Ok(()));
    }

    #[test]
    fn routes_require_a_running_stack() {
        let mut stack = ScriptedStack::<u8>::new().with_completion(CompletionMode::Immediate);
        let mut recorder = Recorder::default();

        assert_eq!(
            stack.set_route_active(SimRoute(3), true, &mut recorder),
            Err(ReturnCode::NotInitialized)
        );
        init(&mut stack, &mut recorder).expect("init accepted");
        stack
            .set_route_active(SimRoute(3), true, &mut recorder)
            .expect("route accepted");
        assert!(recorder.contains(&Seen::Route(SimRoute(3), RouteInfo::Built)));
    }

    #[test]
    fn receive_buffers_are_released_on_service() {
        let mut stack = ScriptedStack::<u8>::new().with_rx_buffers(1);
        let mut recorder = Recorder::default();

        assert_eq!(stack.receive(&[1, 2, 3], &mut recorder), Ok(()));
        assert_eq!(stack.receive(&[4], &mut recorder), Err(RxRejected));
        stack.service(&mut recorder);
        assert!(recorder.contains(&Seen::RxAvailable));
        assert_eq!(stack.receive(&[4], &mut recorder), Ok(()));
        assert_eq!(stack.rx_bytes(), 4);
    }

    #[test]
    fn configured_nodes_are_announced_after_init() {
        let mut stack = ScriptedStack::<u8>::new().with_node(SimNode::new(0x200, 1));
        let mut recorder = Recorder::default();

        init(&mut stack, &mut recorder).expect("init accepted");
        stack.service(&mut recorder);
        assert!(!recorder.contains(&Seen::Report(ManagementReport::Available, 0x200)));
        assert_eq!(stack.pending_events(), 1);

        stack.service(&mut recorder);
        assert!(recorder.contains(&Seen::Report(ManagementReport::Available, 0x200)));
    }

    #[test]
    fn stop_detaches_the_transport() {
        let mut stack = ScriptedStack::<u8>::new().with_completion(CompletionMode::Immediate);
        let mut recorder = Recorder::default();

        stack.stop(&mut recorder).expect("stop accepted");
        assert!(recorder.contains(&Seen::TransportStopped));
        assert!(recorder.contains(&Seen::Stop(StdResult::Success)));
        assert!(!stack.is_running());
    }
}
