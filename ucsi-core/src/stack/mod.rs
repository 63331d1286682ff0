//! Boundary between the integration core and the network stack.
//!
//! The stack itself is an external collaborator. [`NetworkStack`] is the
//! surface the core drives; [`StackCallbacks`] is the surface the stack
//! reports back through. Every stack entry point receives the callbacks as a
//! `&mut dyn` argument, and the stack may invoke them before returning
//! (synchronous completion) or during a later entry point call (asynchronous
//! completion). The stack never keeps the callback reference.

pub mod codes;

use core::fmt;

pub use codes::{
    GeneralError, InitResult, ManagementReport, MostErrorMessage, NodeScriptResult, PortStatus,
    ResourceKind, ResourceReport, ResourceState, ReturnCode, RouteInfo, StdResult, TraceLevel,
};

/// Node handle exposed by the stack in management reports.
pub trait NodeDescriptor {
    /// Network address of the node.
    fn address(&self) -> u16;

    /// Number of scripts attached to the node configuration.
    fn script_count(&self) -> usize;

    /// Returns `true` when the node carries a non-empty script list.
    fn has_scripts(&self) -> bool {
        self.script_count() > 0
    }
}

/// Plain-data view of a node handed to the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeInfo {
    pub address: u16,
    pub script_count: usize,
}

impl NodeInfo {
    /// Captures the descriptor fields the host cares about.
    #[must_use]
    pub fn of<N: NodeDescriptor>(node: &N) -> Self {
        Self {
            address: node.address(),
            script_count: node.script_count(),
        }
    }
}

/// Options stamped onto every init request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackInitOptions {
    /// Let the controller chip supervise the host with its watchdog.
    pub inic_watchdog_enabled: bool,
    /// Route application messages through the stack's message service.
    pub ams_enabled: bool,
    /// Ask the resource manager for per-resource debug reports.
    pub resource_debug_enabled: bool,
}

/// Init request passed to [`NetworkStack::init`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InitRequest<'a, C> {
    pub config: &'a C,
    pub options: StackInitOptions,
}

/// Error returned when the stack has no receive buffer for incoming bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxRejected;

impl fmt::Display for RxRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no receive buffer available")
    }
}

/// Callbacks the stack raises toward the integration core.
///
/// `R` and `N` are the stack's route and node handle types.
pub trait StackCallbacks<R, N> {
    /// Millisecond tick used by the stack for its internal timing.
    fn tick_ms(&mut self) -> u16;

    /// The stack wants its service tick run as soon as possible.
    fn request_service(&mut self);

    /// The stack wants [`NetworkStack::report_timeout`] called after
    /// `timeout_ms`. `0` fires immediately; [`crate::host::APP_TIMER_CANCEL`]
    /// cancels the outstanding timer.
    fn set_app_timer(&mut self, timeout_ms: u16);

    fn general_error(&mut self, error: GeneralError);

    fn most_error(&mut self, message: &MostErrorMessage<'_>);

    /// The transport toward the controller chip is ready.
    fn transport_started(&mut self);

    fn transport_stopped(&mut self);

    /// Receive buffers were released; pending bytes can be offered again.
    fn rx_buffers_available(&mut self);

    /// Sends one control frame made of the concatenated segments.
    fn transmit(&mut self, segments: &[&[u8]]);

    fn init_result(&mut self, result: InitResult);

    fn stop_result(&mut self, result: StdResult);

    fn node_script_result(&mut self, result: NodeScriptResult, node: &N);

    fn route_report(&mut self, route: &R, info: RouteInfo);

    fn port_status(&mut self, status: PortStatus);

    fn resource_report(&mut self, report: ResourceReport);

    fn management_report(&mut self, report: ManagementReport, address: u16, node: Option<&N>);

    fn trace(&mut self, level: TraceLevel, module: &str, message: fmt::Arguments<'_>);
}

/// Network stack driven by the integration core.
///
/// Every method must return without blocking.
pub trait NetworkStack {
    /// Configuration applied by [`NetworkStack::init`].
    type Config: Clone;
    /// Route handle.
    type Route: Copy + fmt::Debug;
    /// Node handle.
    type Node: NodeDescriptor + Copy;

    /// Starts the stack. The outcome arrives through
    /// [`StackCallbacks::init_result`].
    ///
    /// # Errors
    ///
    /// Returns the stack's [`ReturnCode`] when the request is refused outright.
    fn init(
        &mut self,
        request: &InitRequest<'_, Self::Config>,
        callbacks: &mut dyn StackCallbacks<Self::Route, Self::Node>,
    ) -> Result<(), ReturnCode>;

    /// Stops the stack. The outcome arrives through
    /// [`StackCallbacks::stop_result`].
    ///
    /// # Errors
    ///
    /// Returns the stack's [`ReturnCode`] when the request is refused outright.
    fn stop(
        &mut self,
        callbacks: &mut dyn StackCallbacks<Self::Route, Self::Node>,
    ) -> Result<(), ReturnCode>;

    /// Activates or deactivates a route. Completes within the call.
    ///
    /// # Errors
    ///
    /// Returns the stack's [`ReturnCode`] when the request is refused outright.
    fn set_route_active(
        &mut self,
        route: Self::Route,
        active: bool,
        callbacks: &mut dyn StackCallbacks<Self::Route, Self::Node>,
    ) -> Result<(), ReturnCode>;

    /// Runs the script list of a node. The outcome arrives through
    /// [`StackCallbacks::node_script_result`].
    ///
    /// # Errors
    ///
    /// Returns the stack's [`ReturnCode`] when the request is refused outright.
    fn run_node_script(
        &mut self,
        node: Self::Node,
        callbacks: &mut dyn StackCallbacks<Self::Route, Self::Node>,
    ) -> Result<(), ReturnCode>;

    /// Runs the stack's own service tick.
    fn service(&mut self, callbacks: &mut dyn StackCallbacks<Self::Route, Self::Node>);

    /// Reports expiry of the application timer.
    fn report_timeout(&mut self, callbacks: &mut dyn StackCallbacks<Self::Route, Self::Node>);

    /// Offers bytes received from the transport.
    ///
    /// # Errors
    ///
    /// Returns [`RxRejected`] when no receive buffer is free. The caller keeps
    /// the bytes and offers them again later.
    fn receive(
        &mut self,
        bytes: &[u8],
        callbacks: &mut dyn StackCallbacks<Self::Route, Self::Node>,
    ) -> Result<(), RxRejected>;
}
