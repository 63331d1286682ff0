//! Outbound interface the owning host implements.
//!
//! The integration context owns its host, so every callback reaches the
//! right session without an opaque tag.

use core::{fmt, time::Duration};

use crate::stack::{ManagementReport, MostErrorMessage, NodeInfo};
use crate::telemetry::TelemetryInstant;

/// Application-timer value that cancels the outstanding timer.
pub const APP_TIMER_CANCEL: u16 = u16::MAX;

/// Severity attached to a human-readable message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageSeverity {
    Error,
    Warning,
    Info,
    Debug,
}

impl MessageSeverity {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            MessageSeverity::Error => "error",
            MessageSeverity::Warning => "warn",
            MessageSeverity::Info => "info",
            MessageSeverity::Debug => "debug",
        }
    }
}

impl fmt::Display for MessageSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Application timer request decoded from the stack's raw timeout value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerRequest {
    /// Replace any armed timer with one expiring after the duration.
    Arm(Duration),
    /// Cancel the armed timer.
    Cancel,
}

impl TimerRequest {
    #[must_use]
    pub fn from_raw(timeout_ms: u16) -> Self {
        if timeout_ms == APP_TIMER_CANCEL {
            TimerRequest::Cancel
        } else {
            TimerRequest::Arm(Duration::from_millis(u64::from(timeout_ms)))
        }
    }
}

/// Host event loop services used by the integration core.
///
/// All methods are called from the thread that drives the context and must
/// not call back into it.
pub trait IntegrationHost {
    /// Monotonic instant used to stamp telemetry.
    type Instant: TelemetryInstant;

    fn now(&self) -> Self::Instant;

    /// Wrapping millisecond tick handed to the network stack.
    fn tick_ms(&self) -> u16;

    /// Arms the single application timer, replacing any previous one. On
    /// expiry the host calls [`crate::integration::Ucsi::on_timer_expired`].
    fn arm_timer(&mut self, after: Duration);

    fn cancel_timer(&mut self);

    /// Schedules a zero-delay call of [`crate::integration::Ucsi::service`].
    fn request_service(&mut self);

    fn user_message(&mut self, severity: MessageSeverity, message: fmt::Arguments<'_>);

    /// Writes one control frame to the transport.
    fn send_bytes(&mut self, frame: &[u8]);

    /// The stack finished stopping. Resources tied to the previous
    /// configuration may be released.
    fn on_stopped(&mut self) {}

    fn on_management_report(
        &mut self,
        _report: ManagementReport,
        _address: u16,
        _node: Option<NodeInfo>,
    ) {
    }

    fn on_most_error(&mut self, _message: &MostErrorMessage<'_>) {}
}
