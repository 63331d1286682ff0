//! Status surface for the `status` console command.
//!
//! [`StatusSnapshot`] is a copy of the integration state taken by
//! [`crate::Ucsi::status_snapshot`]. [`StatusFormatter`] keeps the textual
//! rendering consistent across front-ends.

use core::fmt;

use heapless::Vec;

use crate::command::CommandKind;
use crate::integration::ProtocolViolation;

/// Queued command kinds captured per snapshot.
pub const STATUS_QUEUE_PREVIEW: usize = 8;

/// Snapshot of the integration state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub initialized: bool,
    pub transport_attached: bool,
    pub service_pending: bool,
    pub in_flight: Option<CommandKind>,
    /// Queued kinds, oldest first, including the in-flight command.
    pub queued: Vec<CommandKind, STATUS_QUEUE_PREVIEW>,
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub init_failures: u8,
    pub init_dispatches: u32,
    pub init_retry_budget: Option<u8>,
    pub violation: Option<ProtocolViolation>,
}

/// Renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the stack line (e.g. `stack initialized=yes transport=attached in-flight=none`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_stack_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "stack initialized={} transport={} in-flight=",
            yes_no(self.snapshot.initialized),
            if self.snapshot.transport_attached {
                "attached"
            } else {
                "detached"
            }
        )?;
        match self.snapshot.in_flight {
            Some(kind) => write!(writer, "{kind}"),
            None => writer.write_str("none"),
        }
    }

    /// Writes the queue line (e.g. `queue depth=2/4 service-pending=no pending=[stop, init]`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_queue_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "queue depth={}/{} service-pending={} pending=[",
            self.snapshot.queue_len,
            self.snapshot.queue_capacity,
            yes_no(self.snapshot.service_pending)
        )?;
        for (index, kind) in self.snapshot.queued.iter().enumerate() {
            if index > 0 {
                writer.write_str(", ")?;
            }
            write!(writer, "{kind}")?;
        }
        if self.snapshot.queue_len > self.snapshot.queued.len() {
            writer.write_str(", ...")?;
        }
        writer.write_char(']')
    }

    /// Writes the init line (e.g. `init failures=1 dispatches=2 retry-budget=3`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_init_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "init failures={} dispatches={} retry-budget=",
            self.snapshot.init_failures, self.snapshot.init_dispatches
        )?;
        match self.snapshot.init_retry_budget {
            Some(budget) => write!(writer, "{budget}"),
            None => writer.write_str("unbounded"),
        }
    }

    /// Writes the protocol line (`protocol ok` or the latched violation).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_protocol_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        match self.snapshot.violation {
            Some(violation) => write!(writer, "protocol violation: {violation}"),
            None => writer.write_str("protocol ok"),
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
