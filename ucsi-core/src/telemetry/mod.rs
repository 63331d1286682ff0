//! Bounded history of integration events.
//!
//! The recorder keeps the most recent records in a fixed ring so a host can
//! inspect what the command queue and the network stack did without any
//! allocation. Event kinds encode to compact numeric codes for transport
//! over diagnostics channels.

use core::{convert::TryFrom, fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::command::CommandKind;
use crate::integration::ProtocolViolation;
use crate::stack::{InitResult, ReturnCode};

/// Identifier assigned to each telemetry record.
pub type EventId = u32;

/// Number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryEventKind {
    CommandQueued(CommandKind),
    QueueFull(CommandKind),
    CommandDispatched(CommandKind),
    CommandCompleted(CommandKind),
    CommandRejected(CommandKind),
    InitRetry,
    InitRetryExhausted,
    ServiceTick,
    TimerArmed,
    TimerCancelled,
    TimerExpired,
    StackError,
    TransmitDropped,
    ProtocolViolation,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::CommandQueued(kind) => write!(f, "command-queued {kind}"),
            TelemetryEventKind::QueueFull(kind) => write!(f, "queue-full {kind}"),
            TelemetryEventKind::CommandDispatched(kind) => write!(f, "command-dispatched {kind}"),
            TelemetryEventKind::CommandCompleted(kind) => write!(f, "command-completed {kind}"),
            TelemetryEventKind::CommandRejected(kind) => write!(f, "command-rejected {kind}"),
            TelemetryEventKind::InitRetry => f.write_str("init-retry"),
            TelemetryEventKind::InitRetryExhausted => f.write_str("init-retry-exhausted"),
            TelemetryEventKind::ServiceTick => f.write_str("service-tick"),
            TelemetryEventKind::TimerArmed => f.write_str("timer-armed"),
            TelemetryEventKind::TimerCancelled => f.write_str("timer-cancelled"),
            TelemetryEventKind::TimerExpired => f.write_str("timer-expired"),
            TelemetryEventKind::StackError => f.write_str("stack-error"),
            TelemetryEventKind::TransmitDropped => f.write_str("transmit-dropped"),
            TelemetryEventKind::ProtocolViolation => f.write_str("protocol-violation"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const COMMAND_QUEUED_BASE: u16 = 0x0000;
    const QUEUE_FULL_BASE: u16 = 0x0004;
    const COMMAND_DISPATCHED_BASE: u16 = 0x0008;
    const COMMAND_COMPLETED_BASE: u16 = 0x000C;
    const COMMAND_REJECTED_BASE: u16 = 0x0010;
    const INIT_RETRY_CODE: u16 = 0x0020;
    const INIT_RETRY_EXHAUSTED_CODE: u16 = 0x0021;
    const SERVICE_TICK_CODE: u16 = 0x0022;
    const TIMER_ARMED_CODE: u16 = 0x0023;
    const TIMER_CANCELLED_CODE: u16 = 0x0024;
    const TIMER_EXPIRED_CODE: u16 = 0x0025;
    const STACK_ERROR_CODE: u16 = 0x0026;
    const TRANSMIT_DROPPED_CODE: u16 = 0x0027;
    const PROTOCOL_VIOLATION_CODE: u16 = 0x0028;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::CommandQueued(kind) => {
                Self::COMMAND_QUEUED_BASE + command_index(kind)
            }
            TelemetryEventKind::QueueFull(kind) => Self::QUEUE_FULL_BASE + command_index(kind),
            TelemetryEventKind::CommandDispatched(kind) => {
                Self::COMMAND_DISPATCHED_BASE + command_index(kind)
            }
            TelemetryEventKind::CommandCompleted(kind) => {
                Self::COMMAND_COMPLETED_BASE + command_index(kind)
            }
            TelemetryEventKind::CommandRejected(kind) => {
                Self::COMMAND_REJECTED_BASE + command_index(kind)
            }
            TelemetryEventKind::InitRetry => Self::INIT_RETRY_CODE,
            TelemetryEventKind::InitRetryExhausted => Self::INIT_RETRY_EXHAUSTED_CODE,
            TelemetryEventKind::ServiceTick => Self::SERVICE_TICK_CODE,
            TelemetryEventKind::TimerArmed => Self::TIMER_ARMED_CODE,
            TelemetryEventKind::TimerCancelled => Self::TIMER_CANCELLED_CODE,
            TelemetryEventKind::TimerExpired => Self::TIMER_EXPIRED_CODE,
            TelemetryEventKind::StackError => Self::STACK_ERROR_CODE,
            TelemetryEventKind::TransmitDropped => Self::TRANSMIT_DROPPED_CODE,
            TelemetryEventKind::ProtocolViolation => Self::PROTOCOL_VIOLATION_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant into a telemetry event, falling back to
    /// [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::INIT_RETRY_CODE => TelemetryEventKind::InitRetry,
            Self::INIT_RETRY_EXHAUSTED_CODE => TelemetryEventKind::InitRetryExhausted,
            Self::SERVICE_TICK_CODE => TelemetryEventKind::ServiceTick,
            Self::TIMER_ARMED_CODE => TelemetryEventKind::TimerArmed,
            Self::TIMER_CANCELLED_CODE => TelemetryEventKind::TimerCancelled,
            Self::TIMER_EXPIRED_CODE => TelemetryEventKind::TimerExpired,
            Self::STACK_ERROR_CODE => TelemetryEventKind::StackError,
            Self::TRANSMIT_DROPPED_CODE => TelemetryEventKind::TransmitDropped,
            Self::PROTOCOL_VIOLATION_CODE => TelemetryEventKind::ProtocolViolation,
            value if value < Self::COMMAND_REJECTED_BASE + 4 => {
                let family = value / 4;
                let Some(kind) = command_from_index(value % 4) else {
                    return TelemetryEventKind::Custom(value);
                };
                match family {
                    0 => TelemetryEventKind::CommandQueued(kind),
                    1 => TelemetryEventKind::QueueFull(kind),
                    2 => TelemetryEventKind::CommandDispatched(kind),
                    3 => TelemetryEventKind::CommandCompleted(kind),
                    _ => TelemetryEventKind::CommandRejected(kind),
                }
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Queue state around a command transition.
    Command(CommandTelemetry),
    /// Init attempt bookkeeping.
    Retry(RetryTelemetry),
    /// Raw timeout requested by the stack.
    Timer(TimerTelemetry),
    /// Error code reported by the stack.
    Stack(StackErrorTelemetry),
    /// Size of a frame that could not be sent.
    Transmit(TransmitTelemetry),
    /// Mismatched completion callback.
    Violation(ProtocolViolation),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Queue command metadata payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandTelemetry {
    pub queue_depth: u8,
    /// Time the command spent in flight, recorded on completion.
    pub in_flight_for: Option<Duration>,
}

impl CommandTelemetry {
    #[must_use]
    pub const fn new(queue_depth: u8, in_flight_for: Option<Duration>) -> Self {
        Self {
            queue_depth,
            in_flight_for,
        }
    }
}

/// Init retry payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryTelemetry {
    /// Consecutive failed attempts so far.
    pub failures: u8,
    /// Configured retry budget, `None` when unbounded.
    pub budget: Option<u8>,
    pub result: InitResult,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimerTelemetry {
    pub timeout_ms: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StackErrorTelemetry {
    /// Synchronous API call refused.
    Return(ReturnCode),
    /// General error raised outside any command.
    General(u8),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransmitTelemetry {
    pub frame_len: u16,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    dispatched_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            dispatched_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Counts retained records matching `event`.
    #[must_use]
    pub fn count(&self, event: TelemetryEventKind) -> usize {
        self.ring
            .oldest_ordered()
            .filter(|record| record.event == event)
            .count()
    }

    /// Records a command accepted into the queue.
    pub fn record_command_queued(
        &mut self,
        kind: CommandKind,
        queue_depth: usize,
        timestamp: TInstant,
    ) -> EventId {
        let payload =
            TelemetryPayload::Command(CommandTelemetry::new(truncate_depth(queue_depth), None));
        self.record(TelemetryEventKind::CommandQueued(kind), payload, timestamp)
    }

    /// Records a command refused because the queue is full.
    pub fn record_queue_full(
        &mut self,
        kind: CommandKind,
        queue_depth: usize,
        timestamp: TInstant,
    ) -> EventId {
        let payload =
            TelemetryPayload::Command(CommandTelemetry::new(truncate_depth(queue_depth), None));
        self.record(TelemetryEventKind::QueueFull(kind), payload, timestamp)
    }

    /// Records the moment a command is handed to the stack.
    pub fn record_command_dispatched(
        &mut self,
        kind: CommandKind,
        queue_depth: usize,
        timestamp: TInstant,
    ) -> EventId {
        self.dispatched_at = Some(timestamp);
        let payload =
            TelemetryPayload::Command(CommandTelemetry::new(truncate_depth(queue_depth), None));
        self.record(
            TelemetryEventKind::CommandDispatched(kind),
            payload,
            timestamp,
        )
    }

    /// Records the completion of the in-flight command together with the time
    /// it spent in flight.
    pub fn record_command_completed(
        &mut self,
        kind: CommandKind,
        queue_depth: usize,
        timestamp: TInstant,
    ) -> EventId {
        let in_flight_for = self
            .dispatched_at
            .take()
            .map(|start| timestamp.saturating_duration_since(start));
        let payload = TelemetryPayload::Command(CommandTelemetry::new(
            truncate_depth(queue_depth),
            in_flight_for,
        ));
        self.record(
            TelemetryEventKind::CommandCompleted(kind),
            payload,
            timestamp,
        )
    }

    /// Records a command the stack refused at dispatch time.
    pub fn record_command_rejected(
        &mut self,
        kind: CommandKind,
        code: ReturnCode,
        timestamp: TInstant,
    ) -> EventId {
        self.dispatched_at = None;
        self.record(
            TelemetryEventKind::CommandRejected(kind),
            TelemetryPayload::Stack(StackErrorTelemetry::Return(code)),
            timestamp,
        )
    }

    /// Records a failed init and whether another attempt was queued.
    pub fn record_init_failure(
        &mut self,
        details: RetryTelemetry,
        retrying: bool,
        timestamp: TInstant,
    ) -> EventId {
        let event = if retrying {
            TelemetryEventKind::InitRetry
        } else {
            TelemetryEventKind::InitRetryExhausted
        };
        self.record(event, TelemetryPayload::Retry(details), timestamp)
    }

    /// Records an application timer request.
    pub fn record_timer_request(
        &mut self,
        timeout_ms: u16,
        cancel: bool,
        timestamp: TInstant,
    ) -> EventId {
        let event = if cancel {
            TelemetryEventKind::TimerCancelled
        } else {
            TelemetryEventKind::TimerArmed
        };
        self.record(
            event,
            TelemetryPayload::Timer(TimerTelemetry { timeout_ms }),
            timestamp,
        )
    }

    /// Records a transmit frame that exceeded the frame limit.
    pub fn record_transmit_dropped(
        &mut self,
        frame_len: usize,
        timestamp: TInstant,
    ) -> EventId {
        let frame_len = u16::try_from(frame_len).unwrap_or(u16::MAX);
        self.record(
            TelemetryEventKind::TransmitDropped,
            TelemetryPayload::Transmit(TransmitTelemetry { frame_len }),
            timestamp,
        )
    }

    /// Records a completion callback that did not match the in-flight command.
    pub fn record_violation(
        &mut self,
        violation: ProtocolViolation,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::ProtocolViolation,
            TelemetryPayload::Violation(violation),
            timestamp,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn truncate_depth(depth: usize) -> u8 {
    u8::try_from(depth).unwrap_or(u8::MAX)
}

const fn command_index(kind: CommandKind) -> u16 {
    match kind {
        CommandKind::Init => 0,
        CommandKind::Stop => 1,
        CommandKind::SetRoute => 2,
        CommandKind::RunNodeScript => 3,
    }
}

fn command_from_index(index: u16) -> Option<CommandKind> {
    match index {
        0 => Some(CommandKind::Init),
        1 => Some(CommandKind::Stop),
        2 => Some(CommandKind::SetRoute),
        3 => Some(CommandKind::RunNodeScript),
        _ => None,
    }
}
