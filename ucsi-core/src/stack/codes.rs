//! Result and report codes exchanged with the network stack.
//!
//! Each enum mirrors a numeric code family of the stack API. `from_raw`
//! never fails: unknown values decode to an `Other` variant (or the closest
//! catch-all) so a newer stack cannot crash the integration.

use core::fmt;

/// Return code of a synchronous stack API call. Success is `Ok(())`, so only
/// the failure codes are represented.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReturnCode {
    /// At least one parameter is out of range.
    Param,
    /// Buffer overflow or service busy.
    BufferOverflow,
    NotAvailable,
    NotSupported,
    /// The requested information is not yet available.
    InvalidShadow,
    /// The value to be set is already set.
    AlreadySet,
    /// The controller chip is already performing the requested function.
    ApiLocked,
    NotInitialized,
    Other(u8),
}

impl ReturnCode {
    /// Decodes a raw return value. `0` means success and yields `None`.
    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => return None,
            0x01 => ReturnCode::Param,
            0x02 => ReturnCode::BufferOverflow,
            0x03 => ReturnCode::NotAvailable,
            0x04 => ReturnCode::NotSupported,
            0x05 => ReturnCode::InvalidShadow,
            0x06 => ReturnCode::AlreadySet,
            0x07 => ReturnCode::ApiLocked,
            0x08 => ReturnCode::NotInitialized,
            other => ReturnCode::Other(other),
        })
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            ReturnCode::Param => 0x01,
            ReturnCode::BufferOverflow => 0x02,
            ReturnCode::NotAvailable => 0x03,
            ReturnCode::NotSupported => 0x04,
            ReturnCode::InvalidShadow => 0x05,
            ReturnCode::AlreadySet => 0x06,
            ReturnCode::ApiLocked => 0x07,
            ReturnCode::NotInitialized => 0x08,
            ReturnCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnCode::Param => f.write_str("invalid parameter"),
            ReturnCode::BufferOverflow => f.write_str("buffer overflow"),
            ReturnCode::NotAvailable => f.write_str("not available"),
            ReturnCode::NotSupported => f.write_str("not supported"),
            ReturnCode::InvalidShadow => f.write_str("invalid shadow"),
            ReturnCode::AlreadySet => f.write_str("already set"),
            ReturnCode::ApiLocked => f.write_str("api locked"),
            ReturnCode::NotInitialized => f.write_str("not initialized"),
            ReturnCode::Other(code) => write!(f, "code 0x{code:02X}"),
        }
    }
}

/// Result of a stack initialization attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitResult {
    Success,
    /// No message buffer available.
    ErrBufferOverflow,
    ErrInicSync,
    ErrInicVersion,
    ErrInicSystem,
    /// Device attach failed on a configuration error.
    ErrDeviceAttachConfig,
    /// Device attach failed on a processing error.
    ErrDeviceAttachProcess,
    ErrNetConfig,
    ErrInternal,
    ErrTimeout,
    Other(u8),
}

impl InitResult {
    #[must_use]
    pub const fn from_raw(code: u8) -> Self {
        match code {
            0x00 => InitResult::Success,
            0x01 => InitResult::ErrBufferOverflow,
            0x02 => InitResult::ErrInicSync,
            0x03 => InitResult::ErrInicVersion,
            0x04 => InitResult::ErrInicSystem,
            0x05 => InitResult::ErrDeviceAttachConfig,
            0x06 => InitResult::ErrDeviceAttachProcess,
            0x07 => InitResult::ErrNetConfig,
            0x0A => InitResult::ErrInternal,
            0x0B => InitResult::ErrTimeout,
            other => InitResult::Other(other),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            InitResult::Success => 0x00,
            InitResult::ErrBufferOverflow => 0x01,
            InitResult::ErrInicSync => 0x02,
            InitResult::ErrInicVersion => 0x03,
            InitResult::ErrInicSystem => 0x04,
            InitResult::ErrDeviceAttachConfig => 0x05,
            InitResult::ErrDeviceAttachProcess => 0x06,
            InitResult::ErrNetConfig => 0x07,
            InitResult::ErrInternal => 0x0A,
            InitResult::ErrTimeout => 0x0B,
            InitResult::Other(code) => code,
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, InitResult::Success)
    }
}

/// Standard result attached to stop and other asynchronous operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StdResult {
    Success,
    /// MOST standard error reported by the controller chip.
    ErrMostStandard,
    ErrBusy,
    ErrProcessing,
    ErrConfiguration,
    ErrSystem,
    ErrTimeout,
    ErrTransmission,
    Other(u8),
}

impl StdResult {
    #[must_use]
    pub const fn from_raw(code: u8) -> Self {
        match code {
            0x00 => StdResult::Success,
            0x01 => StdResult::ErrMostStandard,
            0x02 => StdResult::ErrBusy,
            0x03 => StdResult::ErrProcessing,
            0x04 => StdResult::ErrConfiguration,
            0x05 => StdResult::ErrSystem,
            0x06 => StdResult::ErrTimeout,
            0x07 => StdResult::ErrTransmission,
            other => StdResult::Other(other),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            StdResult::Success => 0x00,
            StdResult::ErrMostStandard => 0x01,
            StdResult::ErrBusy => 0x02,
            StdResult::ErrProcessing => 0x03,
            StdResult::ErrConfiguration => 0x04,
            StdResult::ErrSystem => 0x05,
            StdResult::ErrTimeout => 0x06,
            StdResult::ErrTransmission => 0x07,
            StdResult::Other(code) => code,
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, StdResult::Success)
    }
}

/// Unrecoverable conditions the stack reports outside of any command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GeneralError {
    /// Control channel communication with the controller chip failed.
    Communication,
    /// The controller chip reported a fatal condition.
    Inic,
    Other(u8),
}

impl GeneralError {
    #[must_use]
    pub const fn from_raw(code: u8) -> Self {
        match code {
            0x01 => GeneralError::Communication,
            0x02 => GeneralError::Inic,
            other => GeneralError::Other(other),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            GeneralError::Communication => 0x01,
            GeneralError::Inic => 0x02,
            GeneralError::Other(code) => code,
        }
    }
}

/// Node availability report raised by the stack's node management.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManagementReport {
    /// A node answered that is not part of the configuration.
    IgnoredUnknown,
    /// A node reported an address already taken by another node.
    IgnoredDuplicate,
    Available,
    NotAvailable,
}

impl ManagementReport {
    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(ManagementReport::IgnoredUnknown),
            0x01 => Some(ManagementReport::IgnoredDuplicate),
            0x02 => Some(ManagementReport::Available),
            0x03 => Some(ManagementReport::NotAvailable),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            ManagementReport::IgnoredUnknown => 0x00,
            ManagementReport::IgnoredDuplicate => 0x01,
            ManagementReport::Available => 0x02,
            ManagementReport::NotAvailable => 0x03,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ManagementReport::IgnoredUnknown => "ignored-unknown",
            ManagementReport::IgnoredDuplicate => "ignored-duplicate",
            ManagementReport::Available => "available",
            ManagementReport::NotAvailable => "not-available",
        }
    }
}

impl fmt::Display for ManagementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of a node script run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeScriptResult {
    Success,
    Error,
}

/// Lifecycle event reported for a route.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteInfo {
    Built,
    Destroyed,
    Suspended,
    ProcessStop,
}

impl RouteInfo {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            RouteInfo::Built => "built",
            RouteInfo::Destroyed => "destroyed",
            RouteInfo::Suspended => "suspended",
            RouteInfo::ProcessStop => "process-stop",
        }
    }
}

/// Severity of a stack trace line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TraceLevel {
    Error,
    Info,
}

/// Network port status change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortStatus {
    pub port_id: u16,
    pub available: bool,
    pub free_bandwidth: u16,
}

/// Resource type named in a resource debug report.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResourceKind {
    NetworkSocket,
    MlbPort,
    MlbSocket,
    UsbPort,
    UsbSocket,
    StreamPort,
    StreamSocket,
    SyncConnection,
    Combiner,
    Splitter,
    AvpConnection,
    Other(u8),
}

impl ResourceKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ResourceKind::NetworkSocket => "network socket",
            ResourceKind::MlbPort => "MLB port",
            ResourceKind::MlbSocket => "MLB socket",
            ResourceKind::UsbPort => "USB port",
            ResourceKind::UsbSocket => "USB socket",
            ResourceKind::StreamPort => "streaming port",
            ResourceKind::StreamSocket => "streaming socket",
            ResourceKind::SyncConnection => "sync connection",
            ResourceKind::Combiner => "combiner",
            ResourceKind::Splitter => "splitter",
            ResourceKind::AvpConnection => "isoc-AVP connection",
            ResourceKind::Other(_) => "unknown resource",
        }
    }
}

/// State transition named in a resource debug report.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResourceState {
    Built,
    Destroyed,
    BuildFailed,
}

impl ResourceState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ResourceState::Built => "has been built",
            ResourceState::Destroyed => "has been destroyed",
            ResourceState::BuildFailed => "cannot be built",
        }
    }
}

/// Resource manager debug report.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResourceReport {
    pub node_address: u16,
    pub kind: ResourceKind,
    pub state: ResourceState,
}

/// Error message received from a network node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MostErrorMessage<'a> {
    pub source_address: u16,
    pub fblock: u8,
    pub instance: u8,
    pub function: u16,
    pub op_type: u8,
    pub payload: &'a [u8],
}
