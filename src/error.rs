//! Unified error types for the Porton firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every subsystem
//! can convert into, keeping the top-level bootstrap's error handling uniform.
//! All variants are `Copy` so they can be cheaply passed between tasks
//! without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Gate fault codes (wire-visible)
// ---------------------------------------------------------------------------

/// Fault code carried in every status/telemetry frame.
///
/// The numeric values are part of the broker payload contract and must not
/// be renumbered — existing dashboards key on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ErrorCode {
    /// No fault.
    #[default]
    Ok = 0,
    /// Opening motion exceeded its deadline before the open limit asserted.
    TimeoutOpen = 1,
    /// Closing motion exceeded its deadline before the closed limit asserted.
    TimeoutClose = 2,
    /// Both limit switches asserted simultaneously (physically impossible).
    LsInconsistent = 3,
    /// FSM dispatch hit an out-of-range state index.
    StateGuardrail = 99,
}

impl ErrorCode {
    /// Wire representation of this code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::TimeoutOpen => write!(f, "open timeout"),
            Self::TimeoutClose => write!(f, "close timeout"),
            Self::LsInconsistent => write!(f, "limit switches inconsistent"),
            Self::StateGuardrail => write!(f, "state guardrail"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Persistent storage (NVS) failed.
    Storage(StorageError),
    /// A network subsystem failed.
    Net(NetError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Net(e) => write!(f, "net: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the NVS backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Network errors (Wi-Fi, broker, portal)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    WifiInitFailed,
    WifiConnectFailed,
    /// SSID invalid (must be 1-32 printable ASCII bytes).
    InvalidSsid,
    /// Password invalid (must be 8-64 bytes for WPA2, or empty for open).
    InvalidPassword,
    BrokerStartFailed,
    BrokerPublishFailed,
    HttpServerFailed,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiInitFailed => write!(f, "WiFi stack init failed"),
            Self::WifiConnectFailed => write!(f, "WiFi connection failed"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(
                f,
                "password invalid (must be 8-64 bytes for WPA2, or empty for open)"
            ),
            Self::BrokerStartFailed => write!(f, "broker client start failed"),
            Self::BrokerPublishFailed => write!(f, "broker publish failed"),
            Self::HttpServerFailed => write!(f, "HTTP server start failed"),
        }
    }
}

impl From<NetError> for Error {
    fn from(e: NetError) -> Self {
        Self::Net(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
