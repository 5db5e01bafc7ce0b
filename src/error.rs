//! Error types.
//!
//! Two layers:
//!
//! - **Wire status** ([`ErrorCode`] + [`Reason`] in a [`Status`]) travels
//!   inside confirm and indication events between active objects.
//! - **Crate errors** ([`Error`]) are returned by construction-time code:
//!   configuration validation, ring-buffer sizing, dispatcher registration.
//!
//! Everything is `Copy` so a status can be stored in a context struct and
//! replayed into a later confirm without allocation.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::app::ports::PortError;

// ---------------------------------------------------------------------------
// Wire status
// ---------------------------------------------------------------------------

/// Error code carried by confirms and indications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    /// Catch-all for codes that do not fit any other category.
    Unspecified = 1,
    Timeout = 2,
    /// Request not valid in the receiver's current state.
    State = 3,
    HardwareFailure = 4,
    Overflow = 5,
}

impl ErrorCode {
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Success,
            2 => Self::Timeout,
            3 => Self::State,
            4 => Self::HardwareFailure,
            5 => Self::Overflow,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Unspecified => write!(f, "unspecified"),
            Self::Timeout => write!(f, "timeout"),
            Self::State => write!(f, "invalid state"),
            Self::HardwareFailure => write!(f, "hardware failure"),
            Self::Overflow => write!(f, "overflow"),
        }
    }
}

/// Free-form qualifier attached to an [`ErrorCode`].
pub type Reason = u16;

/// Well-known reason values.  Drivers may also put counts or driver ids here.
pub mod reason {
    use super::Reason;

    pub const NONE: Reason = 0;
    /// A START was cut short by a STOP.
    pub const ABORTED: Reason = 1;
    /// The receiver could not queue the request.
    pub const BUSY: Reason = 2;
    /// Request arrived while the receiver was already in the requested state.
    pub const REDUNDANT: Reason = 3;
}

/// `{error, reason}` pair attached to confirms and indications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Status {
    pub error: ErrorCode,
    pub reason: Reason,
}

impl Status {
    pub const SUCCESS: Self = Self::new(ErrorCode::Success, reason::NONE);

    pub const fn new(error: ErrorCode, reason: Reason) -> Self {
        Self { error, reason }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.error, ErrorCode::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (reason {})", self.error, self.reason)
    }
}

// ---------------------------------------------------------------------------
// Crate errors
// ---------------------------------------------------------------------------

/// Every fallible construction-time operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration is invalid.
    Config(&'static str),
    /// Ring-buffer capacity is not a power of two in the supported range.
    FifoCapacity(usize),
    /// An active object asked for more timers than its core can hold.
    TooManyTimers(&'static str),
    /// Dispatcher registration failed.
    Registration(&'static str),
    /// Direct post to an active object whose mailbox is full.
    MailboxFull(&'static str),
    /// No active object with that name is registered.
    UnknownActiveObject,
    /// A hardware port refused an operation.
    Port(PortError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::FifoCapacity(cap) => {
                write!(f, "fifo: capacity {cap} is not a supported power of two")
            }
            Self::TooManyTimers(ao) => write!(f, "{ao}: timer table full"),
            Self::Registration(msg) => write!(f, "dispatcher: {msg}"),
            Self::MailboxFull(ao) => write!(f, "{ao}: mailbox full"),
            Self::UnknownActiveObject => write!(f, "dispatcher: unknown active object"),
            Self::Port(e) => write!(f, "port: {e}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<PortError> for Error {
    fn from(e: PortError) -> Self {
        Self::Port(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_wire_values_are_stable() {
        assert_eq!(ErrorCode::Success as u8, 0);
        assert_eq!(ErrorCode::Overflow as u8, 5);
        for code in [
            ErrorCode::Success,
            ErrorCode::Unspecified,
            ErrorCode::Timeout,
            ErrorCode::State,
            ErrorCode::HardwareFailure,
            ErrorCode::Overflow,
        ] {
            assert_eq!(ErrorCode::from_u8(code as u8), code);
        }
        assert_eq!(ErrorCode::from_u8(200), ErrorCode::Unspecified);
    }

    #[test]
    fn status_success() {
        assert!(Status::SUCCESS.is_success());
        assert!(!Status::new(ErrorCode::Timeout, 1).is_success());
    }

    #[test]
    fn display_mentions_context() {
        let msg = Error::Config("phase empty").to_string();
        assert!(msg.contains("phase empty"));
        let msg = Status::new(ErrorCode::Overflow, 44).to_string();
        assert!(msg.contains("overflow") && msg.contains("44"));
    }
}
