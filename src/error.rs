//! Error types for the Heatmiser Wi-Fi protocol library.
//!
//! Errors fall into three closed kinds:
//!
//! * [`TransportError`] — the TCP connection failed, timed out or dropped.
//!   Always recoverable at the device-cycle level.
//! * [`ProtocolError`] — the device answered, but the frame or DCB content
//!   is invalid (bad checksum, length mismatch, wrong access code, ...).
//!   Recoverable at the device-cycle level.
//! * [`ValidationError`] — the caller asked for something the device cannot
//!   do (writing a read-only field, wrong program day count, ...). This is
//!   a bug in the calling code and is never retried.

use std::time::Duration;

use crate::dcb::Model;

/// Connection-level failures talking to a thermostat.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        source: std::io::Error,
    },
}

/// The device answered, but not with anything we are prepared to trust.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("empty response from device")]
    EmptyResponse,

    #[error("response truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch { computed: u16, received: u16 },

    #[error("frame length mismatch: declared {declared} bytes, received {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unexpected response opcode {actual:#04x} (expected {expected:#04x})")]
    UnexpectedOpcode { expected: u8, actual: u8 },

    #[error("device rejected the access code")]
    WrongPin,

    #[error("response payload length mismatch: declared {declared} bytes, received {actual}")]
    PayloadLength { declared: usize, actual: usize },

    #[error("DCB length mismatch: declared {declared} bytes, got {actual}")]
    DcbLength { declared: usize, actual: usize },

    #[error("DCB too short: expected {expected} bytes, got {actual}")]
    DcbTruncated { expected: usize, actual: usize },

    #[error("unknown vendor code {0:#04x}")]
    UnknownVendor(u8),

    #[error("unknown model code {0:#04x}")]
    UnknownModel(u8),

    #[error("invalid {field} at DCB offset {offset}: value {value:#04x}")]
    InvalidField {
        field: &'static str,
        offset: usize,
        value: u8,
    },
}

/// Malformed caller input, surfaced immediately instead of retried.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("{field} is not supported by the {model} model")]
    NotApplicable { field: &'static str, model: Model },

    #[error("{field} is read-only")]
    ReadOnlyField { field: &'static str },

    #[error("unknown setting {0:?}")]
    UnknownField(String),

    #[error("program must have {expected} day(s) to match the active schedule mode, got {actual}")]
    ProgramDayCount { expected: usize, actual: usize },

    #[error("a program day may hold at most {max} entries, got {actual}")]
    TooManyEntries { max: usize, actual: usize },

    #[error("program entries must be ordered by time of day")]
    UnorderedEntries,

    #[error("{field} value {value} outside valid range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("access code must be a 4-digit number (0-9999), got {0}")]
    PinOutOfRange(u32),
}

/// Any error this library can produce.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Whether a polling loop may swallow this error and carry on with the
    /// next cycle. Validation errors indicate a caller bug and must not be
    /// suppressed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
