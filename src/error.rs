//! Errors produced while decoding SunSpec register data and Modbus TCP frames.
//!
//! The variants fall into three groups:
//!
//! * **Map authoring** (`MalformedMap`, `InvalidUnitTarget`, `DanglingScaleFactor`,
//!   `InvalidScaleFactor`): a bug in a static register map. Built-in maps are checked
//!   at start-up by [`crate::models::validate_builtin_maps`].
//! * **Wire** (`FrameTooShort` through `Exception`): the transport or the device sent
//!   something unexpected. The caller decides whether to reconnect and retry.
//! * **Decoding** (`OutOfRange`, `Unsupported`, `InvalidEncoding`, `InvalidEnumValue`):
//!   the fetched register window does not match the map.
use std::str::Utf8Error;

/// Represents all possible errors of the decoding and framing engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested octets are not covered by the register buffer.
    #[error(
        "Register {offset} (+{octets} octets) is outside of the buffer covering registers {base}..{end}"
    )]
    OutOfRange {
        offset: u32,
        octets: u32,
        base: u32,
        end: u32,
    },

    /// Stepped register slices are not supported.
    #[error("Register slices with a step of {0} are not supported")]
    Unsupported(usize),

    /// A text register did not contain valid UTF-8.
    #[error("Invalid UTF-8 text at register {offset}: {source}")]
    InvalidEncoding { offset: u32, source: Utf8Error },

    /// A status register contained a code outside of its table (strict mode only).
    #[error("Value {value} at register {offset} is not a known {table} code")]
    InvalidEnumValue {
        offset: u32,
        value: u16,
        table: &'static str,
    },

    /// The register map violates a structural rule.
    #[error("Malformed register map '{map}': {reason}")]
    MalformedMap { map: &'static str, reason: String },

    /// A unit was declared for a field that is neither an integer nor a quantity.
    #[error("Field '{0}' is not numeric and cannot carry a unit")]
    InvalidUnitTarget(&'static str),

    /// A `X_SF` field has no `X` field to scale.
    #[error("Scale factor '{0}' has no matching field")]
    DanglingScaleFactor(&'static str),

    /// A scale factor or its target is not an integer.
    #[error("Scale factor '{0}' or its target is not an integer")]
    InvalidScaleFactor(&'static str),

    /// Fewer octets than a Modbus TCP header plus function code.
    #[error("Frame too short: {0} octets, at least 8 required")]
    FrameTooShort(usize),

    /// The protocol identifier of the MBAP header is not zero.
    #[error("Protocol identifier {0:#06x} is not Modbus")]
    ProtocolMismatch(u16),

    /// The declared data length is below 2 or exceeds the received octets.
    #[error("Declared data length {declared} does not fit the {available} received octets")]
    DataLengthTooShort { declared: u16, available: usize },

    /// The response carries no payload at all.
    #[error("Response payload is empty")]
    EmptyPayload,

    /// The register byte count is odd.
    #[error("Register byte count {0} is odd")]
    OddByteCount(usize),

    /// The payload holds fewer register octets than its byte count declares.
    #[error("Register payload truncated: {declared} octets declared, {available} present")]
    TruncatedPayload { declared: usize, available: usize },

    /// The response does not echo the request's transaction identifier.
    #[error("Transaction id mismatch: sent {expected}, received {actual}")]
    TransactionMismatch { expected: u16, actual: u16 },

    /// The response comes from another unit than the one addressed.
    #[error("Unit id mismatch: sent {expected}, received {actual}")]
    UnitMismatch { expected: u8, actual: u8 },

    /// The response answers another function than the one requested.
    #[error("Function code mismatch: sent {expected:#04x}, received {actual:#04x}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    /// The device answered with a Modbus exception.
    #[error("Modbus exception {code:#04x} for function {function:#04x}")]
    Exception { function: u8, code: u8 },
}

/// The result type of the decoding and framing engine.
pub type Result<T> = std::result::Result<T, Error>;
