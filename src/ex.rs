//! Error codes understood by the host.
//!
//! A `ModuleErr` payload is the msgpack array `[code, message]`. The host
//! maps `code` onto its own exception types, so modules should pick the
//! closest built-in code or a custom one in the `-127..=-100` range.

use std::fmt;

use serde::{Serialize, Serializer};

/// Error code sent with a `ModuleErr` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ex {
    /// Operation was cancelled.
    Cancelled,
    /// Operation is not valid in the current context.
    Operation,
    /// Wrong number of arguments.
    NumArguments,
    /// Argument has the wrong type.
    TypeError,
    /// Argument has the right type but an invalid value.
    ValueError,
    /// Integer overflow.
    Overflow,
    /// Division or modulo by zero.
    ZeroDiv,
    /// A quota was exceeded.
    MaxQuota,
    /// Authentication failed.
    AuthError,
    /// Not allowed.
    Forbidden,
    /// Requested item does not exist.
    LookupError,
    /// Unable to handle the request data.
    BadData,
    /// Syntax error.
    SyntaxError,
    /// Node is not able to handle the request.
    NodeError,
    /// Assertion failed.
    AssertError,
    /// Result is too large.
    ResultTooLarge,
    /// Request timed out.
    RequestTimeout,
    /// Request was cancelled.
    RequestCancel,
    /// Write error.
    WriteUv,
    /// Memory allocation failed.
    Memory,
    /// Internal error.
    Internal,
    /// Module-defined code, expected in `-127..=-100`.
    Custom(i8),
}

impl Ex {
    /// Lowest code reserved for module-defined errors.
    pub const CUSTOM_MIN: i8 = -127;
    /// Highest code reserved for module-defined errors.
    pub const CUSTOM_MAX: i8 = -100;

    /// Numeric code sent on the wire.
    pub fn code(self) -> i8 {
        match self {
            Ex::Cancelled => -64,
            Ex::Operation => -63,
            Ex::NumArguments => -62,
            Ex::TypeError => -61,
            Ex::ValueError => -60,
            Ex::Overflow => -59,
            Ex::ZeroDiv => -58,
            Ex::MaxQuota => -57,
            Ex::AuthError => -56,
            Ex::Forbidden => -55,
            Ex::LookupError => -54,
            Ex::BadData => -53,
            Ex::SyntaxError => -52,
            Ex::NodeError => -51,
            Ex::AssertError => -50,
            Ex::ResultTooLarge => -6,
            Ex::RequestTimeout => -5,
            Ex::RequestCancel => -4,
            Ex::WriteUv => -3,
            Ex::Memory => -2,
            Ex::Internal => -1,
            Ex::Custom(code) => code,
        }
    }

    /// Map a wire code back to an `Ex`; unknown codes become `Custom`.
    pub fn from_code(code: i8) -> Self {
        match code {
            -64 => Ex::Cancelled,
            -63 => Ex::Operation,
            -62 => Ex::NumArguments,
            -61 => Ex::TypeError,
            -60 => Ex::ValueError,
            -59 => Ex::Overflow,
            -58 => Ex::ZeroDiv,
            -57 => Ex::MaxQuota,
            -56 => Ex::AuthError,
            -55 => Ex::Forbidden,
            -54 => Ex::LookupError,
            -53 => Ex::BadData,
            -52 => Ex::SyntaxError,
            -51 => Ex::NodeError,
            -50 => Ex::AssertError,
            -6 => Ex::ResultTooLarge,
            -5 => Ex::RequestTimeout,
            -4 => Ex::RequestCancel,
            -3 => Ex::WriteUv,
            -2 => Ex::Memory,
            -1 => Ex::Internal,
            other => Ex::Custom(other),
        }
    }

    /// Returns `true` for codes in the module-defined range.
    pub fn is_custom(self) -> bool {
        (Self::CUSTOM_MIN..=Self::CUSTOM_MAX).contains(&self.code())
    }
}

impl fmt::Display for Ex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ex::Custom(code) => write!(f, "Custom({})", code),
            other => write!(f, "{:?}({})", other, other.code()),
        }
    }
}

impl Serialize for Ex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}
