//! Error types for timod.

use thiserror::Error;

/// Main error type for all timod operations.
#[derive(Debug, Error)]
pub enum TimodError {
    /// I/O error on stdin/stdout.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Check byte does not match `0xFF ^ type`.
    #[error("invalid checkbit: type {tp:#04x}, check {check:#04x}")]
    InvalidCheckbit {
        /// Type byte as read from the header.
        tp: u8,
        /// Check byte as read from the header.
        check: u8,
    },

    /// Header announces a payload larger than the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Announced payload length.
        size: u32,
        /// Configured maximum.
        max: u32,
    },

    /// Invalid session configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The writer task or the packet channel is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

impl TimodError {
    /// Returns `true` for errors that leave the inbound stream desynchronized.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            TimodError::InvalidCheckbit { .. }
                | TimodError::PayloadTooLarge { .. }
        )
    }
}

/// Result type alias using TimodError.
pub type Result<T> = std::result::Result<T, TimodError>;
