//! Wire format encoding and decoding.
//!
//! Implements the 8-byte header format:
//! ```text
//! ┌──────────┬──────────┬────────┬──────────┐
//! │ Length   │ Id       │ Type   │ Checkbit │
//! │ 4 bytes  │ 2 bytes  │ 1 byte │ 1 byte   │
//! │ uint32 LE│ uint16 LE│        │ 0xFF^type│
//! └──────────┴──────────┴────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Little Endian.

use super::proto::Proto;
use crate::error::{Result, TimodError};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size (64 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Id used for connection-level packets such as configuration replies.
pub const CONNECTION_ID: u16 = 0;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length in bytes.
    pub length: u32,
    /// Correlation id (0 = connection level).
    pub id: u16,
    /// Packet type.
    pub tp: Proto,
}

impl Header {
    /// Create a new header.
    pub fn new(length: u32, id: u16, tp: Proto) -> Self {
        Self { length, id, tp }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use timod::protocol::{Header, Proto};
    ///
    /// let bytes = Header::new(3, 7, Proto::ModuleReq).encode();
    /// assert_eq!(bytes, [3, 0, 0, 0, 7, 0, 0x50, 0xAF]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..6].copy_from_slice(&self.id.to_le_bytes());
        buf[6] = self.tp.code();
        buf[7] = self.tp.checkbit();
    }

    /// Decode header from bytes.
    ///
    /// Returns `Ok(None)` if fewer than 8 bytes are available. A check byte
    /// that is not `0xFF ^ type` is an error. Unknown type codes decode to
    /// [`Proto::Unknown`].
    ///
    /// # Example
    ///
    /// ```
    /// use timod::protocol::{Header, Proto};
    ///
    /// let header = Header::decode(&[0, 0, 0, 0, 0, 0, 0x41, 0xBE]).unwrap().unwrap();
    /// assert_eq!(header.tp, Proto::ModuleConfOk);
    /// assert_eq!(header.length, 0);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let tp = buf[6];
        let check = buf[7];
        if check != 0xFF ^ tp {
            return Err(TimodError::InvalidCheckbit { tp, check });
        }

        Ok(Some(Self {
            length: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            id: u16::from_le_bytes([buf[4], buf[5]]),
            tp: Proto::from(tp),
        }))
    }

    /// Reject headers announcing more than `max_payload_size` bytes.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.length > max_payload_size {
            return Err(TimodError::PayloadTooLarge {
                size: self.length,
                max: max_payload_size,
            });
        }
        Ok(())
    }

    /// Total frame size (header + payload).
    #[inline]
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}

/// Encode a header from its parts.
#[inline]
pub fn encode_header(length: u32, id: u16, tp: Proto) -> [u8; HEADER_SIZE] {
    Header::new(length, id, tp).encode()
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Result<Option<Header>> {
    Header::decode(buf)
}
