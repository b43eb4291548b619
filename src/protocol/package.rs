//! Packet struct and outbound packet builders.
//!
//! A [`Packet`] is one complete frame: header plus payload. Inbound packets
//! come out of the [`Buffer`](super::Buffer); outbound bytes are produced by
//! [`pack_bin`], [`pack`] and [`pack_empty`].
//!
//! # Example
//!
//! ```
//! use timod::protocol::{pack_bin, Buffer, Proto};
//!
//! let bytes = pack_bin(7, Proto::ModuleReq, &[1, 2, 3]);
//! let packets = Buffer::new().push(&bytes).unwrap();
//!
//! assert_eq!(packets[0].id(), 7);
//! assert_eq!(packets[0].payload(), &[1, 2, 3]);
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::proto::Proto;
use super::wire_format::{Header, HEADER_SIZE};
use crate::codec::MsgPackCodec;
use crate::error::Result;

/// A complete protocol packet. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: Header,
    payload: Bytes,
}

impl Packet {
    /// Create a packet from a header and its payload.
    ///
    /// The header length must match the payload length.
    pub fn new(header: Header, payload: Bytes) -> Self {
        debug_assert_eq!(header.length as usize, payload.len());
        Self { header, payload }
    }

    /// Decoded header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Payload length as announced by the header.
    #[inline]
    pub fn length(&self) -> u32 {
        self.header.length
    }

    /// Correlation id.
    #[inline]
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Packet type.
    #[inline]
    pub fn tp(&self) -> Proto {
        self.header.tp
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Cheap clone of the payload, for forwarding without a copy.
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Decode the payload with the msgpack codec.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.payload)
    }

    /// Encode this packet back to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        pack_bin(self.header.id, self.header.tp, &self.payload)
    }
}

/// Build a frame around an already encoded payload.
///
/// Callers must keep payloads below `u32::MAX` bytes; the
/// [`ResponseWriter`](crate::writer::ResponseWriter) refuses anything larger
/// than its configured maximum before getting here.
pub fn pack_bin(id: u16, tp: Proto, data: &[u8]) -> Vec<u8> {
    debug_assert!(data.len() <= u32::MAX as usize);
    let length = data.len() as u32;
    let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
    buf.extend_from_slice(&Header::new(length, id, tp).encode());
    buf.extend_from_slice(data);
    buf
}

/// Serialize `value` with msgpack and frame it.
///
/// Nothing is produced when serialization fails.
pub fn pack<T: Serialize + ?Sized>(id: u16, tp: Proto, value: &T) -> Result<Vec<u8>> {
    let data = MsgPackCodec::encode(value)?;
    Ok(pack_bin(id, tp, &data))
}

/// Build a bare header with an empty payload.
pub fn pack_empty(id: u16, tp: Proto) -> [u8; HEADER_SIZE] {
    Header::new(0, id, tp).encode()
}
