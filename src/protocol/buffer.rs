//! Buffer for accumulating partial reads from stdin.
//!
//! Uses `bytes::BytesMut` so emitted payloads are split off the accumulator
//! without copying. Bytes belonging to emitted packets are dropped from the
//! front; at most one partial frame is ever held.
//!
//! # Example
//!
//! ```
//! use timod::protocol::{pack_bin, Buffer, Proto};
//!
//! let bytes = pack_bin(1, Proto::ModuleReq, b"hello");
//! let mut buffer = Buffer::new();
//!
//! // Data arrives in arbitrary chunks
//! assert!(buffer.push(&bytes[..4]).unwrap().is_empty());
//! let packets = buffer.push(&bytes[4..]).unwrap();
//!
//! assert_eq!(packets.len(), 1);
//! assert_eq!(packets[0].payload(), b"hello");
//! ```

use bytes::BytesMut;

use super::package::Packet;
use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::Result;

/// Initial accumulator capacity.
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Accumulates incoming bytes and extracts complete packets.
///
/// A framing error (bad checkbit, unknown type, oversized payload) leaves
/// the stream desynchronized; callers must stop feeding the buffer once it
/// has reported one.
#[derive(Debug)]
pub struct Buffer {
    /// Accumulated bytes not yet emitted.
    buffer: BytesMut,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl Buffer {
    /// Create a new buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 64MB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new buffer with a custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_payload_size,
        }
    }

    /// Push a chunk and extract every packet it completes, in arrival order.
    ///
    /// Returns an empty vector while the buffered frame is still partial.
    ///
    /// # Errors
    ///
    /// Returns a framing error if a header fails its checkbit, names an
    /// unknown type, or announces more than `max_payload_size` bytes.
    ///
    /// Packets completed before a corrupt header are lost with the error;
    /// use [`extend`](Buffer::extend) and [`next_packet`](Buffer::next_packet)
    /// to hand each packet on as soon as it is extracted.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.extend(data);

        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet()? {
            packets.push(packet);
        }

        Ok(packets)
    }

    /// Append a chunk without extracting packets.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract a single packet from the front of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Nothing is consumed
    /// unless a whole frame is available.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        let header = match Header::decode(&self.buffer)? {
            Some(header) => header,
            None => return Ok(None),
        };

        header.validate(self.max_payload_size)?;

        if self.buffer.len() < header.frame_size() {
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(header.frame_size());
        let payload = frame.split_off(HEADER_SIZE).freeze();

        Ok(Some(Packet::new(header, payload)))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard any buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Configured payload limit.
    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimodError;
    use crate::protocol::{pack_bin, pack_empty, Proto};

    #[test]
    fn test_single_complete_packet() {
        let mut buffer = Buffer::new();
        let bytes = pack_bin(42, Proto::ModuleReq, b"hello");

        let packets = buffer.push(&bytes).unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].id(), 42);
        assert_eq!(packets[0].tp(), Proto::ModuleReq);
        assert_eq!(packets[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_two_packets_in_one_push() {
        let mut buffer = Buffer::new();

        let mut combined = pack_bin(1, Proto::ModuleConf, b"conf");
        combined.extend_from_slice(&pack_bin(2, Proto::ModuleReq, b"request"));

        let packets = buffer.push(&combined).unwrap();

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].id(), 1);
        assert_eq!(packets[0].tp(), Proto::ModuleConf);
        assert_eq!(packets[1].id(), 2);
        assert_eq!(packets[1].payload(), b"request");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = Buffer::new();
        let bytes = pack_bin(42, Proto::ModuleReq, b"test");

        let packets = buffer.push(&bytes[..5]).unwrap();
        assert!(packets.is_empty());
        assert_eq!(buffer.len(), 5);

        let packets = buffer.push(&bytes[5..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].id(), 42);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = Buffer::new();
        let payload = b"this is a longer payload that will be fragmented";
        let bytes = pack_bin(42, Proto::ModuleReq, payload);

        let partial_len = HEADER_SIZE + 10;
        let packets = buffer.push(&bytes[..partial_len]).unwrap();
        assert!(packets.is_empty());
        // the partial frame, header included, stays buffered
        assert_eq!(buffer.len(), partial_len);

        let packets = buffer.push(&bytes[partial_len..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload(), payload);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_trailing_partial_frame_retained() {
        let mut buffer = Buffer::new();
        let first = pack_bin(1, Proto::ModuleReq, b"one");
        let second = pack_bin(2, Proto::ModuleReq, b"two");

        let mut chunk = first.clone();
        chunk.extend_from_slice(&second[..3]);

        let packets = buffer.push(&chunk).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(buffer.len(), 3);

        let packets = buffer.push(&second[3..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].id(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = Buffer::new();

        let packets = buffer.push(&pack_empty(0, Proto::ModuleConfOk)).unwrap();

        assert_eq!(packets.len(), 1);
        assert!(packets[0].payload().is_empty());
        assert_eq!(packets[0].length(), 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = Buffer::new();
        let bytes = pack_bin(9, Proto::ModuleReq, &[0xAB; 100]);

        let mut packets = Vec::new();
        for byte in &bytes {
            packets.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload().len(), 100);
    }

    #[test]
    fn test_large_payload() {
        let mut buffer = Buffer::new();
        let payload = vec![0xAB; 1024 * 1024];
        let bytes = pack_bin(42, Proto::ModuleReq, &payload);

        let packets = buffer.push(&bytes).unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload().len(), 1024 * 1024);
        assert!(packets[0].payload().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_max_payload_validation() {
        let mut buffer = Buffer::with_max_payload(100);

        // header alone claims 1000 bytes
        let header = Header::new(1000, 42, Proto::ModuleReq).encode();
        let result = buffer.push(&header);

        assert!(matches!(
            result,
            Err(TimodError::PayloadTooLarge { size: 1000, max: 100 })
        ));
    }

    #[test]
    fn test_invalid_checkbit_is_error() {
        let mut buffer = Buffer::new();
        let mut bytes = pack_bin(1, Proto::ModuleReq, b"abc");
        bytes[7] ^= 0x01;

        let err = buffer.push(&bytes).unwrap_err();
        assert!(err.is_framing());
        assert!(matches!(err, TimodError::InvalidCheckbit { .. }));
    }

    #[test]
    fn test_corruption_after_valid_packet() {
        let mut buffer = Buffer::new();
        let mut bytes = pack_bin(1, Proto::ModuleReq, b"ok");
        let mut bad = pack_bin(2, Proto::ModuleReq, b"bad");
        bad[6] = 0x00;
        bytes.extend_from_slice(&bad);

        buffer.extend(&bytes);
        let first = buffer.next_packet().unwrap().unwrap();
        assert_eq!(first.payload(), b"ok");
        assert!(buffer.next_packet().unwrap_err().is_framing());
    }

    #[test]
    fn test_next_packet_waits_for_full_frame() {
        let mut buffer = Buffer::new();
        let bytes = pack_bin(3, Proto::ModuleReq, b"abc");

        buffer.extend(&bytes[..HEADER_SIZE + 2]);
        assert!(buffer.next_packet().unwrap().is_none());

        buffer.extend(&bytes[HEADER_SIZE + 2..]);
        assert_eq!(buffer.next_packet().unwrap().unwrap().id(), 3);
        assert!(buffer.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let mut buffer = Buffer::new();
        buffer.push(&[1, 2, 3]).unwrap();
        assert_eq!(buffer.len(), 3);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.max_payload_size(), DEFAULT_MAX_PAYLOAD_SIZE);
    }
}
