//! Protocol module - wire format, packet types and stream reassembly.
//!
//! This module implements the binary protocol spoken over stdio:
//! - 8-byte header encoding/decoding with checkbit
//! - Packet type codes and their lifecycle rules
//! - Buffer for turning chunked reads into packets

mod buffer;
mod package;
mod proto;
mod wire_format;

pub use buffer::Buffer;
pub use package::{pack, pack_bin, pack_empty, Packet};
pub use proto::{Direction, Phase, Proto};
pub use wire_format::{
    decode_header, encode_header, Header, CONNECTION_ID, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
