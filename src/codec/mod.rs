//! Codec module - payload serialization.
//!
//! The host encodes every structured payload as MessagePack. The framing
//! layer never looks inside payloads; handlers decode them with
//! [`MsgPackCodec`] (or [`Packet::decode`](crate::protocol::Packet::decode)).
//!
//! # Example
//!
//! ```
//! use timod::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
