//! MsgPack codec using `rmp-serde`.
//!
//! Structs are written with `to_vec_named` so they arrive at the host as
//! maps keyed by field name. `to_vec` would write positional arrays, which
//! the host's query language sees as lists instead of things.
//!
//! # Example
//!
//! ```
//! use timod::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Config {
//!     host: String,
//!     port: u16,
//! }
//!
//! let conf = Config { host: "localhost".to_string(), port: 9200 };
//! let encoded = MsgPackCodec::encode(&conf).unwrap();
//! let decoded: Config = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, conf);
//! ```

use crate::error::Result;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns `TimodError::MsgPackEncode` if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns `TimodError::MsgPackDecode` if the bytes do not match `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
