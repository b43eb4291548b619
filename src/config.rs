//! Session configuration.
//!
//! Defaults suit a module talking to a local host over stdio. Every limit
//! can be changed with a builder-style setter or from the environment:
//!
//! | variable | field |
//! |---|---|
//! | `TIMOD_MAX_PAYLOAD_SIZE` | `max_payload_size` |
//! | `TIMOD_CHANNEL_CAPACITY` | `channel_capacity` |
//! | `TIMOD_READ_BUFFER_SIZE` | `read_buffer_size` |
//! | `TIMOD_WRITER_CAPACITY` | `writer_capacity` |

use std::str::FromStr;

use crate::error::{Result, TimodError};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};

/// Default capacity of the packet handoff channel.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// Default size of a single stdin read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for a [`ModuleSession`](crate::session::ModuleSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Module name, attached to every log line.
    pub name: String,
    /// Largest payload accepted in either direction.
    pub max_payload_size: u32,
    /// Packets buffered between the reader and the handler.
    pub channel_capacity: usize,
    /// Bytes requested per read from the input stream.
    pub read_buffer_size: usize,
    /// Frames buffered in front of the writer task.
    pub writer_capacity: usize,
}

impl SessionConfig {
    /// Default configuration for module `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            channel_capacity: DEFAULT_INBOX_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Defaults overridden by `TIMOD_*` environment variables.
    pub fn from_env(name: impl Into<String>) -> Self {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn from_lookup<F>(name: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(name);

        if let Some(val) = parse_var(&lookup, "TIMOD_MAX_PAYLOAD_SIZE") {
            config.max_payload_size = val;
        }
        if let Some(val) = parse_var(&lookup, "TIMOD_CHANNEL_CAPACITY") {
            config.channel_capacity = val;
        }
        if let Some(val) = parse_var(&lookup, "TIMOD_READ_BUFFER_SIZE") {
            config.read_buffer_size = val;
        }
        if let Some(val) = parse_var(&lookup, "TIMOD_WRITER_CAPACITY") {
            config.writer_capacity = val;
        }

        config
    }

    /// Set the maximum payload size.
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the packet channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the writer queue capacity.
    pub fn writer_capacity(mut self, capacity: usize) -> Self {
        self.writer_capacity = capacity;
        self
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(TimodError::Config("channel_capacity must be > 0".to_string()));
        }
        if self.writer_capacity == 0 {
            return Err(TimodError::Config("writer_capacity must be > 0".to_string()));
        }
        if self.read_buffer_size == 0 {
            return Err(TimodError::Config("read_buffer_size must be > 0".to_string()));
        }
        Ok(())
    }

    /// Writer settings derived from this configuration.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            channel_capacity: self.writer_capacity,
            max_payload_size: self.max_payload_size,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(val) => Some(val),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("demo");

        assert_eq!(config.name, "demo");
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(config.channel_capacity, DEFAULT_INBOX_CAPACITY);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SessionConfig::from_lookup(
            "demo",
            lookup(&[
                ("TIMOD_MAX_PAYLOAD_SIZE", "1024"),
                ("TIMOD_CHANNEL_CAPACITY", " 8 "),
                ("TIMOD_WRITER_CAPACITY", "16"),
            ]),
        );

        assert_eq!(config.max_payload_size, 1024);
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.writer_capacity, 16);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = SessionConfig::from_lookup(
            "demo",
            lookup(&[("TIMOD_MAX_PAYLOAD_SIZE", "lots"), ("TIMOD_READ_BUFFER_SIZE", "-1")]),
        );

        assert_eq!(config, SessionConfig::new("demo"));
    }

    #[test]
    fn test_builder_setters() {
        let config = SessionConfig::new("demo")
            .max_payload_size(10)
            .channel_capacity(2)
            .read_buffer_size(3)
            .writer_capacity(4);

        assert_eq!(config.max_payload_size, 10);
        assert_eq!(config.channel_capacity, 2);
        assert_eq!(config.read_buffer_size, 3);
        assert_eq!(config.writer_capacity, 4);

        let writer = config.writer_config();
        assert_eq!(writer.channel_capacity, 4);
        assert_eq!(writer.max_payload_size, 10);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let err = SessionConfig::new("demo").channel_capacity(0).validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));

        assert!(SessionConfig::new("demo").writer_capacity(0).validate().is_err());
        assert!(SessionConfig::new("demo").read_buffer_size(0).validate().is_err());
    }
}
