//! Dedicated writer task for response frames.
//!
//! Every response goes through a single task that owns stdout, so a frame
//! is always written whole before the next one starts:
//!
//! ```text
//! Handler 1 ─┐
//! Handler 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► stdout
//! Handler N ─┘
//! ```
//!
//! Response writes are best effort. Serialization failures and I/O errors
//! are logged and the frame is dropped; neither is reported to the handler
//! and a partial frame is never sent.

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::MsgPackCodec;
use crate::error::{Result, TimodError};
use crate::ex::Ex;
use crate::protocol::{Header, Proto, CONNECTION_ID, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A frame ready to be written to stdout.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded header (8 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (empty for configuration replies).
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame; the header length is taken from `payload`.
    ///
    /// Fails with `PayloadTooLarge` if the length does not fit the 32-bit
    /// length field.
    #[inline]
    pub fn new(id: u16, tp: Proto, payload: Bytes) -> Result<Self> {
        let length = u32::try_from(payload.len()).map_err(|_| TimodError::PayloadTooLarge {
            size: u32::MAX,
            max: u32::MAX,
        })?;

        Ok(Self {
            header: Header::new(length, id, tp).encode(),
            payload,
        })
    }

    /// Create a frame with an empty payload.
    #[inline]
    pub fn empty(id: u16, tp: Proto) -> Self {
        Self {
            header: Header::new(0, id, tp).encode(),
            payload: Bytes::new(),
        }
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Largest payload the writer will frame.
    pub max_payload_size: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Handle for writing responses to the host.
///
/// Cheaply cloneable; every clone feeds the same writer task.
#[derive(Clone)]
pub struct ResponseWriter {
    /// Channel sender for frames.
    tx: mpsc::Sender<OutboundFrame>,
    /// Payloads above this size are refused.
    max_payload_size: u32,
}

impl ResponseWriter {
    /// Send `value` as a `ModuleRes` for request `id`.
    pub async fn write_response<T: Serialize + ?Sized>(&self, id: u16, value: &T) {
        match MsgPackCodec::encode(value) {
            Ok(data) => self.deliver(id, Proto::ModuleRes, Bytes::from(data)).await,
            Err(e) => tracing::error!("Error creating package for request {}: {}", id, e),
        }
    }

    /// Send pre-encoded bytes as a `ModuleRes` for request `id`.
    pub async fn write_raw(&self, id: u16, data: impl Into<Bytes>) {
        self.deliver(id, Proto::ModuleRes, data.into()).await
    }

    /// Send a `ModuleErr` with payload `[code, message]` for request `id`.
    pub async fn write_error(&self, id: u16, ex: Ex, message: &str) {
        match MsgPackCodec::encode(&(ex, message)) {
            Ok(data) => self.deliver(id, Proto::ModuleErr, Bytes::from(data)).await,
            Err(e) => tracing::error!("Error creating error package for request {}: {}", id, e),
        }
    }

    /// Tell the host the configuration was accepted.
    pub async fn write_conf_ok(&self) {
        self.deliver(CONNECTION_ID, Proto::ModuleConfOk, Bytes::new())
            .await
    }

    /// Tell the host the configuration was rejected.
    pub async fn write_conf_err(&self) {
        self.deliver(CONNECTION_ID, Proto::ModuleConfErr, Bytes::new())
            .await
    }

    /// Queue a frame, reporting failures to the caller.
    ///
    /// The `write_*` methods wrap this and log instead.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let size = frame.payload.len();
        if size > self.max_payload_size as usize {
            return Err(TimodError::PayloadTooLarge {
                size: u32::try_from(size).unwrap_or(u32::MAX),
                max: self.max_payload_size,
            });
        }

        self.tx
            .send(frame)
            .await
            .map_err(|_| TimodError::ConnectionClosed)
    }

    /// Returns `true` once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn deliver(&self, id: u16, tp: Proto, payload: Bytes) {
        let sent = match OutboundFrame::new(id, tp, payload) {
            Ok(frame) => self.send(frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            tracing::error!("Error writing {:?} package (id {}): {}", tp, id, e);
        }
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends once every [`ResponseWriter`] clone has been dropped and
/// the queue is drained.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (ResponseWriter, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);

    let handle = ResponseWriter {
        tx,
        max_payload_size: config.max_payload_size,
    };

    let task = tokio::spawn(writer_loop(rx, writer));

    (handle, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (ResponseWriter, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Receives frames and writes them one at a time.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            tracing::error!("Error writing to stdout: {}", e);
        }
    }
    tracing::debug!("Writer task finished");
}

async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.header).await?;
    if !frame.payload.is_empty() {
        writer.write_all(&frame.payload).await?;
    }
    writer.flush().await
}
