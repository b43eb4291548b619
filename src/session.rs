//! Module session: reader task, packet handoff and shutdown.
//!
//! [`ModuleSession::run`] wires the pieces together:
//!
//! ```text
//! stdin ─► reader task (Buffer) ─► mpsc ─► Inbox ─► handler ─► ResponseWriter ─► writer task ─► stdout
//!                                                     ▲
//! SIGHUP/SIGINT/SIGTERM/SIGQUIT ─► Shutdown ──────────┘
//! ```
//!
//! The handler owns the [`Inbox`]. It should return once the inbox is
//! closed (input ended or broke) or once [`Shutdown`] fires, whichever
//! comes first. The session waits for it without a timeout.
//!
//! # Example
//!
//! ```ignore
//! use timod::{ModuleSession, Proto, SessionConfig};
//!
//! ModuleSession::stdio(SessionConfig::from_env("demo"))
//!     .run(|mut inbox, writer, shutdown| async move {
//!         loop {
//!             let packet = tokio::select! {
//!                 _ = shutdown.cancelled() => break,
//!                 packet = inbox.recv() => match packet {
//!                     Some(packet) => packet,
//!                     None => break,
//!                 },
//!             };
//!             match packet.tp() {
//!                 Proto::ModuleConf => writer.write_conf_ok().await,
//!                 Proto::ModuleReq => writer.write_raw(packet.id(), packet.payload_bytes()).await,
//!                 _ => {}
//!             }
//!         }
//!     })
//!     .await?;
//! ```

use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, Stdin, Stdout};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::SessionConfig;
use crate::error::{Result, TimodError};
use crate::protocol::{Buffer, Packet};
use crate::shutdown::{forward_signal, Shutdown};
use crate::writer::{spawn_writer_task, ResponseWriter};

/// Receiving end of the packet handoff.
///
/// Packets arrive in exactly the order they were framed on the input
/// stream. `recv` returns `None` once the reader has stopped and every
/// buffered packet has been delivered.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<Packet>,
}

impl Inbox {
    /// Wait for the next packet.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Take the next packet if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.rx.try_recv().ok()
    }
}

/// One module lifecycle over an input and output stream.
pub struct ModuleSession<R, W> {
    reader: R,
    writer: W,
    config: SessionConfig,
    shutdown: Shutdown,
    listen_signals: bool,
}

impl ModuleSession<Stdin, Stdout> {
    /// Session over the process's stdin/stdout, stopped by termination signals.
    pub fn stdio(config: SessionConfig) -> Self {
        ModuleSession::new(tokio::io::stdin(), tokio::io::stdout(), config).listen_signals(true)
    }
}

impl<R, W> ModuleSession<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Session over arbitrary streams. Signals are not watched.
    pub fn new(reader: R, writer: W, config: SessionConfig) -> Self {
        Self {
            reader,
            writer,
            config,
            shutdown: Shutdown::new(),
            listen_signals: false,
        }
    }

    /// Whether termination signals trigger shutdown.
    pub fn listen_signals(mut self, enabled: bool) -> Self {
        self.listen_signals = enabled;
        self
    }

    /// Handle to this session's shutdown flag.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the session until `handler` returns.
    ///
    /// Returns the reader's outcome: `Ok` when input ended or shutdown was
    /// requested, `Err` when the input stream broke (framing or I/O error).
    pub async fn run<F, Fut>(self, handler: F) -> Result<()>
    where
        F: FnOnce(Inbox, ResponseWriter, Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;
        let span = tracing::info_span!("module", name = %self.config.name);
        self.run_inner(handler).instrument(span).await
    }

    async fn run_inner<F, Fut>(self, handler: F) -> Result<()>
    where
        F: FnOnce(Inbox, ResponseWriter, Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Self {
            reader,
            writer,
            config,
            shutdown,
            listen_signals,
        } = self;

        let signal_task = listen_signals.then(|| {
            tokio::spawn(forward_signal(shutdown.clone()).in_current_span())
        });

        let (response_writer, writer_task) = spawn_writer_task(writer, config.writer_config());

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let reader_task = tokio::spawn(
            read_loop(
                reader,
                tx,
                Buffer::with_max_payload(config.max_payload_size),
                config.read_buffer_size,
                shutdown.clone(),
            )
            .in_current_span(),
        );

        tracing::info!("Module started");

        let handler_task = tokio::spawn(
            handler(Inbox { rx }, response_writer, shutdown.clone()).in_current_span(),
        );
        if let Err(e) = handler_task.await {
            tracing::error!("Module handler panicked: {}", e);
        }

        // the handler is done; release the reader and the signal listener
        shutdown.trigger();

        let outcome = match reader_task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Reader task failed: {}", e);
                Err(TimodError::ConnectionClosed)
            }
        };

        if let Some(task) = signal_task {
            let _ = task.await;
        }

        // wait until queued responses are flushed
        let _ = writer_task.await;

        tracing::info!("Module stopped");
        outcome
    }
}

/// Read the input stream and hand every complete packet to the inbox.
///
/// Dropping `tx` on return closes the inbox. A broken stream does not
/// trigger `shutdown`: packets framed before the break stay queued and the
/// handler still receives each of them.
async fn read_loop<R>(
    mut reader: R,
    tx: mpsc::Sender<Packet>,
    mut buffer: Buffer,
    read_buffer_size: usize,
    shutdown: Shutdown,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; read_buffer_size];

    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = reader.read(&mut chunk) => read,
        };

        let n = match read {
            Ok(0) => {
                tracing::info!("Input stream closed by host");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Error reading from stdin: {}", e);
                return Err(TimodError::Io(e));
            }
        };

        buffer.extend(&chunk[..n]);

        loop {
            let packet = match buffer.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Corrupt package on input stream: {}", e);
                    return Err(e);
                }
            };

            tracing::debug!(
                "Received {:?} package (id {}, {} bytes)",
                packet.tp(),
                packet.id(),
                packet.length()
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                sent = tx.send(packet) => {
                    if sent.is_err() {
                        tracing::debug!("Inbox dropped, stop reading");
                        return Ok(());
                    }
                }
            }
        }
    }
}
