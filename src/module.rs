//! Request dispatcher built on top of [`ModuleSession`].
//!
//! Most modules only need two callbacks: one that accepts the configuration
//! sent by the host and one that answers requests. [`Module`] wires them to
//! the protocol:
//!
//! - `ModuleConf` runs the conf handler and answers `ModuleConfOk` or
//!   `ModuleConfErr` exactly once.
//! - `ModuleReq` decodes the payload, spawns the request handler and gives
//!   it a [`RequestContext`] for the reply. Requests run concurrently, so
//!   replies may leave in a different order than requests came in.
//! - Requests before a successful configuration are refused with
//!   [`Ex::Operation`].
//!
//! # Example
//!
//! ```ignore
//! use timod::{Ex, Module, RequestContext};
//!
//! #[derive(serde::Deserialize)]
//! struct Conf { greeting: String }
//!
//! Module::builder("greeter")
//!     .on_conf(|conf: Conf| async move {
//!         if conf.greeting.is_empty() {
//!             return Err("greeting must not be empty");
//!         }
//!         Ok(())
//!     })
//!     .on_request(|name: String, ctx: RequestContext| async move {
//!         if name.is_empty() {
//!             ctx.error(Ex::ValueError, "name must not be empty").await;
//!             return Ok(());
//!         }
//!         ctx.respond(&format!("hello {name}")).await?;
//!         Ok::<_, timod::BoxError>(())
//!     })
//!     .build()
//!     .run()
//!     .await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::codec::MsgPackCodec;
use crate::config::SessionConfig;
use crate::error::{Result, TimodError};
use crate::ex::Ex;
use crate::protocol::{Packet, Proto};
use crate::session::{Inbox, ModuleSession};
use crate::shutdown::Shutdown;
use crate::writer::{OutboundFrame, ResponseWriter};

/// Default number of request handlers allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 256;

/// Error type request handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for request handlers.
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handles the configuration sent with `ModuleConf`.
pub trait ConfHandler: Send + Sync + 'static {
    /// Apply the raw configuration payload. `Err` carries the rejection reason.
    fn call(&self, data: &[u8]) -> BoxFuture<'static, std::result::Result<(), String>>;
}

/// Handles `ModuleReq` packets.
pub trait RequestHandler: Send + Sync + 'static {
    /// Decode `data` and start handling the request.
    ///
    /// Decoding happens before the returned future is created, so a bad
    /// payload is reported here instead of from the future.
    fn call(&self, data: &[u8], ctx: RequestContext) -> Result<BoxFuture<'static, HandlerResult>>;
}

/// Conf handler that deserializes the payload first.
pub struct TypedConfHandler<F, C, E, Fut>
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    C: DeserializeOwned + Send + 'static,
    E: Display + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(C) -> Fut>,
}

impl<F, C, E, Fut> TypedConfHandler<F, C, E, Fut>
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    C: DeserializeOwned + Send + 'static,
    E: Display + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
{
    /// Wrap a typed conf handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, C, E, Fut> ConfHandler for TypedConfHandler<F, C, E, Fut>
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    C: DeserializeOwned + Send + 'static,
    E: Display + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
{
    fn call(&self, data: &[u8]) -> BoxFuture<'static, std::result::Result<(), String>> {
        let conf: C = match MsgPackCodec::decode(data) {
            Ok(conf) => conf,
            Err(e) => return Box::pin(async move { Err(e.to_string()) }),
        };

        let fut = (self.handler)(conf);
        Box::pin(async move { fut.await.map_err(|e| e.to_string()) })
    }
}

/// Request handler that deserializes the payload first.
pub struct TypedRequestHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedRequestHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Wrap a typed request handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> RequestHandler for TypedRequestHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, data: &[u8], ctx: RequestContext) -> Result<BoxFuture<'static, HandlerResult>> {
        let request: T = MsgPackCodec::decode(data)?;
        Ok(Box::pin((self.handler)(request, ctx)))
    }
}

/// Reply handle for a single request.
///
/// Clones share the same reply slot: whichever clone replies first wins,
/// later replies are dropped with a warning.
#[derive(Clone)]
pub struct RequestContext {
    id: u16,
    writer: ResponseWriter,
    shutdown: Shutdown,
    replied: Arc<AtomicBool>,
}

impl RequestContext {
    /// Context for request `id`.
    pub fn new(id: u16, writer: ResponseWriter, shutdown: Shutdown) -> Self {
        Self {
            id,
            writer,
            shutdown,
            replied: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Correlation id of the request.
    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Session shutdown flag, for handlers that run long.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Returns `true` once a reply has been sent or attempted.
    pub fn has_replied(&self) -> bool {
        self.replied.load(Ordering::Acquire)
    }

    /// Reply with `value` encoded as msgpack.
    ///
    /// If `value` cannot be encoded the host receives [`Ex::Internal`]
    /// instead, and the encode error is returned.
    pub async fn respond<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        if !self.claim() {
            return Ok(());
        }

        match MsgPackCodec::encode(value) {
            Ok(data) => self.send_response(Bytes::from(data)).await,
            Err(e) => {
                self.writer
                    .write_error(self.id, Ex::Internal, &format!("failed to pack response: {e}"))
                    .await;
                Err(e)
            }
        }
    }

    /// Reply with pre-encoded msgpack bytes.
    pub async fn respond_raw(&self, data: impl Into<Bytes>) -> Result<()> {
        if !self.claim() {
            return Ok(());
        }
        self.send_response(data.into()).await
    }

    /// Reply with a `ModuleErr`.
    pub async fn error(&self, ex: Ex, message: &str) {
        if self.claim() {
            self.writer.write_error(self.id, ex, message).await;
        }
    }

    fn claim(&self) -> bool {
        let first = !self.replied.swap(true, Ordering::AcqRel);
        if !first {
            tracing::warn!("Request {} already answered, dropping reply", self.id);
        }
        first
    }

    async fn send_response(&self, payload: Bytes) -> Result<()> {
        let result = match OutboundFrame::new(self.id, Proto::ModuleRes, payload) {
            Ok(frame) => self.writer.send(frame).await,
            Err(e) => Err(e),
        };

        if let Err(TimodError::PayloadTooLarge { size, max }) = &result {
            let message = format!("response of {size} bytes exceeds the limit of {max} bytes");
            self.writer
                .write_error(self.id, Ex::ResultTooLarge, &message)
                .await;
        }
        result
    }
}

/// Builder for [`Module`].
pub struct ModuleBuilder {
    config: SessionConfig,
    conf: Option<Box<dyn ConfHandler>>,
    request: Option<Box<dyn RequestHandler>>,
    max_concurrent_requests: usize,
}

impl ModuleBuilder {
    /// Builder for module `name`, configured from the environment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: SessionConfig::from_env(name),
            conf: None,
            request: None,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }

    /// Replace the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the largest payload accepted in either direction.
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the packet channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set how many requests may be handled at once.
    ///
    /// Requests beyond the limit are refused with [`Ex::MaxQuota`].
    /// Default: 256
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit;
        self
    }

    /// Register the configuration handler.
    ///
    /// Without one, every configuration is accepted as is.
    pub fn on_conf<F, C, E, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        C: DeserializeOwned + Send + 'static,
        E: Display + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    {
        self.conf = Some(Box::new(TypedConfHandler::new(handler)));
        self
    }

    /// Register the request handler.
    pub fn on_request<F, T, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.request = Some(Box::new(TypedRequestHandler::new(handler)));
        self
    }

    /// Finish the builder.
    pub fn build(self) -> Module {
        Module {
            config: self.config,
            dispatcher: Dispatcher {
                conf: self.conf,
                request: self.request,
                permits: Arc::new(Semaphore::new(self.max_concurrent_requests)),
            },
        }
    }
}

/// A module ready to serve the host.
pub struct Module {
    config: SessionConfig,
    dispatcher: Dispatcher,
}

impl Module {
    /// Start building module `name`.
    pub fn builder(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder::new(name)
    }

    /// Session configuration used by [`Module::run`].
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Serve the host over stdin/stdout until input ends or a signal arrives.
    pub async fn run(self) -> Result<()> {
        let session = ModuleSession::stdio(self.config.clone());
        self.run_with(session).await
    }

    /// Serve over an already built session. The session's own
    /// configuration applies.
    pub async fn run_with<R, W>(self, session: ModuleSession<R, W>) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let dispatcher = self.dispatcher;
        session
            .run(move |inbox, writer, shutdown| dispatcher.serve(inbox, writer, shutdown))
            .await
    }
}

struct Dispatcher {
    conf: Option<Box<dyn ConfHandler>>,
    request: Option<Box<dyn RequestHandler>>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    async fn serve(self, mut inbox: Inbox, writer: ResponseWriter, shutdown: Shutdown) {
        let mut configured = false;
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Request task failed: {}", e);
                    }
                }
                packet = inbox.recv() => match packet {
                    Some(packet) => {
                        self.dispatch(packet, &mut configured, &writer, &shutdown, &mut tasks)
                            .await
                    }
                    None => break,
                },
            }
        }

        // let in-flight requests answer before the writer is released
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Request task failed: {}", e);
            }
        }
    }

    async fn dispatch(
        &self,
        packet: Packet,
        configured: &mut bool,
        writer: &ResponseWriter,
        shutdown: &Shutdown,
        tasks: &mut JoinSet<()>,
    ) {
        match packet.tp() {
            Proto::ModuleConf => {
                *configured = self.configure(&packet).await;
                if *configured {
                    writer.write_conf_ok().await;
                } else {
                    writer.write_conf_err().await;
                }
            }
            Proto::ModuleReq => {
                let id = packet.id();
                if !*configured {
                    writer
                        .write_error(id, Ex::Operation, "module is not configured")
                        .await;
                    return;
                }
                self.spawn_request(packet, writer, shutdown, tasks).await;
                tracing::debug!("Dispatched request {}", id);
            }
            tp => {
                tracing::warn!("Ignoring unexpected {:?} package (id {})", tp, packet.id());
            }
        }
    }

    async fn configure(&self, packet: &Packet) -> bool {
        let Some(handler) = &self.conf else {
            return true;
        };

        match handler.call(packet.payload()).await {
            Ok(()) => {
                tracing::info!("Module configured");
                true
            }
            Err(reason) => {
                tracing::error!("Configuration rejected: {}", reason);
                false
            }
        }
    }

    async fn spawn_request(
        &self,
        packet: Packet,
        writer: &ResponseWriter,
        shutdown: &Shutdown,
        tasks: &mut JoinSet<()>,
    ) {
        let id = packet.id();

        let Some(handler) = &self.request else {
            writer
                .write_error(id, Ex::Operation, "module does not handle requests")
                .await;
            return;
        };

        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!("Handler capacity reached, refusing request {}", id);
                writer
                    .write_error(id, Ex::MaxQuota, "too many concurrent requests")
                    .await;
                return;
            }
        };

        let ctx = RequestContext::new(id, writer.clone(), shutdown.clone());
        let fut = match handler.call(packet.payload(), ctx.clone()) {
            Ok(fut) => fut,
            Err(e) => {
                tracing::warn!("Failed to unpack request {}: {}", id, e);
                ctx.error(Ex::BadData, &format!("failed to unpack request: {e}"))
                    .await;
                return;
            }
        };

        tasks.spawn(async move {
            let _permit = permit;

            // a panicking handler still gets an answer sent for it
            let result = match tokio::spawn(fut).await {
                Ok(result) => result,
                Err(e) => Err(format!("request handler failed: {e}").into()),
            };

            match result {
                Ok(()) if !ctx.has_replied() => {
                    tracing::warn!("Request {} finished without a reply", id);
                }
                Ok(()) => {}
                Err(e) if !ctx.has_replied() => {
                    tracing::error!("Handler error for request {}: {}", id, e);
                    ctx.error(Ex::Internal, &e.to_string()).await;
                }
                Err(e) => {
                    tracing::error!("Handler error for request {} after reply: {}", id, e);
                }
            }
        });
    }
}
