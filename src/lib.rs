//! # timod
//!
//! Building blocks for ThingsDB-style modules: child processes that talk to
//! their host over stdin/stdout using a small binary packet protocol.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`]): 8-byte little-endian header (length, id,
//!   type, checkbit) followed by an opaque payload.
//! - **Payloads** ([`codec`]): MessagePack.
//! - **Session** ([`session`]): reader task, ordered packet handoff,
//!   single writer task and signal-driven shutdown.
//! - **Dispatcher** ([`module`]): configuration gating and concurrent
//!   request handlers with reply-once contexts.
//!
//! Logs are written to stderr; stdout is reserved for packets.
//!
//! ## Example
//!
//! ```ignore
//! use timod::{Module, RequestContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     timod::logging::init();
//!
//!     let result = Module::builder("echo")
//!         .on_request(|text: String, ctx: RequestContext| async move {
//!             ctx.respond(&text).await?;
//!             Ok::<_, timod::BoxError>(())
//!         })
//!         .build()
//!         .run()
//!         .await;
//!
//!     std::process::exit(if result.is_ok() { 0 } else { 1 });
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod ex;
pub mod logging;
pub mod module;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod writer;

pub use config::SessionConfig;
pub use error::{Result, TimodError};
pub use ex::Ex;
pub use module::{BoxError, HandlerResult, Module, ModuleBuilder, RequestContext};
pub use protocol::{Buffer, Header, Packet, Proto};
pub use session::{Inbox, ModuleSession};
pub use shutdown::Shutdown;
pub use writer::ResponseWriter;
