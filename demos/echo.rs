//! Echo module - simple configuration and request example.
//!
//! This demo shows how to:
//! - accept (or reject) the configuration sent by the host
//! - decode typed requests and answer with a response or an error code
//! - log to stderr while stdout carries packets
//!
//! Requests are maps like `{"op": "upper", "text": "hello"}`. Run with
//! `TIMOD_LOG=debug` to see every packet.

use serde::{Deserialize, Serialize};
use timod::{BoxError, Ex, Module, RequestContext};

/// Configuration sent by the host.
#[derive(Deserialize, Debug)]
struct Conf {
    #[serde(default)]
    prefix: String,
}

#[derive(Deserialize, Debug)]
struct EchoRequest {
    op: String,
    text: String,
}

#[derive(Serialize, Debug)]
struct EchoResponse {
    echo: String,
}

#[tokio::main]
async fn main() {
    timod::logging::init();

    let prefix = std::sync::Arc::new(std::sync::OnceLock::new());
    let conf_prefix = prefix.clone();

    let result = Module::builder("echo")
        .on_conf(move |conf: Conf| {
            let prefix = conf_prefix.clone();
            async move {
                if conf.prefix.len() > 32 {
                    return Err("prefix must be at most 32 characters");
                }
                // the first accepted prefix sticks
                let _ = prefix.set(conf.prefix);
                Ok(())
            }
        })
        .on_request(move |req: EchoRequest, ctx: RequestContext| {
            let prefix = prefix.get().cloned().unwrap_or_default();
            async move {
                let text = match req.op.as_str() {
                    "echo" => req.text,
                    "upper" => req.text.to_uppercase(),
                    op => {
                        ctx.error(Ex::ValueError, &format!("unknown op `{op}`")).await;
                        return Ok(());
                    }
                };
                ctx.respond(&EchoResponse {
                    echo: format!("{prefix}{text}"),
                })
                .await?;
                Ok::<_, BoxError>(())
            }
        })
        .build()
        .run()
        .await;

    // stdin reads may still be parked on a blocking thread
    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("Module stopped with error: {}", e);
            1
        }
    };
    std::process::exit(code);
}
