//! Integration tests for timod.
//!
//! These tests drive the public API the way a host would: raw bytes in,
//! raw bytes out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use timod::codec::MsgPackCodec;
use timod::protocol::{pack, pack_bin, pack_empty, Buffer, Header, Packet, Proto, HEADER_SIZE};
use timod::{BoxError, Ex, Module, ModuleSession, RequestContext, SessionConfig, TimodError};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

#[test]
fn test_conf_ok_bytes() {
    assert_eq!(
        pack_empty(0, Proto::ModuleConfOk),
        [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x41, 0xBE]
    );
}

#[test]
fn test_request_bytes() {
    let bytes = pack_bin(7, Proto::ModuleReq, &[1, 2, 3]);

    assert_eq!(
        bytes,
        vec![0x03, 0x00, 0x00, 0x00, 0x07, 0x00, 0x50, 0xAF, 1, 2, 3]
    );
}

#[test]
fn test_two_packets_in_one_chunk() {
    let mut chunk = pack_bin(1, Proto::ModuleReq, b"first");
    chunk.extend(pack_empty(2, Proto::ModuleConf));

    let packets = Buffer::new().push(&chunk).unwrap();

    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].id(), 1);
    assert_eq!(packets[0].payload(), b"first");
    assert_eq!(packets[1].id(), 2);
    assert_eq!(packets[1].tp(), Proto::ModuleConf);
    assert!(packets[1].payload().is_empty());
}

#[test]
fn test_corrupted_type_pair_never_decodes() {
    let good = pack_bin(9, Proto::ModuleReq, b"x");

    for byte in [6, 7] {
        for bit in 0..8 {
            let mut bad = good.clone();
            bad[byte] ^= 1 << bit;

            assert!(Header::decode(&bad).is_err(), "byte {byte} bit {bit}");
            let err = Buffer::new().push(&bad).unwrap_err();
            assert!(err.is_framing());
        }
    }
}

#[test]
fn test_msgpack_payload_through_buffer() {
    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        id: i32,
        message: String,
    }

    let payload = Payload {
        id: 42,
        message: "Hello, world!".to_string(),
    };
    let bytes = pack(12345, Proto::ModuleRes, &payload).unwrap();

    let mut buffer = Buffer::new();
    let mut packets = Vec::new();
    for chunk in bytes.chunks(3) {
        packets.extend(buffer.push(chunk).unwrap());
    }

    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].id(), 12345);
    assert_eq!(packets[0].length() as usize, bytes.len() - HEADER_SIZE);
    assert_eq!(packets[0].decode::<Payload>().unwrap(), payload);
    assert!(buffer.is_empty());
}

#[test]
fn test_error_payload_shape() {
    let bytes = MsgPackCodec::encode(&(Ex::ZeroDiv, "division by zero")).unwrap();
    let (code, msg): (i8, String) = MsgPackCodec::decode(&bytes).unwrap();

    assert_eq!(code, -58);
    assert_eq!(msg, "division by zero");
}

#[derive(Deserialize)]
struct Conf {
    factor: i64,
}

#[derive(Deserialize)]
struct MulRequest {
    value: i64,
}

fn multiplier() -> Module {
    let factor = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(1));
    let conf_factor = factor.clone();

    Module::builder("multiplier")
        .config(SessionConfig::new("multiplier"))
        .on_conf(move |conf: Conf| {
            let factor = conf_factor.clone();
            async move {
                if conf.factor == 0 {
                    return Err("factor must not be zero");
                }
                factor.store(conf.factor, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        })
        .on_request(move |req: MulRequest, ctx: RequestContext| {
            let factor = factor.load(std::sync::atomic::Ordering::SeqCst);
            async move {
                match req.value.checked_mul(factor) {
                    Some(v) => ctx.respond(&v).await?,
                    None => ctx.error(Ex::Overflow, "integer overflow").await,
                }
                Ok::<_, BoxError>(())
            }
        })
        .build()
}

fn map<T: Serialize>(value: &T) -> Vec<u8> {
    MsgPackCodec::encode(value).unwrap()
}

#[tokio::test]
async fn test_module_round_trip_over_duplex() {
    #[derive(Serialize)]
    struct ConfOut {
        factor: i64,
    }
    #[derive(Serialize)]
    struct ReqOut {
        value: i64,
    }

    let (module_in, mut host_out) = duplex(4096);
    let (module_out, mut host_in) = duplex(4096);

    let module = multiplier();
    let session = ModuleSession::new(module_in, module_out, module.config().clone());
    let running = tokio::spawn(module.run_with(session));

    let mut input = pack_bin(0, Proto::ModuleConf, &map(&ConfOut { factor: 3 }));
    input.extend(pack_bin(1, Proto::ModuleReq, &map(&ReqOut { value: 14 })));
    input.extend(pack_bin(2, Proto::ModuleReq, &map(&ReqOut { value: i64::MAX })));

    // deliver byte by byte to exercise reassembly
    for byte in input {
        host_out.write_all(&[byte]).await.unwrap();
    }
    drop(host_out);

    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("module did not stop")
        .unwrap()
        .unwrap();

    let mut out = Vec::new();
    host_in.read_to_end(&mut out).await.unwrap();
    let packets: Vec<Packet> = Buffer::new().push(&out).unwrap();

    assert_eq!(packets.len(), 3);
    assert_eq!(packets[0].tp(), Proto::ModuleConfOk);

    let ok = packets.iter().find(|p| p.id() == 1).unwrap();
    assert_eq!(ok.tp(), Proto::ModuleRes);
    assert_eq!(ok.decode::<i64>().unwrap(), 42);

    let overflow = packets.iter().find(|p| p.id() == 2).unwrap();
    assert_eq!(overflow.tp(), Proto::ModuleErr);
    let (code, msg): (i8, String) = overflow.decode().unwrap();
    assert_eq!(code, Ex::Overflow.code());
    assert_eq!(msg, "integer overflow");
}

#[tokio::test]
async fn test_module_stops_on_shutdown() {
    let (module_in, _host_out) = duplex(4096);
    let (module_out, _host_in) = duplex(4096);

    let module = multiplier();
    let session = ModuleSession::new(module_in, module_out, module.config().clone());
    let shutdown = session.shutdown();
    let running = tokio::spawn(module.run_with(session));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!running.is_finished());

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("module did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_module_fails_on_corrupt_stream() {
    let (module_in, mut host_out) = duplex(4096);
    let (module_out, mut host_in) = duplex(4096);

    let module = multiplier();
    let session = ModuleSession::new(module_in, module_out, module.config().clone());
    let running = tokio::spawn(module.run_with(session));

    let mut bad = pack_empty(0, Proto::ModuleConf).to_vec();
    bad[7] ^= 0x10;
    host_out.write_all(&bad).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("module did not stop")
        .unwrap();
    assert!(matches!(result, Err(TimodError::InvalidCheckbit { .. })));

    let mut out = Vec::new();
    host_in.read_to_end(&mut out).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_oversized_frame_is_rejected() {
    let (module_in, mut host_out) = duplex(4096);
    let (module_out, _host_in) = duplex(4096);

    let module = multiplier();
    let config = SessionConfig::new("multiplier").max_payload_size(8);
    let session = ModuleSession::new(module_in, module_out, config);
    let running = tokio::spawn(module.run_with(session));

    host_out
        .write_all(&pack_bin(1, Proto::ModuleReq, &[0u8; 9]))
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("module did not stop")
        .unwrap();
    assert!(matches!(
        result,
        Err(TimodError::PayloadTooLarge { size: 9, max: 8 })
    ));
}
