//! Minimal ROUTER-side peer for integration tests.
//!
//! Accepts one connection, completes the ZMTP handshake, records every
//! message and answers through a caller-supplied handler.

#![allow(dead_code)]

use std::path::Path;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;
use usdwire::protocol::{
    encode_command, encode_message, Command, FrameDecoder, Greeting, Inbound, Metadata,
    PROP_IDENTITY, PROP_SOCKET_TYPE,
};
use usdwire::{Endpoint, Envelope};

/// What the peer saw during one connection.
#[derive(Debug, Default)]
pub struct Received {
    pub identity: Option<Bytes>,
    pub socket_type: Option<Bytes>,
    pub messages: Vec<Vec<Bytes>>,
}

/// Decides the reply to each message. `None` means stay silent.
pub type Handler = Box<dyn FnMut(&[Bytes]) -> Option<Vec<Bytes>> + Send>;

pub fn reply_with(text: &'static str) -> Handler {
    Box::new(move |_: &[Bytes]| Some(vec![Bytes::from_static(text.as_bytes())]))
}

pub fn silent() -> Handler {
    Box::new(|_: &[Bytes]| None)
}

pub fn echo() -> Handler {
    Box::new(|frames: &[Bytes]| Some(vec![frames[0].clone()]))
}

pub struct FakeRouter {
    pub endpoint: Endpoint,
    handle: JoinHandle<Received>,
}

/// Routes library logs through the test harness. Set `RUST_LOG` to see them.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

impl FakeRouter {
    pub async fn tcp(handler: Handler) -> Self {
        Self::tcp_with(router_handshake(), handler).await
    }

    /// Serves with a custom handshake reply instead of READY.
    pub async fn tcp_with(handshake: Vec<u8>, handler: Handler) -> Self {
        init_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, handshake, handler).await
        });
        Self {
            endpoint: format!("tcp://{addr}").parse().unwrap(),
            handle,
        }
    }

    pub async fn ipc(path: &Path, handler: Handler) -> Self {
        init_logging();
        let listener = UnixListener::bind(path).unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, router_handshake(), handler).await
        });
        Self {
            endpoint: Endpoint::Ipc(path.to_path_buf()),
            handle,
        }
    }

    /// Waits for the client to hang up and returns what was received.
    pub async fn finish(self) -> Received {
        self.handle.await.unwrap()
    }
}

/// Greeting followed by READY as a ROUTER socket.
pub fn router_handshake() -> Vec<u8> {
    let mut greeting = Greeting::null();
    greeting.as_server = true;
    let mut metadata = Metadata::new();
    metadata.insert(PROP_SOCKET_TYPE, "ROUTER");
    let mut out = greeting.to_bytes().to_vec();
    out.extend_from_slice(&encode_command(&Command::Ready(metadata)));
    out
}

/// Greeting followed by an ERROR command.
pub fn rejecting_handshake(reason: &str) -> Vec<u8> {
    let mut out = Greeting::null().to_bytes().to_vec();
    out.extend_from_slice(&encode_command(&Command::Error(reason.to_string())));
    out
}

/// Greeting followed by READY from a socket type DEALER cannot talk to.
pub fn publisher_handshake() -> Vec<u8> {
    let mut metadata = Metadata::new();
    metadata.insert(PROP_SOCKET_TYPE, "PUB");
    let mut out = Greeting::null().to_bytes().to_vec();
    out.extend_from_slice(&encode_command(&Command::Ready(metadata)));
    out
}

async fn serve<S>(mut stream: S, handshake: Vec<u8>, mut handler: Handler) -> Received
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut received = Received::default();
    let mut decoder = FrameDecoder::new(u64::MAX);
    let mut buf = vec![0u8; 64 * 1024];

    stream.write_all(&handshake).await.unwrap();

    let mut greeted = false;
    loop {
        if !greeted {
            if decoder.decode_greeting().unwrap().is_some() {
                greeted = true;
                continue;
            }
        } else {
            match decoder.decode() {
                Ok(Some(Inbound::Command(Command::Ready(metadata)))) => {
                    received.identity = metadata.get(PROP_IDENTITY).cloned();
                    received.socket_type = metadata.get(PROP_SOCKET_TYPE).cloned();
                    continue;
                }
                Ok(Some(Inbound::Command(_))) => continue,
                Ok(Some(Inbound::Message(frames))) => {
                    let reply = handler(&frames);
                    received.messages.push(frames);
                    if let Some(reply) = reply {
                        let wire = encode_message(&Envelope::from_frames(reply));
                        if stream.write_all(&wire).await.is_err() {
                            break;
                        }
                    }
                    continue;
                }
                Ok(None) => {}
                Err(_) => break,
            }
        }

        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => decoder.extend(&buf[..n]),
        }
    }
    received
}
