use std::io;

use bytes::Bytes;
use futures::io::{AsyncRead, AsyncWrite};
use futures::{AsyncReadExt, AsyncWriteExt};
use log::{debug, error, info, trace, warn};
use tokio::net::{TcpStream, UnixStream};
use tokio::time::timeout;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tokio_vsock::{VsockAddr, VsockStream};

use super::{Endpoint, Identity, Transport};
use crate::config::SessionConfig;
use crate::core::Envelope;
use crate::error::{Error, Result};
use crate::protocol::{
    encode_command, message_frames, socket_type, Command, FrameDecoder, Greeting, Inbound,
    Metadata, PROP_IDENTITY, PROP_SOCKET_TYPE,
};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// DEALER-side ZMTP session.
///
/// Owns exactly one connection. Sends and receives fail fast with
/// [`Error::NotConnected`] unless the session is connected.
pub struct Session {
    endpoint: Endpoint,
    identity: Option<Identity>,
    config: SessionConfig,
    conn: Option<Connection>,
}

impl Session {
    /// Creates a disconnected session. Nothing touches the network until
    /// [`open`](Session::open).
    pub fn new(endpoint: Endpoint, config: SessionConfig) -> Self {
        Self {
            endpoint,
            identity: None,
            config,
            conn: None,
        }
    }

    /// Uses a fixed identity instead of a generated one.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Creates a session and connects it.
    pub async fn connect(endpoint: Endpoint, config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(endpoint, config);
        session.open().await?;
        Ok(session)
    }

    /// Opens the socket and runs the ZMTP handshake.
    ///
    /// On failure the session stays disconnected.
    pub async fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let identity = self.identity.get_or_insert_with(Identity::generate).clone();
        info!("Connecting to {} as {}...", self.endpoint, identity);

        let stream = self.dial().await?;
        let mut conn = Connection::new(stream, self.config.max_content_size);

        let recv_timeout = self.config.recv_timeout;
        let peer_type = match timeout(recv_timeout, conn.handshake(&identity)).await {
            Ok(Ok(peer_type)) => peer_type,
            Ok(Err(Error::Io(source))) => {
                return Err(Error::Connection {
                    endpoint: self.endpoint.to_string(),
                    source,
                });
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::Handshake(format!(
                    "no greeting from peer within {recv_timeout:?}"
                )));
            }
        };

        self.conn = Some(conn);
        info!(
            "Connected successfully to {} ({}) as {}",
            self.endpoint, peer_type, identity
        );
        Ok(())
    }

    /// Closes the connection, waiting at most the linger period for queued
    /// data. Calling it again, or on a session that never connected, does
    /// nothing.
    pub async fn disconnect(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let linger = self.config.linger;
        match timeout(linger, conn.stream.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Error while closing connection: {}", e),
            Err(_) => warn!("Linger period of {:?} expired, dropping unsent data", linger),
        }
        info!("Disconnected from {}", self.endpoint);
    }

    pub fn state(&self) -> SessionState {
        if self.conn.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Identity announced on the last connect, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn dial(&self) -> Result<Box<dyn Stream>> {
        let connect_timeout = self.config.send_timeout;
        let source = match timeout(connect_timeout, dial_stream(&self.endpoint)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {connect_timeout:?}"),
            ),
        };
        error!("Connection to {} failed: {}", self.endpoint, source);
        Err(Error::Connection {
            endpoint: self.endpoint.to_string(),
            source,
        })
    }

    fn drop_connection(&mut self, reason: &str) {
        if self.conn.take().is_some() {
            warn!("Closing connection to {}: {}", self.endpoint, reason);
        }
    }
}

impl Transport for Session {
    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let send_timeout = self.config.send_timeout;
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        if envelope.is_empty() {
            return Err(Error::Send("envelope has no frames".into()));
        }

        // A write abandoned halfway leaves a torn frame on the wire, so any
        // failure here ends the connection.
        let result = timeout(send_timeout, conn.write_message(envelope)).await;
        match result {
            Ok(Ok(())) => {
                debug!(
                    "Sent {} frame(s), {} bytes",
                    envelope.len(),
                    envelope.total_size()
                );
                Ok(())
            }
            Ok(Err(e)) => {
                let msg = e.to_string();
                self.drop_connection(&msg);
                Err(Error::Send(msg))
            }
            Err(_) => {
                let msg = format!("send timed out after {send_timeout:?}");
                self.drop_connection(&msg);
                Err(Error::Send(msg))
            }
        }
    }

    async fn recv_reply(&mut self) -> Result<Option<Bytes>> {
        let recv_timeout = self.config.recv_timeout;
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;

        let result = timeout(recv_timeout, conn.read_message()).await;
        match result {
            Ok(Ok(frames)) => select_reply(frames).map(Some),
            Ok(Err(e)) => {
                self.drop_connection(&e.to_string());
                Err(e)
            }
            Err(_) => {
                debug!("No reply within {:?}", recv_timeout);
                Ok(None)
            }
        }
    }
}

struct Connection {
    stream: Box<dyn Stream>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl Connection {
    fn new(stream: Box<dyn Stream>, max_frame_size: u64) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(max_frame_size),
            read_buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Exchanges greetings and READY commands. Returns the peer socket type.
    async fn handshake(&mut self, identity: &Identity) -> Result<String> {
        let mut metadata = Metadata::new();
        metadata.insert(PROP_SOCKET_TYPE, socket_type::DEALER);
        metadata.insert(
            PROP_IDENTITY,
            Bytes::copy_from_slice(identity.as_str().as_bytes()),
        );

        self.stream.write_all(&Greeting::null().to_bytes()).await?;
        self.stream
            .write_all(&encode_command(&Command::Ready(metadata)))
            .await?;
        self.stream.flush().await?;

        let greeting = loop {
            if let Some(greeting) = self.decoder.decode_greeting()? {
                break greeting;
            }
            self.fill().await?;
        };
        trace!(
            "Peer greeting: ZMTP {}.{}, mechanism={}",
            greeting.major, greeting.minor, greeting.mechanism
        );

        let peer = loop {
            match self.decoder.decode()? {
                Some(Inbound::Command(Command::Ready(metadata))) => break metadata,
                Some(Inbound::Command(Command::Error(reason))) => {
                    return Err(Error::Handshake(format!("peer rejected handshake: {reason}")));
                }
                Some(other) => {
                    return Err(Error::Handshake(format!("expected READY, got {other:?}")));
                }
                None => self.fill().await?,
            }
        };

        let peer_type = peer
            .get(PROP_SOCKET_TYPE)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default();
        if !socket_type::is_dealer_peer(&peer_type) {
            return Err(Error::Handshake(format!(
                "peer socket type {peer_type:?} cannot talk to DEALER"
            )));
        }
        Ok(peer_type)
    }

    async fn write_message(&mut self, envelope: &Envelope) -> io::Result<()> {
        for (i, ((header, n), frame)) in message_frames(envelope).enumerate() {
            self.stream.write_all(&header[..n]).await?;
            self.stream.write_all(frame).await?;
            trace!("Sent frame {}/{}, len={}", i + 1, envelope.len(), frame.len());
        }
        self.stream.flush().await
    }

    /// Reads until one complete message arrives.
    ///
    /// Cancel-safe: bytes already read stay in the decoder.
    async fn read_message(&mut self) -> Result<Vec<Bytes>> {
        loop {
            match self.decoder.decode()? {
                Some(Inbound::Message(frames)) => return Ok(frames),
                Some(Inbound::Command(Command::Ping { context, .. })) => {
                    trace!("Answering PING");
                    self.stream
                        .write_all(&encode_command(&Command::Pong { context }))
                        .await?;
                    self.stream.flush().await?;
                }
                Some(Inbound::Command(command)) => {
                    warn!("Ignoring {} command from peer", command.name());
                }
                None => self.fill().await?,
            }
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let n = self.stream.read(&mut self.read_buf).await?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )));
        }
        self.decoder.extend(&self.read_buf[..n]);
        Ok(())
    }
}

async fn dial_stream(endpoint: &Endpoint) -> io::Result<Box<dyn Stream>> {
    let stream: Box<dyn Stream> = match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await?;
            stream.set_nodelay(true)?;
            info!("TCP socket connected.");
            Box::new(stream.compat())
        }
        Endpoint::Ipc(path) => {
            let stream = UnixStream::connect(path).await?;
            info!("Unix socket connected.");
            Box::new(stream.compat())
        }
        Endpoint::Vsock { cid, port } => {
            let stream = VsockStream::connect(VsockAddr::new(*cid, *port)).await?;
            info!("Vsock socket connected.");
            Box::new(stream.compat())
        }
    };
    Ok(stream)
}

/// Picks the reply frame out of a received message.
///
/// Empty delimiter frames in front of the reply are skipped; frames after it
/// are dropped.
fn select_reply(frames: Vec<Bytes>) -> Result<Bytes> {
    let start = frames
        .iter()
        .position(|f| !f.is_empty())
        .unwrap_or(frames.len().saturating_sub(1));
    let mut rest = frames.into_iter().skip(start);
    let reply = rest
        .next()
        .ok_or_else(|| Error::protocol("empty reply message"))?;
    let dropped = rest.count();
    if dropped > 0 {
        warn!("Dropped {} extra reply frame(s)", dropped);
    }
    Ok(reply)
}
