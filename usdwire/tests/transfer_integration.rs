//! End-to-end transfers against a fake ROUTER peer.

mod common;

use std::time::{Duration, Instant};

use bytes::Bytes;
use common::{echo, publisher_handshake, rejecting_handshake, reply_with, silent, FakeRouter};
use usdwire::core::digest;
use usdwire::{
    Envelope, ErrorKind, FileEnvelope, Outcome, Session, SessionConfig, SessionState,
    TransferClient, TransferState, Transport,
};

fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_file_transfer_round_trip() {
    // Verifies the digest on the receiving side like the middleware does.
    let router = FakeRouter::tcp(Box::new(|frames: &[Bytes]| {
        let file = FileEnvelope::parse(&Envelope::from_frames(frames.to_vec())).ok()?;
        let reply = if file.verify() { "OK" } else { "HASH_MISMATCH" };
        Some(vec![Bytes::from_static(reply.as_bytes())])
    }))
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "greeting.txt", b"hello");

    let mut client = TransferClient::connect(router.endpoint.clone(), SessionConfig::default())
        .await
        .unwrap();
    let report = client.send_file(&path).await;
    assert!(report.is_success(), "{:?}", report.outcome);
    assert_eq!(report.reply(), Some("OK"));
    assert_eq!(
        report.digest.as_deref(),
        Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );

    let identity = client.transport().identity().unwrap().to_string();
    client.disconnect().await;

    let received = router.finish().await;
    assert_eq!(received.socket_type.as_deref(), Some(&b"DEALER"[..]));
    assert_eq!(received.identity.as_deref(), Some(identity.as_bytes()));
    assert!(identity.starts_with("client_"));
    assert_eq!(received.messages.len(), 1);
    assert_eq!(
        received.messages[0],
        vec![
            Bytes::from_static(b"greeting.txt"),
            Bytes::from_static(b"hello"),
            Bytes::from(digest::digest(b"hello")),
        ]
    );
}

#[tokio::test]
async fn test_large_file_uses_long_frames() {
    let router = FakeRouter::tcp(reply_with("OK")).await;
    let dir = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let path = write_file(&dir, "stage.usdc", &content);

    let mut client = TransferClient::connect(router.endpoint.clone(), SessionConfig::default())
        .await
        .unwrap();
    let report = client.send_file(&path).await;
    assert!(report.is_success());
    client.disconnect().await;

    let received = router.finish().await;
    let frames = &received.messages[0];
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1], content);
    assert_eq!(frames[2], digest::digest(&content).as_bytes());
}

#[tokio::test]
async fn test_messages_and_json() {
    let router = FakeRouter::tcp(echo()).await;
    let mut client = TransferClient::connect(router.endpoint.clone(), SessionConfig::default())
        .await
        .unwrap();

    let report = client.send_message("Hello from the DEALER side").await;
    assert_eq!(report.reply(), Some("Hello from the DEALER side"));

    let report = client.send_json(&serde_json::json!({"a": 1})).await;
    assert!(report.is_success());
    let echoed: serde_json::Value = serde_json::from_str(report.reply().unwrap()).unwrap();
    assert_eq!(echoed, serde_json::json!({"a": 1}));

    let report = client.send_message("STATUS").await;
    assert_eq!(report.reply(), Some("STATUS"));

    client.disconnect().await;
    let received = router.finish().await;
    assert_eq!(received.messages.len(), 3);
    assert!(received.messages.iter().all(|m| m.len() == 1));
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let router = FakeRouter::tcp(silent()).await;
    let recv_timeout = Duration::from_millis(300);
    let config = SessionConfig::default().with_recv_timeout(recv_timeout);
    let mut client = TransferClient::connect(router.endpoint.clone(), config)
        .await
        .unwrap();

    let start = Instant::now();
    let report = client.send_message("anyone there?").await;
    let elapsed = start.elapsed();

    assert!(matches!(report.outcome, Outcome::TimedOut));
    assert_eq!(client.state(), TransferState::TimedOut);
    assert!(elapsed >= recv_timeout, "returned after {elapsed:?}");
    assert!(elapsed < recv_timeout + Duration::from_secs(2), "took {elapsed:?}");

    // The session survives a timeout.
    assert_eq!(client.transport().state(), SessionState::Connected);

    client.disconnect().await;
    let received = router.finish().await;
    assert_eq!(received.messages.len(), 1);
}

#[tokio::test]
async fn test_delimiter_frame_skipped() {
    let router = FakeRouter::tcp(Box::new(|_: &[Bytes]| {
        Some(vec![Bytes::new(), Bytes::from_static(b"RETRY")])
    }))
    .await;
    let mut client = TransferClient::connect(router.endpoint.clone(), SessionConfig::default())
        .await
        .unwrap();

    let report = client.send_message("hello").await;
    assert_eq!(report.reply(), Some("RETRY"));

    client.disconnect().await;
    router.finish().await;
}

#[tokio::test]
async fn test_peer_hangs_up_before_reply() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(&common::router_handshake())
            .await
            .unwrap();
        let mut buf = vec![0u8; 4096];
        // Greeting + READY from the client, then the request; then hang up.
        let _ = stream.read(&mut buf).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    });

    let endpoint = format!("tcp://{addr}").parse().unwrap();
    let mut client = TransferClient::connect(endpoint, SessionConfig::default())
        .await
        .unwrap();
    server.await.unwrap();

    let report = client.send_message("hello").await;
    assert_eq!(report.state(), TransferState::Failed);
    assert_eq!(client.transport().state(), SessionState::Disconnected);

    // Later operations fail fast.
    let report = client.send_message("again").await;
    assert_eq!(report.error().unwrap().kind(), ErrorKind::NotConnected);
    client.disconnect().await;
}

#[tokio::test]
async fn test_send_timeout_against_stalled_peer() {
    common::init_logging();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (release, released) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(&common::router_handshake())
            .await
            .unwrap();
        // Never read, so the client's writes back up once the socket buffers fill.
        let _ = released.await;
        drop(stream);
    });

    let dir = tempfile::tempdir().unwrap();
    let content = vec![0x5Au8; 64 * 1024 * 1024];
    let path = write_file(&dir, "huge.usdc", &content);

    let send_timeout = Duration::from_millis(300);
    let config = SessionConfig::default()
        .with_send_timeout(send_timeout)
        .with_linger(Duration::from_millis(200));
    let endpoint = format!("tcp://{addr}").parse().unwrap();
    let mut client = TransferClient::connect(endpoint, config).await.unwrap();

    let start = Instant::now();
    let report = client.send_file(&path).await;
    assert!(start.elapsed() < send_timeout + Duration::from_secs(5));

    assert_eq!(report.state(), TransferState::Failed);
    assert_eq!(report.error().unwrap().kind(), ErrorKind::Send);
    assert_eq!(report.exit_code(), 1);
    assert!(report.digest.is_some());
    assert_eq!(client.transport().state(), SessionState::Disconnected);

    let start = Instant::now();
    client.disconnect().await;
    client.disconnect().await;
    assert!(start.elapsed() < Duration::from_secs(1));

    let report = client.send_message("after the timeout").await;
    assert_eq!(report.error().unwrap().kind(), ErrorKind::NotConnected);

    let _ = release.send(());
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_rejected() {
    let router = FakeRouter::tcp_with(rejecting_handshake("access denied"), silent()).await;
    let err = Session::connect(router.endpoint.clone(), SessionConfig::default())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("access denied"), "{err}");
    router.finish().await;
}

#[tokio::test]
async fn test_incompatible_peer_socket_type() {
    let router = FakeRouter::tcp_with(publisher_handshake(), silent()).await;
    let err = Session::connect(router.endpoint.clone(), SessionConfig::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, usdwire::Error::Handshake(_)), "{err:?}");
    router.finish().await;
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let router = FakeRouter::tcp(silent()).await;
    let mut session = Session::connect(router.endpoint.clone(), SessionConfig::default())
        .await
        .unwrap();
    assert!(session.is_connected());

    session.disconnect().await;
    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.recv_reply().await,
        Err(usdwire::Error::NotConnected)
    ));
    router.finish().await;
}

#[tokio::test]
async fn test_ipc_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("middleware.sock");
    let router = FakeRouter::ipc(&socket, reply_with("OK")).await;

    let mut client = TransferClient::connect(router.endpoint.clone(), SessionConfig::default())
        .await
        .unwrap();
    let report = client.send_message("over a unix socket").await;
    assert_eq!(report.reply(), Some("OK"));
    client.disconnect().await;

    let received = router.finish().await;
    assert_eq!(
        received.messages,
        vec![vec![Bytes::from_static(b"over a unix socket")]]
    );
}
