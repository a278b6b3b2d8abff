//! Integration tests for the secure echo server over TCP.

use std::net::SocketAddr;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use net_transport::{
    ChannelConfig, EchoServer, TransportError, TransportResult, dial, dial_with_config, serve,
};

async fn start_server(
    config: ChannelConfig,
) -> (SocketAddr, EchoServer, oneshot::Sender<()>, JoinHandle<TransportResult<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = EchoServer::new(config);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let handle = {
        let server = server.clone();
        tokio::spawn(async move {
            server
                .serve_with_shutdown(listener, async move {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    (addr, server, stop_tx, handle)
}

/// Full handshake + echo against the default `serve` entry point
#[tokio::test]
async fn test_dial_against_live_serve() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(serve(listener));

    let mut conn = dial(format!("localhost:{port}")).await.unwrap();
    assert_eq!(conn.write(b"hello").await.unwrap(), 5);

    let mut buf = [0u8; 5];
    let n = timeout(Duration::from_secs(5), conn.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"hello");

    server.abort();
}

#[tokio::test]
async fn test_many_frames_on_one_connection() {
    let (addr, server, stop, handle) = start_server(ChannelConfig::default()).await;

    let mut conn = dial(addr).await.unwrap();
    for i in 0..50u32 {
        let message = format!("message number {i}");
        conn.write(message.as_bytes()).await.unwrap();
        let echoed = conn.read_frame().await.unwrap().unwrap();
        assert_eq!(echoed, message.as_bytes());
    }
    conn.shutdown().await.unwrap();
    assert!(conn.read_frame().await.unwrap().is_none());

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(server.stats().frames_echoed, 50);
    assert_eq!(server.stats().active_connections, 0);
}

#[tokio::test]
async fn test_concurrent_clients_get_their_own_echo() {
    let (addr, server, stop, handle) = start_server(ChannelConfig::default()).await;

    let clients = (0..8).map(|id| async move {
        let mut conn = dial(addr).await.unwrap();
        for round in 0..10 {
            let message = format!("client {id} round {round}");
            conn.write(message.as_bytes()).await.unwrap();
            let echoed = conn.read_frame().await.unwrap().unwrap();
            assert_eq!(echoed, message.as_bytes());
        }
        *conn.peer_public_key()
    });

    let server_keys = join_all(clients).await;

    // Every connection was answered with its own ephemeral server key
    for (i, key) in server_keys.iter().enumerate() {
        assert!(!server_keys[i + 1..].contains(key));
    }

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(server.stats().connections_accepted, 8);
    assert_eq!(server.stats().frames_echoed, 80);
}

#[tokio::test]
async fn test_server_survives_misbehaving_peers() {
    let config = ChannelConfig::default().with_handshake_timeout(Duration::from_millis(200));
    let (addr, server, stop, handle) = start_server(config.clone()).await;

    // Short handshake
    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&[1, 2, 3]).await.unwrap();
    drop(raw);

    // Silent peer, left to the handshake timeout
    let silent = TcpStream::connect(addr).await.unwrap();

    // A well-behaved client is still served
    let mut conn = dial_with_config(addr, &config).await.unwrap();
    conn.write(b"still here").await.unwrap();
    assert_eq!(conn.read_frame().await.unwrap().unwrap(), &b"still here"[..]);

    timeout(Duration::from_secs(5), async {
        while server.stats().failed_connections < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    drop(silent);

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_frame_size_boundary_over_tcp() {
    let config = ChannelConfig::default().with_max_frame_size(4096);
    let (addr, _server, stop, handle) = start_server(config.clone()).await;

    let mut conn = dial_with_config(addr, &config).await.unwrap();

    let largest = vec![0xEE; 4096];
    conn.write(&largest).await.unwrap();
    assert_eq!(conn.read_frame().await.unwrap().unwrap(), largest);

    let err = conn.write(&[0xEE; 4097]).await.unwrap_err();
    assert!(matches!(err, TransportError::FrameTooLarge { size: 4097, max: 4096 }));

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_small_read_buffer_drains_a_large_echo() {
    let (addr, _server, stop, handle) = start_server(ChannelConfig::default()).await;

    let mut conn = dial(addr).await.unwrap();
    let message: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    conn.write(&message).await.unwrap();

    let mut echoed = Vec::new();
    let mut buf = [0u8; 333];
    while echoed.len() < message.len() {
        let n = conn.read(&mut buf).await.unwrap();
        assert!(n > 0);
        echoed.extend_from_slice(&buf[..n]);
    }
    assert_eq!(echoed, message);

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_dial_without_listener_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert!(matches!(dial(addr).await, Err(TransportError::Io(_))));
}
