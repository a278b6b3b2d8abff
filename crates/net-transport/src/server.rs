//! Echo server: accept loop and per-connection echo tasks

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crypto_session::{CryptoResult, Direction, HandshakeBuilder, KeyPair};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::{ChannelConfig, SecureStream, TransportResult};

/// Pause before accepting again after the process ran out of resources
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Produces the server's key pair for each accepted connection
pub type KeySource = fn() -> CryptoResult<KeyPair>;

/// How an `accept` error affects the accept loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The pending connection went away before it was accepted
    Peer,
    /// Out of descriptors, buffers or memory; retried after a pause
    Transient,
    /// The listening socket itself is unusable
    Listener,
}

fn classify_accept_error(e: &io::Error) -> AcceptFailure {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => AcceptFailure::Peer,
        io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported => AcceptFailure::Listener,
        _ => AcceptFailure::Transient,
    }
}

/// Server counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub failed_connections: u64,
    pub frames_echoed: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    active: AtomicU64,
    failed: AtomicU64,
    frames: AtomicU64,
}

/// Decrements the active count even when the task is aborted
struct ActiveGuard(Arc<Counters>);

impl ActiveGuard {
    fn new(counters: Arc<Counters>) -> Self {
        counters.accepted.fetch_add(1, Ordering::Relaxed);
        counters.active.fetch_add(1, Ordering::Relaxed);
        Self(counters)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Secure echo server
///
/// Every accepted connection runs in its own task with its own key pair
/// and nonce stream; nothing but the read-only config and the counters is
/// shared between connections.
#[derive(Clone)]
pub struct EchoServer {
    config: ChannelConfig,
    counters: Arc<Counters>,
    key_source: KeySource,
}

impl EchoServer {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            counters: Arc::new(Counters::default()),
            key_source: KeyPair::generate,
        }
    }

    /// Replace the per-connection key generator (`KeyPair::generate`)
    pub fn with_key_source(mut self, key_source: KeySource) -> Self {
        self.key_source = key_source;
        self
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            connections_accepted: self.counters.accepted.load(Ordering::Relaxed),
            active_connections: self.counters.active.load(Ordering::Relaxed),
            failed_connections: self.counters.failed.load(Ordering::Relaxed),
            frames_echoed: self.counters.frames.load(Ordering::Relaxed),
        }
    }

    /// Accept connections until the listener fails or a connection hits a
    /// fatal error
    pub async fn serve(&self, listener: TcpListener) -> TransportResult<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves or the listener fails
    ///
    /// A failing connection only ends its own task, unless its error is
    /// fatal (the entropy source broke): then the loop stops and the error
    /// is returned. `accept` errors caused by a single peer are skipped,
    /// resource exhaustion is retried after a pause, and only a failure of
    /// the listening socket itself ends the loop. On the way out all
    /// connection tasks still running are aborted.
    pub async fn serve_with_shutdown<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> TransportResult<()>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;

        let local = listener.local_addr()?;
        info!(%local, max_frame_size = self.config.max_frame_size, "Echo server listening");

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }

                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => match classify_accept_error(&e) {
                            AcceptFailure::Peer => {
                                debug!(error = %e, "Connection dropped before accept");
                                continue;
                            }
                            AcceptFailure::Transient => {
                                warn!(error = %e, "Failed to accept connection, backing off");
                                tokio::time::sleep(ACCEPT_BACKOFF).await;
                                continue;
                            }
                            AcceptFailure::Listener => {
                                error!(error = %e, "Listener failed");
                                break Err(e.into());
                            }
                        },
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%remote, error = %e, "Could not set TCP_NODELAY");
                    }

                    let server = self.clone();
                    connections.spawn(
                        async move { server.run_connection(stream).await }
                            .instrument(info_span!("connection", %remote)),
                    );
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    match joined {
                        Ok(Err(e)) if e.is_fatal() => {
                            error!(error = %e, "Stopping echo server");
                            break Err(e);
                        }
                        Err(e) if e.is_panic() => {
                            error!(error = %e, "Connection task panicked");
                        }
                        _ => {}
                    }
                }
            }
        };

        connections.shutdown().await;
        info!(stats = ?self.stats(), "Echo server stopped");

        result
    }

    async fn run_connection<S>(&self, stream: S) -> TransportResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _active = ActiveGuard::new(self.counters.clone());

        match self.handle_connection(stream).await {
            Ok(frames) => {
                debug!(frames, "Connection closed");
                Ok(())
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                if !e.is_fatal() {
                    warn!(error = %e, "Connection closed with error");
                }
                Err(e)
            }
        }
    }

    /// Run the responder handshake on `stream`, then echo every frame
    ///
    /// Returns the number of frames echoed once the peer closes the stream.
    pub async fn handle_connection<S>(&self, stream: S) -> TransportResult<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let builder = HandshakeBuilder::with_keypair((self.key_source)()?, Direction::Responder);
        let mut secure = SecureStream::handshake_with(stream, builder, &self.config).await?;
        debug!(peer = %secure.peer_public_key().fingerprint(), "Handshake complete");

        let mut frames = 0u64;
        while let Some(frame) = secure.read_frame().await? {
            secure.write(&frame).await?;
            frames += 1;
            self.counters.frames.fetch_add(1, Ordering::Relaxed);
            trace!(len = frame.len(), "Echoed frame");
        }

        if let Err(e) = secure.shutdown().await {
            debug!(error = %e, "Shutdown after peer close failed");
        }

        Ok(frames)
    }
}

/// Run an echo server with default settings on `listener`
pub async fn serve(listener: TcpListener) -> TransportResult<()> {
    EchoServer::new(ChannelConfig::default()).serve(listener).await
}
