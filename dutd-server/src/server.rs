//! TCP server implementation.
//!
//! One readiness-multiplexed loop over the listening socket, the shutdown
//! channel, and at most one client socket. Requests are fully serialized:
//! there is no per-connection task and no concurrent handler execution.

use crate::dispatch::{DispatchTable, Outcome};
use crate::error::ServerError;
use dutd_protocol::{Decoder, Encoder, MAX_FRAME_SIZE};
use socket2::SockRef;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: crate::config::NetworkConfig::default().bind_addr,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_total: AtomicU64,
    pub frames_invalid: AtomicU64,
}

/// The controlling client, while one is connected.
struct ClientConn {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: Decoder,
}

/// TCP server for dutd.
pub struct Server {
    config: ServerConfig,
    dispatch: DispatchTable,
    stats: ServerStats,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server. The dispatch table is fixed for the server's
    /// lifetime.
    pub fn new(config: ServerConfig, dispatch: DispatchTable) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            dispatch,
            stats: ServerStats::default(),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs the event loop.
    ///
    /// Returns `Ok(())` only for a shutdown-signal termination; a listening
    /// socket failure surfaces as an error.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Runs the event loop on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut client: Option<ClientConn> = None;
        let mut buf = [0u8; MAX_FRAME_SIZE];

        let result = loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    tracing::info!("Received termination signal: shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.admit(&mut client, stream, peer),
                        Err(e) => {
                            tracing::error!("Listening socket error: exiting ({})", e);
                            break Err(ServerError::Io(e));
                        }
                    }
                }

                result = read_client(&mut client, &mut buf), if client.is_some() => {
                    match result {
                        Ok(0) => {
                            Self::disconnect(&mut client, "client closed the connection");
                        }
                        Ok(n) => {
                            if let Some(conn) = client.as_mut() {
                                if !self.process_incoming(conn, &buf[..n]).await {
                                    Self::disconnect(&mut client, "failed to write response");
                                }
                            }
                        }
                        Err(e) => {
                            Self::disconnect(&mut client, &format!("read error: {}", e));
                        }
                    }
                }
            }
        };

        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Applies the admission policy to a pending connection attempt.
    ///
    /// A different peer than the active client is rejected; the same peer
    /// (or no active client) replaces the current session with reassembly
    /// state reset to empty.
    fn admit(&self, client: &mut Option<ClientConn>, stream: TcpStream, peer: SocketAddr) {
        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);

        if let Some(existing) = client.as_ref() {
            if existing.peer.ip() != peer.ip() {
                tracing::info!(
                    "Rejecting connection from {} (session with {} is active)",
                    peer,
                    existing.peer
                );
                self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        if let Err(e) = configure_client_socket(&stream) {
            tracing::warn!("Failed to configure client socket: {}", e);
        }

        if let Some(old) = client.take() {
            tracing::warn!("Closing current connection with {}", old.peer);
        }

        tracing::info!("Accepting new connection from {}", peer);
        *client = Some(ClientConn {
            stream,
            peer,
            decoder: Decoder::new(),
        });
    }

    /// Tears the client connection down; the loop keeps running.
    fn disconnect(client: &mut Option<ClientConn>, reason: &str) {
        if let Some(conn) = client.take() {
            tracing::info!("[{}] {}: closing connection", conn.peer, reason);
        }
    }

    /// Feeds freshly-read bytes through reassembly and dispatches every
    /// complete frame. Returns false when the connection must be torn down.
    async fn process_incoming(&self, conn: &mut ClientConn, data: &[u8]) -> bool {
        match conn.decoder.extend(data) {
            Ok(0) => {}
            Ok(stale) => {
                tracing::debug!(
                    "[{}] Discarding incomplete stale message with {} bytes",
                    conn.peer,
                    stale
                );
            }
            Err(e) => {
                tracing::warn!("[{}] {}", conn.peer, e);
                self.stats.frames_invalid.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }

        loop {
            match conn.decoder.decode_frame() {
                Ok(Some(frame)) => {
                    if !self.handle_frame(conn, frame).await {
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    tracing::warn!("[{}] Invalid frame received: {}", conn.peer, e);
                    self.stats.frames_invalid.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
            }
        }
    }

    /// Dispatches one complete frame and writes the response, if any.
    /// Returns false when the connection must be torn down.
    async fn handle_frame(&self, conn: &mut ClientConn, frame: dutd_protocol::Frame) -> bool {
        self.stats.requests_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "[{}] Received message id {:#04x} for hw #{}, {} byte payload",
            conn.peer,
            frame.msg_id,
            frame.hw_index,
            frame.payload.len()
        );

        let Some(handler) = self.dispatch.get(frame.msg_id) else {
            tracing::warn!("[{}] Unknown message id {:#04x}", conn.peer, frame.msg_id);
            return true;
        };

        let mut payload = frame.payload;
        match handler.handle(frame.hw_index, &mut payload) {
            Outcome::NoReply => {
                tracing::debug!(
                    "[{}] Message processing failed, response will not be sent",
                    conn.peer
                );
                true
            }
            Outcome::Reply => {
                let response = match Encoder::encode_response(frame.msg_id, &payload) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("[{}] Failed to encode response: {}", conn.peer, e);
                        return true;
                    }
                };

                tracing::debug!(
                    "[{}] Sending response id {:#04x}, {} bytes",
                    conn.peer,
                    frame.msg_id,
                    response.len()
                );
                if let Err(e) = conn.stream.write_all(&response).await {
                    tracing::info!("[{}] Write error: {}", conn.peer, e);
                    return false;
                }
                true
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// Reads from the active client socket. The select arm is disabled while no
/// client is connected, so the `None` branch never resolves.
async fn read_client(client: &mut Option<ClientConn>, buf: &mut [u8]) -> std::io::Result<usize> {
    match client.as_mut() {
        Some(conn) => conn.stream.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Abortive close on teardown, no send coalescing delay, keep-alive probing.
fn configure_client_socket(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_linger(Some(Duration::ZERO))?;
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_keepalive(true)?;
    Ok(())
}
