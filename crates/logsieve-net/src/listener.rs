use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logsieve_core::EventSink;

use crate::decoder::FrameDecoder;

/// Scratch buffer size for connection reads.
const READ_BUF_LEN: usize = 8192;

/// Pause after a failed accept before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long `stop` waits for the accept loop to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener lifecycle failure.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("listener is already running")]
    AlreadyRunning,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// TCP accept loop feeding decoded records into an [`EventSink`].
///
/// Each accepted connection gets its own read task and its own
/// [`FrameDecoder`], so records from one connection reach the sink in
/// decode order while a misbehaving producer cannot stall the others.
pub struct LogListener {
    sink: EventSink,

    /// Frame cap handed to each connection's decoder
    max_frame_len: usize,

    /// Cancellation token observed by the accept loop and all reads
    cancel: CancellationToken,

    /// Latch cancelled exactly once when the accept loop has exited
    stopped: CancellationToken,

    /// Accept loop task handle
    task: Option<tokio::task::JoinHandle<()>>,

    /// Bound address, known after start
    local_addr: Option<SocketAddr>,

    /// Live connection count
    connections: Arc<AtomicUsize>,
}

impl LogListener {
    /// Create a listener that submits decoded records to `sink`.
    pub fn new(sink: EventSink, max_frame_len: usize) -> Self {
        Self {
            sink,
            max_frame_len,
            cancel: CancellationToken::new(),
            stopped: CancellationToken::new(),
            task: None,
            local_addr: None,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind `addr` and start accepting producers.
    ///
    /// Returns the actual bound address, so port 0 can be used to request
    /// an ephemeral port.
    pub async fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr, ListenError> {
        if self.is_running() {
            return Err(ListenError::AlreadyRunning);
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenError::Bind { addr, source })?;
        let local_addr = listener.local_addr().unwrap_or(addr);
        info!(%local_addr, "listening for log producers");

        let sink = self.sink.clone();
        let max_frame_len = self.max_frame_len;
        let cancel = self.cancel.clone();
        let stopped = self.stopped.clone();
        let connections = Arc::clone(&self.connections);

        self.local_addr = Some(local_addr);
        self.task = Some(tokio::spawn(async move {
            accept_loop(listener, sink, max_frame_len, cancel, connections).await;
            info!("listener stopped");
            stopped.cancel();
        }));

        Ok(local_addr)
    }

    /// Signal cancellation and wait for the accept loop to exit.
    ///
    /// Idempotent. Returns false if the loop failed to stop within the
    /// timeout; the caller treats that as a warning, not a fatal error.
    pub async fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return true;
        };

        self.cancel.cancel();
        let clean = tokio::time::timeout(STOP_TIMEOUT, self.stopped.cancelled())
            .await
            .is_ok();
        if !clean {
            warn!("listener did not stop within {STOP_TIMEOUT:?}");
        }
        task.abort();

        // fresh tokens so the listener can be started again
        self.cancel = CancellationToken::new();
        self.stopped = CancellationToken::new();
        self.local_addr = None;
        clean
    }

    /// Address the listener is bound to, if running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Check if the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Number of currently connected producers.
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

impl Drop for LogListener {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    sink: EventSink,
    max_frame_len: usize,
    cancel: CancellationToken,
    connections: Arc<AtomicUsize>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = listener.accept() => {
                match result {
                    Ok((socket, peer)) => {
                        info!(%peer, "producer connected");
                        let sink = sink.clone();
                        let cancel = cancel.clone();
                        let connections = Arc::clone(&connections);
                        connections.fetch_add(1, Ordering::Relaxed);
                        tokio::spawn(async move {
                            handle_connection(socket, peer, sink, max_frame_len, cancel).await;
                            connections.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(err) => {
                        // transient accept failure; back off and keep serving
                        warn!(error = %err, "accept failed");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                        }
                    }
                }
            }
        }
    }
}

/// Read loop for one producer connection.
///
/// Decode errors are logged and the connection keeps being read; only a
/// closed socket, a read error or cancellation ends the loop.
async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    sink: EventSink,
    max_frame_len: usize,
    cancel: CancellationToken,
) {
    let mut decoder = FrameDecoder::with_max_frame_len(max_frame_len);
    let mut buf = vec![0u8; READ_BUF_LEN];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = socket.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!(%peer, "producer disconnected");
                        break;
                    }
                    Ok(n) => {
                        let outcome = decoder.feed(&buf[..n]);
                        for record in outcome.records {
                            sink.submit(record);
                        }
                        if let Some(err) = outcome.error {
                            warn!(%peer, error = %err, "discarded undecodable bytes");
                        }
                    }
                    Err(err) => {
                        warn!(%peer, error = %err, "read failed");
                        break;
                    }
                }
            }
        }
    }

    if decoder.pending() > 0 {
        debug!(%peer, pending = decoder.pending(), "dropping incomplete trailing frame");
    }
}
