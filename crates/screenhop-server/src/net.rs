//! Connection lifecycle: acceptor, handshake, per-client workers, reaper.
//!
//! Each accepted socket gets one worker task. The worker performs the
//! handshake (server sends `Hello`, client answers `HelloReply` with its
//! claimed screen name), registers the screen, then runs a single select
//! loop that both drains the screen's outbound queue into the framed sink
//! and dispatches inbound messages into the engine. Per-client failures
//! never escape the worker: whatever happens, the worker's last act is to
//! remove its screen from the registry.
//!
//! Cancellation is cooperative via a shared [`CancellationToken`]; the
//! reaper joins workers with a deadline and detaches stragglers.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use screenhop_core::protocol::codec::WireCodec;
use screenhop_core::protocol::messages::{HelloMessage, WireMessage, PROTOCOL_VERSION};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::link::RemoteLink;

/// How long a client has to complete the handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between bind attempts while the address is unavailable.
const BIND_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Error type for the network layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// The listen address could not be bound within the configured timeout.
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Binds the listener, retrying until `bind_timeout` elapses.
///
/// A server restarting into a lingering TIME_WAIT socket is the common case;
/// retrying for a bounded window beats failing immediately.
///
/// # Errors
///
/// Returns [`NetError::BindFailed`] with the last bind error once the
/// timeout is exhausted.
pub async fn bind_with_retry(
    addr: SocketAddr,
    bind_timeout: Duration,
) -> Result<TcpListener, NetError> {
    let deadline = Instant::now() + bind_timeout;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(source) => {
                if Instant::now() + BIND_RETRY_INTERVAL > deadline {
                    return Err(NetError::BindFailed { addr, source });
                }
                warn!(%addr, error = %source, "bind failed; retrying");
                sleep(BIND_RETRY_INTERVAL).await;
            }
        }
    }
}

// ── Worker set ────────────────────────────────────────────────────────────────

/// Bag of connection worker handles keyed by id.
///
/// Reaping is "try-join non-blocking, drop the joined"; cancellation is the
/// shared token plus each worker's socket erroring out.
pub struct WorkerSet {
    cancel: CancellationToken,
    workers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl WorkerSet {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// The cancellation token workers observe.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns and tracks a worker task.
    pub fn spawn<F>(&self, fut: F) -> Uuid
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let handle = tokio::spawn(fut);
        self.workers.lock().expect("worker set lock poisoned").insert(id, handle);
        id
    }

    /// Drops handles of finished workers. Idempotent; called from the accept
    /// loop and at shutdown.
    pub fn reap(&self) {
        self.workers
            .lock()
            .expect("worker set lock poisoned")
            .retain(|_, handle| !handle.is_finished());
    }

    /// Number of tracked (possibly finished) workers.
    pub fn len(&self) -> usize {
        self.workers.lock().expect("worker set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels all workers and joins them, waiting at most `stop_timeout`.
    /// Workers still running at the deadline are detached and logged.
    pub async fn stop(&self, stop_timeout: Duration) {
        self.cancel.cancel();

        let drained: Vec<(Uuid, JoinHandle<()>)> = self
            .workers
            .lock()
            .expect("worker set lock poisoned")
            .drain()
            .collect();

        let deadline = Instant::now() + stop_timeout;
        for (id, handle) in drained {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(%id, error = %e, "worker panicked"),
                Err(_) => warn!(%id, "worker did not stop before deadline; detaching"),
            }
        }
    }
}

// ── Acceptor ──────────────────────────────────────────────────────────────────

/// Accepts client connections until cancelled, spawning one worker per
/// socket. Finished workers are reaped opportunistically on each accept.
pub async fn accept_loop(
    listener: TcpListener,
    engine: Engine,
    config: Arc<Mutex<ServerConfig>>,
    workers: Arc<WorkerSet>,
) {
    let cancel = workers.token();
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };

        debug!(%peer, "incoming connection");
        workers.reap();

        let engine = engine.clone();
        let config = Arc::clone(&config);
        let cancel = workers.token();
        workers.spawn(async move {
            serve_connection(stream, peer, engine, config, cancel).await;
        });
    }
}

// ── Per-client worker ─────────────────────────────────────────────────────────

/// Runs one client connection from handshake to teardown. Errors end the
/// connection; they are logged here and never propagated.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    engine: Engine,
    config: Arc<Mutex<ServerConfig>>,
    cancel: CancellationToken,
) {
    let mut framed = Framed::new(stream, WireCodec);

    // The server speaks first.
    if framed
        .send(WireMessage::Hello(HelloMessage { version: PROTOCOL_VERSION }))
        .await
        .is_err()
    {
        return;
    }

    let reply = tokio::select! {
        _ = cancel.cancelled() => return,
        r = timeout(HANDSHAKE_TIMEOUT, framed.next()) => r,
    };
    let reply = match reply {
        Ok(Some(Ok(WireMessage::HelloReply(m)))) => m,
        Ok(Some(Ok(other))) => {
            warn!(%peer, kind = ?other.message_type(), "handshake rejected: unexpected message");
            return;
        }
        Ok(Some(Err(e))) => {
            warn!(%peer, error = %e, "handshake rejected: codec error");
            return;
        }
        Ok(None) => return,
        Err(_) => {
            warn!(%peer, "handshake rejected: timed out");
            return;
        }
    };

    if reply.version != PROTOCOL_VERSION {
        warn!(%peer, version = reply.version, "handshake rejected: version mismatch");
        let _ = framed.send(WireMessage::Close).await;
        return;
    }

    let resolved = {
        let cfg = config.lock().expect("config lock poisoned");
        cfg.resolve_name(&reply.name)
    };
    let Some(name) = resolved else {
        warn!(%peer, claimed = %reply.name, "handshake rejected: screen not in configuration");
        let _ = framed.send(WireMessage::Close).await;
        return;
    };

    let (tx, rx) = mpsc::unbounded_channel();
    if let Err(e) = engine.add_screen(&name, Arc::new(RemoteLink::new(tx))) {
        // Two clients claiming one name: the second loses.
        warn!(%peer, %name, error = %e, "handshake rejected");
        let _ = framed.send(WireMessage::Close).await;
        return;
    }

    info!(%peer, %name, "client admitted");
    if framed.send(WireMessage::QueryInfo).await.is_ok() {
        client_loop(&mut framed, rx, &engine, &name, cancel).await;
    }

    engine.remove_screen(&name);
    debug!(%peer, %name, "client worker exited");
}

/// The admitted client's read/write loop: one select over cancellation, the
/// outbound queue, and inbound frames.
async fn client_loop(
    framed: &mut Framed<TcpStream, WireCodec>,
    mut rx: mpsc::UnboundedReceiver<WireMessage>,
    engine: &Engine,
    name: &str,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = framed.send(WireMessage::Close).await;
                break;
            }
            outgoing = rx.recv() => match outgoing {
                Some(msg) => {
                    let closing = msg == WireMessage::Close;
                    if framed.send(msg).await.is_err() || closing {
                        break;
                    }
                }
                None => break,
            },
            incoming = framed.next() => match incoming {
                Some(Ok(msg)) => {
                    if !handle_client_message(engine, name, msg) {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(name, error = %e, "client read error");
                    break;
                }
                None => {
                    debug!(name, "client closed connection");
                    break;
                }
            },
        }
    }
}

/// Dispatches one inbound message. Returns `false` to disconnect the client.
fn handle_client_message(engine: &Engine, name: &str, msg: WireMessage) -> bool {
    match msg {
        WireMessage::Noop => true,
        WireMessage::Info(info) => match engine.handle_info(name, info) {
            Ok(()) => true,
            Err(e) => {
                warn!(name, error = %e, "disconnecting: bad screen info");
                false
            }
        },
        WireMessage::ClipboardGrab(m) => {
            engine.grab_clipboard(name, m.id, m.seq_num);
            true
        }
        WireMessage::ClipboardSet(m) => {
            engine.set_clipboard(name, m.id, m.seq_num, m.data);
            true
        }
        WireMessage::Error => {
            warn!(name, "client reported an error; disconnecting");
            false
        }
        other => {
            warn!(name, kind = ?other.message_type(), "unexpected message from client; disconnecting");
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
