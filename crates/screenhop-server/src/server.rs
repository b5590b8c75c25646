//! The server control surface: open / run / quit / shutdown / config.
//!
//! `open()` acquires the primary driver, `run()` binds the listener and
//! serves until `quit()` is called from another task. The driver is a
//! single-writer resource: whatever path `run()` exits through, the driver
//! acquired by `open()` is released on the way out.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use screenhop_core::protocol::messages::ClipboardId;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::engine::Engine;
use crate::http;
use crate::link::PrimaryLink;
use crate::net::{self, NetError, WorkerSet};
use crate::primary::{PrimaryError, PrimaryScreen};

/// Deadline for joining workers during a graceful stop.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Error type for the control surface.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Primary(#[from] PrimaryError),

    #[error(transparent)]
    Bind(#[from] NetError),

    /// `run()` was called before a successful `open()`.
    #[error("server must be opened before run()")]
    NotOpened,
}

/// The input-redirection server.
///
/// Owns the engine, the configuration, the primary driver handle, and the
/// worker set. Methods are callable from any task; `Server` is normally held
/// in an `Arc` shared with the signal handler that calls `quit`.
pub struct Server {
    engine: Engine,
    config: Arc<Mutex<ServerConfig>>,
    primary: Arc<dyn PrimaryScreen>,
    workers: Arc<WorkerSet>,
    cancel: CancellationToken,
    opened: AtomicBool,
}

impl Server {
    /// Validates the configuration and assembles the server around the given
    /// primary driver.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] wrapped in [`ServerError::Config`]
    /// for a rejected configuration.
    pub fn new(config: ServerConfig, primary: Arc<dyn PrimaryScreen>) -> Result<Self, ServerError> {
        config.validate()?;

        let engine = Engine::new(
            &config.name,
            primary.shape(),
            primary.cursor_pos(),
            Arc::new(PrimaryLink::new(Arc::clone(&primary))),
            config.build_edges()?,
        );
        engine.apply_topology(
            config.build_edges()?,
            config.command_keys(),
            config.scroll_lock_locks_cursor,
            &config.known_names(),
        );

        let cancel = CancellationToken::new();
        Ok(Self {
            engine,
            config: Arc::new(Mutex::new(config)),
            primary,
            workers: Arc::new(WorkerSet::new(cancel.clone())),
            cancel,
            opened: AtomicBool::new(false),
        })
    }

    /// Acquires the primary screen driver.
    ///
    /// # Errors
    ///
    /// Returns [`PrimaryError::Unavailable`] if another instance holds the
    /// driver.
    pub fn open(&self) -> Result<(), ServerError> {
        self.primary.open()?;
        self.opened.store(true, Ordering::SeqCst);
        info!(name = %self.engine.primary_name(), "primary screen acquired");
        Ok(())
    }

    /// Binds the listener and serves clients until [`quit`](Server::quit).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotOpened`] without a preceding `open()`, and
    /// [`NetError::BindFailed`] (releasing the driver) when the listen
    /// address cannot be bound within the configured timeout.
    pub async fn run(&self) -> Result<(), ServerError> {
        if !self.opened.load(Ordering::SeqCst) {
            return Err(ServerError::NotOpened);
        }

        let (addr, bind_timeout, http_cfg) = {
            let cfg = self.config.lock().expect("config lock poisoned");
            let addr: SocketAddr = cfg
                .address
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("bad listen address {:?}", cfg.address)))?;
            (addr, Duration::from_secs(cfg.bind_timeout_secs), cfg.http.clone())
        };

        let listener = match net::bind_with_retry(addr, bind_timeout).await {
            Ok(listener) => listener,
            Err(e) => {
                self.release_primary();
                return Err(e.into());
            }
        };
        info!(%addr, "listening for clients");

        // The status surface is best-effort: losing it is not fatal to input
        // redirection.
        if http_cfg.enabled {
            match tokio::net::TcpListener::bind(&http_cfg.address).await {
                Ok(http_listener) => {
                    info!(address = %http_cfg.address, "status surface listening");
                    tokio::spawn(http::status_loop(
                        http_listener,
                        self.engine.clone(),
                        http_cfg.max_in_flight,
                        self.cancel.clone(),
                    ));
                }
                Err(e) => warn!(address = %http_cfg.address, error = %e, "status surface disabled"),
            }
        }

        net::accept_loop(
            listener,
            self.engine.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.workers),
        )
        .await;

        info!("server loop ended");
        Ok(())
    }

    /// Graceful stop: says goodbye to every client, cancels all workers,
    /// joins them with a deadline, and releases the primary driver. `run`
    /// returns once the accept loop observes the cancellation.
    pub async fn quit(&self) {
        info!("quit requested");
        self.engine.broadcast_close();
        self.cancel.cancel();
        self.workers.stop(STOP_TIMEOUT).await;
        self.release_primary();
    }

    /// Emergency stop: cancels everything with a short deadline and releases
    /// the driver; clients may not get goodbyes.
    pub async fn shutdown(&self) {
        warn!("emergency shutdown");
        self.cancel.cancel();
        self.workers.stop(Duration::from_millis(200)).await;
        self.release_primary();
    }

    fn release_primary(&self) {
        if self.opened.swap(false, Ordering::SeqCst) {
            self.primary.close();
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// Validates and installs a new configuration atomically: on any error
    /// the running state is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for structural problems, including
    /// an attempt to rename the primary at runtime.
    pub fn set_config(&self, new: ServerConfig) -> Result<(), ConfigError> {
        new.validate()?;
        if new.name != self.engine.primary_name() {
            return Err(ConfigError::Invalid(
                "primary screen name cannot change at runtime".to_string(),
            ));
        }
        let edges = new.build_edges()?;

        let mut cfg = self.config.lock().expect("config lock poisoned");
        self.engine.apply_topology(
            edges,
            new.command_keys(),
            new.scroll_lock_locks_cursor,
            &new.known_names(),
        );
        *cfg = new;
        info!("configuration replaced");
        Ok(())
    }

    /// Returns the configuration exactly as last accepted.
    pub fn get_config(&self) -> ServerConfig {
        self.config.lock().expect("config lock poisoned").clone()
    }

    pub fn primary_screen_name(&self) -> String {
        self.engine.primary_name().to_string()
    }

    /// Bitmask of primary edges that have configured neighbors.
    pub fn active_primary_sides(&self) -> u32 {
        self.engine.active_primary_sides()
    }

    /// Event entry points for the primary driver glue.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The primary driver signalled that it now owns the OS clipboard:
    /// read the contents and take server-side ownership.
    pub fn on_primary_clipboard(&self, id: ClipboardId) {
        let mirrored = {
            let cfg = self.config.lock().expect("config lock poisoned");
            cfg.clipboards.contains(&id)
        };
        if !mirrored {
            return;
        }
        let data = self.primary.read_clipboard(id);
        self.engine.update_primary_clipboard(id, data);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
