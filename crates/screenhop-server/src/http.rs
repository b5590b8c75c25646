//! Read-only HTTP status surface.
//!
//! A deliberately tiny HTTP/1.1 responder: `GET /status` (or `/`) returns a
//! JSON snapshot of the screens, the active screen, and recent events.
//! Concurrency is bounded by a semaphore sized from the configuration;
//! requests beyond the bound get an immediate 503 instead of queuing behind
//! a slow peer.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::Engine;

/// Longest request head the responder will buffer.
const MAX_REQUEST_BYTES: usize = 2048;

/// Serves status requests until cancelled.
pub async fn status_loop(
    listener: TcpListener,
    engine: Engine,
    max_in_flight: usize,
    cancel: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "http accept failed");
                    continue;
                }
            },
        };

        let engine = engine.clone();
        let permits = Arc::clone(&permits);
        tokio::spawn(async move {
            let _permit = match permits.try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(%peer, "status request shed: too many in flight");
                    let _ = respond(stream, "503 Service Unavailable", "").await;
                    return;
                }
            };
            if let Err(e) = serve_request(stream, &engine).await {
                debug!(%peer, error = %e, "status request failed");
            }
        });
    }
}

async fn serve_request(mut stream: TcpStream, engine: &Engine) -> std::io::Result<()> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let mut filled = 0;

    // Read until the end of the request head; the body (there is none for
    // GET) is ignored.
    loop {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Ok(());
        }
        filled += n;
        if buf[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if filled == buf.len() {
            return respond(stream, "431 Request Header Fields Too Large", "").await;
        }
    }

    let head = String::from_utf8_lossy(&buf[..filled]);
    let mut parts = head.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    if method != "GET" {
        return respond(stream, "405 Method Not Allowed", "").await;
    }
    match path {
        "/" | "/status" => {
            let body = serde_json::to_string_pretty(&engine.status_snapshot())
                .unwrap_or_else(|_| "{}".to_string());
            respond(stream, "200 OK", &body).await
        }
        _ => respond(stream, "404 Not Found", "").await,
    }
}

async fn respond(mut stream: TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
