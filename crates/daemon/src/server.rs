// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server boot and the accept loop.
//!
//! Boot order: acquire the backend context, build one [`Page`] per
//! configured URL prefix, bind the listener, then accept until the
//! shutdown signal (SIGINT/SIGTERM) fires. Every connection is routed to
//! its page during the WebSocket handshake, so bad requests are rejected
//! with a proper HTTP status before any room state is touched. A
//! per-session failure never exits the server.

use std::sync::Arc;

use parking_lot::Mutex;
use parlor_adapters::{BackendError, Context};
use parlor_core::config::ServerConfig;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::page::Page;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
}

pub struct Server {
    config: ServerConfig,
    pages: Vec<Arc<Page>>,
}

impl Server {
    pub fn new(config: ServerConfig, context: Context) -> Self {
        let pages = config
            .pages
            .iter()
            .map(|(url, page_config)| {
                debug!(page = %url, "adding page");
                Page::new(context.clone(), page_config.clone(), url)
            })
            .collect();
        Self { config, pages }
    }

    pub fn pages(&self) -> &[Arc<Page>] {
        &self.pages
    }

    /// Bind the configured address and accept until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        self.serve(listener, shutdown).await
    }

    /// Accept loop over an already-bound listener (tests bind port 0).
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection accepted");
                        let pages = self.pages.clone();
                        tokio::spawn(handle_connection(stream, pages));
                    }
                    Err(accept_error) => error!(error = %accept_error, "accept error"),
                },
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, closing listener");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Acquire a context, run the server, release the context on all paths.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let context = Context::acquire(&config.context).await?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    let result = Server::new(config, context.clone()).run(shutdown).await;
    context.release();
    result
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(signal_error) => {
                error!(error = %signal_error, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = terminate.recv() => info!("received SIGTERM"),
        }
        shutdown.cancel();
    });
}

/// Perform the WebSocket handshake, routing and validating in the callback
/// so failures surface as HTTP responses, then hand the socket to its page.
async fn handle_connection(stream: TcpStream, pages: Vec<Arc<Page>>) {
    let route: Arc<Mutex<Option<(Arc<Page>, String)>>> = Arc::new(Mutex::new(None));
    let callback = {
        let route = Arc::clone(&route);
        move |request: &Request, response: Response| {
            let path = request.uri().path();
            let Some(page) = pages.iter().find(|page| page.ws_path() == path) else {
                return Err(error_response(404, "unknown page"));
            };
            let Some(room_name) = query_param(request.uri().query(), "roomName") else {
                return Err(error_response(400, "Missing roomName"));
            };
            *route.lock() = Some((Arc::clone(page), room_name));
            Ok(response)
        }
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(handshake_error) => {
            debug!(error = %handshake_error, "handshake failed");
            return;
        }
    };
    let Some((page, room_name)) = route.lock().take() else {
        return;
    };
    page.serve(ws, room_name).await;
}

fn error_response(status: u16, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::from_u16(status)
        .unwrap_or(tokio_tungstenite::tungstenite::http::StatusCode::BAD_REQUEST);
    response
}

/// Pull one parameter out of a query string, percent-decoded.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if key == name {
            return Some(percent_decode(value));
        }
    }
    None
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).and_then(|pair| {
                    std::str::from_utf8(pair).ok().and_then(|s| u8::from_str_radix(s, 16).ok())
                });
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
