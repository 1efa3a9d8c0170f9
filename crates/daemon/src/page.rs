// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-URL-prefix page: the WebSocket surface over a room registry.
//!
//! A page serves `GET {prefix}/ws?roomName=<name>`. Each accepted socket
//! gets a writer task (drains the session's outbound queue, sends a
//! heartbeat ping every 10 s) and a reader loop (text frames parse as JSON
//! and route to the room; anything else logs and closes). All lifecycle
//! cleanup funnels through the scoped [`RoomConnection`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parlor_adapters::Context;
use parlor_core::config::PageConfig;
use parlor_core::protocol::{Inbound, Outbound};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::rooms::{Room, RoomConnection, RoomRegistry};
use crate::session::SessionHandle;

/// Interval between server-initiated pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub struct Page {
    url: String,
    config: Arc<PageConfig>,
    context: Context,
    rooms: RoomRegistry,
    next_session_id: AtomicU64,
}

impl Page {
    pub fn new(context: Context, config: PageConfig, url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.trim_end_matches('/').to_string(),
            config: Arc::new(config),
            context,
            rooms: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            next_session_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path this page's WebSocket endpoint answers on.
    pub fn ws_path(&self) -> String {
        format!("{}/ws", self.url)
    }

    /// Names of the rooms currently registered (tests and introspection).
    pub async fn room_names(&self) -> Vec<String> {
        self.rooms.lock().await.keys().cloned().collect()
    }

    /// Drive one accepted WebSocket session to completion.
    pub async fn serve(self: Arc<Self>, stream: WebSocketStream<TcpStream>, room_name: String) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        info!(page = %self.url, room = %room_name, session_id, "session connected");

        let (session, outbound_rx) = SessionHandle::new(session_id);
        let (sink, ws_stream) = stream.split();
        let writer = tokio::spawn(write_loop(sink, outbound_rx));

        let connection = RoomConnection::attach(
            Arc::clone(&self.rooms),
            self.context.clone(),
            Arc::clone(&self.config),
            room_name.clone(),
            session,
        )
        .await;
        let connection = match connection {
            Ok(connection) => connection,
            Err(error) => {
                warn!(room = %room_name, session_id, error = %error, "failed to join room");
                let _ = writer.await;
                return;
            }
        };

        read_loop(ws_stream, connection.room(), session_id).await;
        connection.detach().await;

        info!(page = %self.url, room = %room_name, session_id, "session closed");
        let _ = writer.await;
    }
}

/// Receive until the client disconnects or sends something unroutable.
async fn read_loop(
    mut stream: SplitStream<WebSocketStream<TcpStream>>,
    room: &Arc<Room>,
    session_id: u64,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let inbound: Inbound = match serde_json::from_str(text.as_str()) {
                    Ok(inbound) => inbound,
                    Err(error) => {
                        warn!(session_id, error = %error, "malformed message, closing session");
                        break;
                    }
                };
                debug!(session_id, executor = %inbound.executor, "routing message");
                if let Err(error) = room.handle_message(inbound).await {
                    warn!(session_id, error = %error, "message rejected, closing session");
                    break;
                }
            }
            // Control frames; tungstenite answers pings on the next write.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(session_id, "client closed");
                break;
            }
            Ok(other) => {
                warn!(session_id, kind = ?other, "unexpected message, closing session");
                break;
            }
            Err(error) => {
                debug!(session_id, error = %error, "websocket error");
                break;
            }
        }
    }
}

/// Drain the outbound queue into the socket; ping on the heartbeat.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.reset();

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                let Ok(text) = serde_json::to_string(&message) else { continue };
                if sink.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}
