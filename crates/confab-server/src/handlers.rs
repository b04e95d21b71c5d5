//! Connection handlers for the confab relay.
//!
//! Each WebSocket connection gets one task that owns its [`Session`]
//! state machine, drains its outbound queue into the socket, and feeds
//! inbound frames to the coordinator. All outbound traffic - acks,
//! rejections, meta updates, relayed messages - flows through the
//! switchboard queue so per-room ordering survives the trip.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::switchboard::Switchboard;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use confab_core::{Coordinator, EventSink, Session};
use confab_protocol::{codec, codes, Frame, PROTOCOL_VERSION};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The session coordinator.
    pub coordinator: Coordinator,
    /// Outbound delivery switchboard.
    pub switchboard: Arc<Switchboard>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let switchboard = Arc::new(Switchboard::new());
        Self {
            coordinator: Coordinator::new(switchboard.clone()),
            switchboard,
            config,
        }
    }
}

/// Run the relay server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("confab relay listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config))).await
}

/// Serve on an already-bound listener.
///
/// Split out of [`run_server`] so tests can run the relay on an
/// ephemeral port.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let app = Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.coordinator.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": stats.rooms,
        "members": stats.connections,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> axum::response::Response {
    if state.switchboard.len() >= state.config.limits.max_connections {
        warn!("Connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    ws.on_upgrade(move |socket| handle_websocket(socket, state))
        .into_response()
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    // Connection ids come from the transport layer; nanosecond
    // timestamps are unique enough for one process.
    let connection_id = format!(
        "conn_{:x}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let connected = Frame::connected(
        &connection_id,
        PROTOCOL_VERSION.major,
        state.config.heartbeat.interval_ms as u32,
    );
    if send_frame(&mut sender, &connected).await.is_err() {
        warn!(connection = %connection_id, "Failed to send Connected frame");
        return;
    }

    let (line, mut outbound) = mpsc::unbounded_channel::<Frame>();
    state.switchboard.attach(&connection_id, line);

    let mut session = Session::new(connection_id.clone());
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            // Drain frames queued for this connection
            Some(frame) = outbound.recv() => {
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if data.len() > state.config.limits.max_message_size {
                            warn!(connection = %connection_id, size = data.len(), "Inbound message too large");
                            metrics::record_error("oversized");
                            break;
                        }
                        read_buffer.extend_from_slice(&data);
                        if !drain_frames(&mut read_buffer, &mut session, &state) {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Treat text as binary
                        read_buffer.extend_from_slice(text.as_bytes());
                        if !drain_frames(&mut read_buffer, &mut session, &state) {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Best-effort flush of anything still queued (e.g. a final error
    // frame) before tearing the connection down.
    while let Ok(frame) = outbound.try_recv() {
        if send_frame(&mut sender, &frame).await.is_err() {
            break;
        }
    }

    // Cleanup: detach the outbound line first so fan-outs racing the
    // disconnect drop harmlessly, then leave the room.
    state.switchboard.detach(&connection_id);
    state.coordinator.leave(&mut session);
    metrics::set_active_rooms(state.coordinator.stats().rooms);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode and handle every complete frame in the read buffer.
///
/// Returns `false` if the connection should be dropped: once the
/// framing is corrupt there is no way back into sync.
fn drain_frames(read_buffer: &mut BytesMut, session: &mut Session, state: &AppState) -> bool {
    loop {
        let start = Instant::now();
        match codec::decode_from(read_buffer) {
            Ok(Some(frame)) => {
                handle_frame(frame, session, state);
                metrics::record_frame_latency(start.elapsed().as_secs_f64());
            }
            Ok(None) => return true,
            Err(e) => {
                warn!(connection = %session.connection_id(), error = %e, "Protocol error");
                metrics::record_error("protocol");
                state.switchboard.deliver(
                    session.connection_id(),
                    Frame::error(0, codes::MALFORMED_FRAME, e.to_string()),
                );
                return false;
            }
        }
    }
}

/// Handle a decoded frame.
///
/// All responses are enqueued via the switchboard, never written to the
/// socket directly, so they interleave correctly with room fan-out.
fn handle_frame(frame: Frame, session: &mut Session, state: &AppState) {
    match frame {
        Frame::Join { id, username, room } => {
            debug!(connection = %session.connection_id(), room = %room, "Join request");

            match state.coordinator.join(session, id, &username, &room) {
                Ok(_) => {
                    metrics::record_join();
                    metrics::set_active_rooms(state.coordinator.stats().rooms);
                }
                Err(_) => {
                    // The coordinator already answered the requester.
                    metrics::record_join_rejection();
                }
            }
        }

        Frame::Send {
            id,
            room,
            body,
            author,
            sent_at,
        } => {
            match state
                .coordinator
                .relay(session, id, &room, &body, author.as_deref(), sent_at)
            {
                Ok(recipients) => metrics::record_relayed(body.len(), recipients),
                Err(_) => metrics::record_error("relay"),
            }
        }

        Frame::Ping { timestamp } => {
            state
                .switchboard
                .deliver(session.connection_id(), Frame::pong(timestamp));
        }

        Frame::Pong { .. } => {}

        other => {
            warn!(
                connection = %session.connection_id(),
                frame_type = ?other.frame_type(),
                "Unexpected frame type"
            );
        }
    }
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &Frame) -> Result<()> {
    let data = codec::encode(frame)?;
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
