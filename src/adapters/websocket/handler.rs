//! WebSocket upgrade handler for browser connections.
//!
//! Handles the HTTP → WebSocket upgrade and the connection lifecycle:
//! 1. Validate the `(project_id, connection_id)` identity
//! 2. Upgrade to WebSocket
//! 3. Open and register the connection pump
//! 4. Forward inbound frames until the pump closes
//! 5. Release the transport

use std::sync::Arc;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::StreamExt;

use crate::adapters::http::event::{ConnectParams, EventApiError};
use crate::domain::{ConnectionId, ConnectionIdentity, ProjectId};

use super::manager::ConnectionManager;
use super::pump::{FrameSink, FrameStream};

/// Request header carrying the client-chosen connection id.
pub const CONNECTION_ID_HEADER: &str = "connection_id";

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /event/ws?project_id=...` with a `connection_id` header.
///
/// Identity is checked before the upgrade so a missing part is a plain
/// 400 response. A request with a valid identity that is not an upgrade
/// is rejected the same way.
pub async fn ws_handler(
    State(connections): State<Arc<ConnectionManager>>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, EventApiError> {
    let identity = identity_from_request(params, &headers)?;
    let ws = ws.ok_or(EventApiError::UpgradeRequired)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity, connections)))
}

fn identity_from_request(
    params: ConnectParams,
    headers: &HeaderMap,
) -> Result<ConnectionIdentity, EventApiError> {
    let project_id = ProjectId::new(params.project_id.unwrap_or_default())?;
    let connection_id = ConnectionId::new(
        headers
            .get(CONNECTION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default(),
    )?;

    Ok(ConnectionIdentity::new(project_id, connection_id))
}

/// Drive one upgraded socket until its pump closes.
async fn handle_socket(
    socket: WebSocket,
    identity: ConnectionIdentity,
    connections: Arc<ConnectionManager>,
) {
    let (sink, stream) = socket.split();
    let sink: FrameSink = Box::pin(sink);
    let stream: FrameStream = Box::pin(stream);

    let pump = connections.open(identity, sink, stream);
    let closed = pump.close_signal();

    let inbound = tokio::spawn({
        let pump = pump.clone();
        async move { pump.run_inbound_pump().await }
    });

    // The inbound pump only returns once the pump is closing.
    if let Err(e) = inbound.await {
        tracing::error!(connection = %pump.identity(), error = %e, "Inbound pump task failed");
        pump.cancel();
    }

    closed.wait().await;
    pump.release().await;
}
