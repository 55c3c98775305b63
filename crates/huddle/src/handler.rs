//! Per-connection handler: token check and hand-off to the room.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Read the participant token from the upgrade target's `?token=`
//!   2. Verify it and look up the room it names
//!   3. Attach the connection to the room, which spawns its read and write
//!      tasks and takes over from here
//!
//! A connection that fails step 1 or 2 is closed right away with a reason
//! the client can act on.

use std::sync::Arc;

use huddle_protocol::CloseReason;
use huddle_session::TokenService;
use huddle_transport::{Connection, FrameWriter, WebSocketConnection};

use crate::HuddleError;
use crate::server::ServerState;

/// Handles a single connection from upgrade to hand-off.
pub(crate) async fn handle_connection<T: TokenService>(
    conn: WebSocketConnection,
    state: Arc<ServerState<T>>,
) -> Result<(), HuddleError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let Some(token) = conn.query_param("token").filter(|t| !t.is_empty()) else {
        return refuse(conn, CloseReason::TokenMissing).await;
    };

    let claims = match state.tokens.verify_participant(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "upgrade token rejected");
            return refuse(conn, CloseReason::TokenInvalid).await;
        }
    };

    let Some(room) = state.registry.get_room(&claims.room_id).await else {
        return refuse(conn, CloseReason::RoomNotExists).await;
    };

    tracing::debug!(
        %conn_id,
        room_id = %claims.room_id,
        participant_id = %claims.participant_id,
        "attaching connection"
    );
    room.attach(claims.participant_id, &claims.username, conn)
        .await;
    Ok(())
}

async fn refuse(conn: WebSocketConnection, reason: CloseReason) -> Result<(), HuddleError> {
    tracing::debug!(conn_id = %conn.id(), %reason, "connection refused");
    let (_, mut writer) = conn.split();
    writer.close(Some(reason.as_str())).await?;
    Ok(())
}
