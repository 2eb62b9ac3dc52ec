//! Protobuf adapter for the jili brand. The token is part of the URL, so
//! the player is logged in as soon as the socket opens.

use std::sync::Arc;

use gamehub_protocol::envelope;
use gamehub_session::Authenticator;
use gamehub_transport::{Connection, Frame};
use tracing::{debug, info};

use crate::GatewayError;
use crate::handler::{SessionGuard, authenticate, enter, next_frame};
use crate::server::ServerState;

pub(crate) async fn serve<A: Authenticator>(
    state: &ServerState<A>,
    conn: &Arc<dyn Connection>,
    token: &str,
) -> Result<(), GatewayError> {
    let session = authenticate(state, conn, token).await?;
    let _guard = SessionGuard::new(&state.manager, &session);
    enter(state, &session).await?;

    let idle = state.config.idle_timeout();
    while let Some(frame) = next_frame(conn, idle).await? {
        let Frame::Binary(data) = frame else {
            debug!(ident = %session.ident(), "ignoring text frame");
            continue;
        };
        let command = envelope::unpack(&data)?;
        state.manager.dispatch(&session, &command).await?;
    }

    info!(ident = %session.ident(), "connection closed");
    Ok(())
}
