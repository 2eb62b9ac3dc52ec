//! Engine.IO adapter for the inout brand.
//!
//! The token is checked before the socket says anything. The open packet
//! goes out straight away; the player is placed when the client sends `40`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gamehub_protocol::engineio::{self, Packet};
use gamehub_room::{RoomError, Session};
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

    session.send_text(engineio::open_frame(&session_id())).await?;

    let idle = state.config.idle_timeout();
    while let Some(frame) = next_frame(conn, idle).await? {
        let Frame::Text(text) = frame else {
            return Err(GatewayError::Handshake("binary frame on a text protocol".into()));
        };
        let packet = engineio::parse(&text)?;
        on_packet(state, &session, packet).await?;
    }

    info!(ident = %session.ident(), "connection closed");
    Ok(())
}

async fn on_packet<A: Authenticator>(
    state: &ServerState<A>,
    session: &Arc<Session>,
    packet: Packet<'_>,
) -> Result<(), GatewayError> {
    match packet.msg_type {
        "0" | engineio::PONG => Ok(()),
        engineio::PING => Ok(session.send_text(engineio::PONG).await?),
        engineio::CONNECT => on_connect(state, session).await,
        _ => on_custom(state, session, packet).await,
    }
}

/// `40`: acknowledge, then balance, placement and the profile frames.
async fn on_connect<A: Authenticator>(
    state: &ServerState<A>,
    session: &Arc<Session>,
) -> Result<(), GatewayError> {
    session.send_text(engineio::connect_ack(&session_id())).await?;
    enter(state, session).await?;
    session.send_text(engineio::my_data(session.player_id())).await?;
    session
        .send_text(engineio::currencies(&state.config.exchange_rates))
        .await?;
    Ok(())
}

async fn on_custom<A: Authenticator>(
    state: &ServerState<A>,
    session: &Arc<Session>,
    packet: Packet<'_>,
) -> Result<(), GatewayError> {
    let Some(response_type) = packet.response_type() else {
        debug!(ident = %session.ident(), msg_type = packet.msg_type, "unhandled message type");
        return Ok(());
    };
    if !packet.is_event() {
        return Ok(session.send_text(engineio::null_reply(&response_type)).await?);
    }

    let body = packet.body.unwrap_or("[]");
    let (action, data) = engineio::decode_event(body)?;
    let command = match action.as_str() {
        engineio::ACTION_LATENCY_TEST => {
            let reply = engineio::latency_reply(&response_type, now_millis());
            return Ok(session.send_text(reply).await?);
        }
        engineio::ACTION_GAME_SERVICE => {
            engineio::game_service_command(&response_type, data.as_ref())?
        }
        engineio::ACTION_BETS_HISTORY => {
            gamehub_protocol::Command::action(action.as_str(), b"{}".to_vec())
                .with_reply_to(response_type.as_str())
        }
        _ => {
            debug!(ident = %session.ident(), %action, "ignoring event");
            return Ok(());
        }
    };

    match state.manager.dispatch(session, &command).await {
        Ok(()) => Ok(()),
        Err(RoomError::Rejected(reason)) => {
            debug!(ident = %session.ident(), %reason, "command rejected");
            Ok(session
                .send_text(engineio::error_frame(&response_type, &reason))
                .await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// 20 hex characters of randomness.
fn session_id() -> String {
    let bytes: [u8; 10] = rand::random();
    hex::encode(bytes)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
