//! SFS adapter for the spribe and jdb brands.
//!
//! Connect sequence:
//!
//! | stage | client sends | server answers |
//! |---|---|---|
//! | handshake | `c=0 a=0` | `{ct, ms, tk}` |
//! | login | `c=0 a=1 p.p.token` (spribe) | nothing; the room greets the player |
//! | login | `c=0 a=1 un/zn` (jdb) | `{id, pi, rl, rs, un, zn}` |
//! | game login | `c=1 a=13 c=gameLogin p.sessionID3` (jdb only) | nothing |
//!
//! After that spribe routes every frame to the room; jdb echoes pings
//! (`c=0 a=29`) and routes extension requests only.

use std::sync::Arc;

use gamehub_protocol::GameBrand;
use gamehub_protocol::sfs::{
    ACTION_EXTENSION, ACTION_HANDSHAKE, ACTION_LOGIN, ACTION_PING, CONTROLLER_EXTENSION,
    CONTROLLER_SYSTEM, SfsMessage, SfsObject, SfsValue,
};
use gamehub_room::Session;
use gamehub_session::Authenticator;
use gamehub_transport::{Connection, Frame};
use tracing::{debug, info};

use crate::GatewayError;
use crate::handler::{SessionGuard, authenticate, enter, expect_frame, next_frame};
use crate::server::ServerState;

/// The extension command jdb clients log in with.
const JDB_GAME_LOGIN: &str = "gameLogin";

pub(crate) async fn serve<A: Authenticator>(
    state: &ServerState<A>,
    conn: &Arc<dyn Connection>,
) -> Result<(), GatewayError> {
    let limit = state.config.login_timeout();

    let hello = read_message(expect_frame(conn, limit, "handshake").await?)?;
    if !hello.is(CONTROLLER_SYSTEM, ACTION_HANDSHAKE) {
        return Err(GatewayError::Handshake(format!(
            "expected handshake, got c={} a={}",
            hello.controller, hello.action
        )));
    }
    conn.send(Frame::Binary(handshake_reply().to_packet())).await?;

    let login = read_message(expect_frame(conn, limit, "login").await?)?;
    if !login.is(CONTROLLER_SYSTEM, ACTION_LOGIN) {
        return Err(GatewayError::Handshake("login action error".into()));
    }

    let token = match state.config.brand {
        GameBrand::Jdb => {
            conn.send(Frame::Binary(zone_login_reply(&login.params).to_packet()))
                .await?;
            let game_login = read_message(expect_frame(conn, limit, "game login").await?)?;
            jdb_token(&game_login)?
        }
        _ => spribe_token(&login)?,
    };

    let session = authenticate(state, conn, &token).await?;
    let _guard = SessionGuard::new(&state.manager, &session);
    enter(state, &session).await?;

    let idle = state.config.idle_timeout();
    while let Some(frame) = next_frame(conn, idle).await? {
        on_frame(state, &session, frame).await?;
    }

    info!(ident = %session.ident(), "connection closed");
    Ok(())
}

async fn on_frame<A: Authenticator>(
    state: &ServerState<A>,
    session: &Arc<Session>,
    frame: Frame,
) -> Result<(), GatewayError> {
    let message = SfsMessage::from_packet(frame.as_bytes())?;

    if state.config.brand == GameBrand::Jdb {
        if message.is(CONTROLLER_SYSTEM, ACTION_PING) {
            return Ok(session.send(frame).await?);
        }
        if !message.is(CONTROLLER_EXTENSION, ACTION_EXTENSION) {
            debug!(
                ident = %session.ident(),
                controller = message.controller,
                action = message.action,
                "unhandled message"
            );
            return Ok(());
        }
    }

    let command = message.into_command()?;
    state.manager.dispatch(session, &command).await?;
    Ok(())
}

fn read_message(frame: Frame) -> Result<SfsMessage, GatewayError> {
    Ok(SfsMessage::from_packet(frame.as_bytes())?)
}

fn handshake_reply() -> SfsMessage {
    let token: [u8; 16] = rand::random();
    let params = SfsObject::new()
        .with("ct", SfsValue::Int(1024))
        .with("ms", SfsValue::Int(500_000))
        .with("tk", hex::encode(token));
    SfsMessage::new(CONTROLLER_SYSTEM, ACTION_HANDSHAKE, params)
}

/// jdb's zone login answer, echoing the user and zone names.
fn zone_login_reply(request: &SfsObject) -> SfsMessage {
    let params = SfsObject::new()
        .with("id", SfsValue::Int(50))
        .with("pi", SfsValue::Short(0))
        .with("rl", SfsValue::Array(Vec::new()))
        .with("rs", SfsValue::Short(0))
        .with("un", request.get_str("un").unwrap_or_default())
        .with("zn", request.get_str("zn").unwrap_or_default());
    SfsMessage::new(CONTROLLER_SYSTEM, ACTION_LOGIN, params)
}

/// The login params carry the client environment in a nested `p` object,
/// token included.
fn spribe_token(login: &SfsMessage) -> Result<String, GatewayError> {
    login
        .params
        .get_object("p")
        .and_then(|p| p.get_str("token"))
        .map(str::to_owned)
        .ok_or_else(|| GatewayError::Handshake("login without token".into()))
}

fn jdb_token(message: &SfsMessage) -> Result<String, GatewayError> {
    let is_game_login = message.is(CONTROLLER_EXTENSION, ACTION_EXTENSION)
        && message.params.get_str("c") == Some(JDB_GAME_LOGIN);
    if !is_game_login {
        return Err(GatewayError::Handshake("expected gameLogin".into()));
    }
    message
        .params
        .get_object("p")
        .and_then(|p| p.get_str("sessionID3"))
        .map(str::to_owned)
        .ok_or_else(|| GatewayError::Handshake("gameLogin without sessionID3".into()))
}
