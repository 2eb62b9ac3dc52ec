//! Per-connection handling shared by every brand.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Route the upgrade path to a brand adapter
//!   2. The adapter runs its connect sequence and calls [`authenticate`] and
//!      [`enter`] (the login pipeline)
//!   3. The adapter loops, turning frames into commands for
//!      [`RoomManager::dispatch`](gamehub_room::RoomManager::dispatch)
//!   4. On exit the session guard reports the disconnect

use std::sync::Arc;
use std::time::Duration;

use gamehub_protocol::GameBrand;
use gamehub_room::{RoomManager, Session};
use gamehub_session::Authenticator;
use gamehub_session::ledger::{BalanceRequest, RtpRequest};
use gamehub_transport::{Connection, Frame, RequestTarget, WebSocketConnection};

use crate::GatewayError;
use crate::adapters;
use crate::server::ServerState;

/// Which adapter serves a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    /// `/{game}/io?Authorization=<token>`
    EngineIo { token: String },
    /// `/{game}/websocket`; the token arrives in the login frame.
    Sfs,
    /// `/{game}/ws/{token}`
    Protobuf { token: String },
}

/// Matches the upgrade path against the routes of `brand`.
pub(crate) fn route(target: &RequestTarget, game: &str, brand: GameBrand) -> Option<Route> {
    let segments: Vec<&str> = target.segments().collect();
    match (brand, segments.as_slice()) {
        (GameBrand::Inout, [g, "io"]) if *g == game => Some(Route::EngineIo {
            token: target.query_param("Authorization").unwrap_or_default().to_owned(),
        }),
        (GameBrand::Spribe | GameBrand::Jdb, [g, "websocket"]) if *g == game => Some(Route::Sfs),
        (GameBrand::Jili, [g, "ws", token]) if *g == game => Some(Route::Protobuf {
            token: (*token).to_owned(),
        }),
        _ => None,
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A: Authenticator>(
    conn: WebSocketConnection,
    target: RequestTarget,
    state: Arc<ServerState<A>>,
) -> Result<(), GatewayError> {
    let conn: Arc<dyn Connection> = Arc::new(conn);
    let conn_id = conn.id();

    let Some(route) = route(&target, &state.config.game_name, state.config.brand) else {
        tracing::debug!(%conn_id, path = %target.path, "no route");
        let _ = conn.close().await;
        return Err(GatewayError::UnknownRoute(target.path));
    };
    tracing::debug!(%conn_id, ?route, "handling new connection");

    let result = match route {
        Route::EngineIo { token } => adapters::inout::serve(&state, &conn, &token).await,
        Route::Sfs => adapters::sfs::serve(&state, &conn).await,
        Route::Protobuf { token } => adapters::jili::serve(&state, &conn, &token).await,
    };

    let _ = conn.close().await;
    result
}

// ---------------------------------------------------------------------------
// Login pipeline
// ---------------------------------------------------------------------------

/// Verifies `token` and builds a session bound to `conn`: identity, then
/// profile, then RTP tier. The session is not placed anywhere yet.
pub(crate) async fn authenticate<A: Authenticator>(
    state: &ServerState<A>,
    conn: &Arc<dyn Connection>,
    token: &str,
) -> Result<Arc<Session>, GatewayError> {
    let claims = state.auth.authenticate(token).await?;
    let identity = claims.identity;
    let profile = state.services.profiles.load(&identity).await?;
    let rtp = state
        .services
        .rtp
        .player_rtp(RtpRequest {
            player_id: identity.player_id.clone(),
            app_id: identity.app_id.clone(),
            game_brand: state.config.brand.to_string(),
            game_id: state.config.game_name.clone(),
        })
        .await?;

    let session = state
        .manager
        .new_session(identity, profile, rtp)
        .with_connection(Arc::clone(conn));
    tracing::debug!(ident = %session.ident(), rtp = %session.rtp_tier(), "player authenticated");
    Ok(Arc::new(session))
}

/// Fetches the opening balance and hands the session to the room manager.
pub(crate) async fn enter<A: Authenticator>(
    state: &ServerState<A>,
    session: &Arc<Session>,
) -> Result<(), GatewayError> {
    let reply = state
        .services
        .ledger
        .balance(
            session.app_id(),
            BalanceRequest {
                player_id: session.player_id().to_owned(),
                currency: session.currency().to_owned(),
            },
        )
        .await?;
    session.set_balance_by_balance_reply(&reply).await;

    state.manager.login(session).await?;
    tracing::info!(
        ident = %session.ident(),
        brand = %session.brand(),
        balance = session.balance(),
        "player logged in"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Session guard
// ---------------------------------------------------------------------------

/// Drop guard that reports a session's disconnect when its handler exits.
///
/// Covers every exit path, panics included. `Drop` is synchronous, so the
/// async call runs on a spawned task.
pub(crate) struct SessionGuard {
    manager: Arc<RoomManager>,
    session: Arc<Session>,
}

impl SessionGuard {
    pub(crate) fn new(manager: &Arc<RoomManager>, session: &Arc<Session>) -> Self {
        Self {
            manager: Arc::clone(manager),
            session: Arc::clone(session),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let manager = Arc::clone(&self.manager);
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            if let Err(e) = manager.on_disconnect(&session).await {
                tracing::debug!(ident = %session.ident(), error = %e, "disconnect hook failed");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Frame helpers
// ---------------------------------------------------------------------------

/// Receives the next frame, giving up after `limit`.
///
/// `Ok(None)` means the peer went away (or was force-closed).
pub(crate) async fn next_frame(
    conn: &Arc<dyn Connection>,
    limit: Option<Duration>,
) -> Result<Option<Frame>, GatewayError> {
    let Some(limit) = limit else {
        return Ok(conn.recv().await?);
    };
    match tokio::time::timeout(limit, conn.recv()).await {
        Ok(frame) => Ok(frame?),
        Err(_) => {
            tracing::info!(conn_id = %conn.id(), "connection timed out");
            Ok(None)
        }
    }
}

/// Like [`next_frame`] but a missing frame is a broken connect sequence.
pub(crate) async fn expect_frame(
    conn: &Arc<dyn Connection>,
    limit: Duration,
    stage: &str,
) -> Result<Frame, GatewayError> {
    next_frame(conn, Some(limit))
        .await?
        .ok_or_else(|| GatewayError::Handshake(format!("connection closed before {stage}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(path: &str, query: Option<&str>) -> RequestTarget {
        RequestTarget::new(path, query.map(str::to_owned))
    }

    #[test]
    fn test_route_engineio_reads_authorization() {
        let t = target("/crash/io", Some("operatorId=7&Authorization=abc"));
        assert_eq!(
            route(&t, "crash", GameBrand::Inout),
            Some(Route::EngineIo { token: "abc".into() })
        );
    }

    #[test]
    fn test_route_engineio_missing_token_is_empty() {
        let t = target("/crash/io", None);
        assert_eq!(
            route(&t, "crash", GameBrand::Inout),
            Some(Route::EngineIo { token: String::new() })
        );
    }

    #[test]
    fn test_route_sfs_for_both_brands() {
        let t = target("/aviator/websocket", None);
        assert_eq!(route(&t, "aviator", GameBrand::Spribe), Some(Route::Sfs));
        assert_eq!(route(&t, "aviator", GameBrand::Jdb), Some(Route::Sfs));
    }

    #[test]
    fn test_route_protobuf_token_from_path() {
        let t = target("/fish/ws/deadbeef", None);
        assert_eq!(
            route(&t, "fish", GameBrand::Jili),
            Some(Route::Protobuf { token: "deadbeef".into() })
        );
    }

    #[test]
    fn test_route_wrong_game_or_brand_is_none() {
        assert_eq!(route(&target("/other/io", None), "crash", GameBrand::Inout), None);
        assert_eq!(route(&target("/crash/io", None), "crash", GameBrand::Jili), None);
        assert_eq!(route(&target("/crash/ws", None), "crash", GameBrand::Jili), None);
        assert_eq!(route(&target("/", None), "crash", GameBrand::Inout), None);
    }
}
