//! The seams between the manager and game code: [`Room`], [`RoomCreator`]
//! and the optional [`Lobby`].

use std::fmt;
use std::sync::Arc;

use gamehub_protocol::{Command, RoomId};
use gamehub_session::PlayerSession;
use serde::{Deserialize, Serialize};

use crate::{RoomError, RoomManager};

/// A player session as the room layer sees it.
pub type Session = PlayerSession<dyn Room, RoomManager>;

// ---------------------------------------------------------------------------
// Matching policy
// ---------------------------------------------------------------------------

/// How the manager places a logging-in player into a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMatcher {
    /// Long-lived shared rooms bucketed by `app_id-rtp`.
    #[default]
    Rtp,
    /// One fresh room per login, disposed when its occupant exits.
    Single,
    /// Placement is done by a [`Lobby`].
    Custom,
}

impl TableMatcher {
    /// The registry key a session is matched under. Empty means the room is
    /// never registered for reuse.
    pub fn match_key(self, session: &Session) -> String {
        match self {
            TableMatcher::Rtp => format!("{}-{}", session.app_id(), session.rtp_tier()),
            TableMatcher::Single | TableMatcher::Custom => String::new(),
        }
    }

    /// Creation arguments for a fresh room holding `session`.
    pub fn room_args(self, session: &Session) -> RoomArgs {
        match self {
            TableMatcher::Rtp => RoomArgs::Rtp {
                app_id: session.app_id().to_owned(),
                rtp: session.rtp_tier().to_owned(),
                currency: session.currency().to_owned(),
            },
            TableMatcher::Single | TableMatcher::Custom => RoomArgs::Single {
                app_id: session.app_id().to_owned(),
            },
        }
    }
}

impl fmt::Display for TableMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableMatcher::Rtp => "rtp",
            TableMatcher::Single => "single",
            TableMatcher::Custom => "custom",
        })
    }
}

/// What a [`RoomCreator`] is told about the room it must build.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomArgs {
    Rtp {
        app_id: String,
        rtp: String,
        currency: String,
    },
    Single {
        app_id: String,
    },
    /// Lobby-defined arguments.
    Custom(serde_json::Value),
}

// ---------------------------------------------------------------------------
// Room contract
// ---------------------------------------------------------------------------

/// A game room, as driven by the [`RoomManager`].
///
/// Per occupant the manager walks `join → (disconnect ⇄ reconnect) → exit`.
/// It never calls `on_message` or `on_disconnect` for a session not bound
/// to this room, and never calls `on_join` twice for one session without an
/// exit in between. Rooms are shared between many connection tasks, so
/// implementations must be `Sync`; [`ActorRoom`](crate::ActorRoom) gets
/// there by funnelling every call through one task.
///
/// Once [`on_dispose`](Self::on_dispose) has run, every other call must
/// fail with [`RoomError::Disposed`].
#[async_trait::async_trait]
pub trait Room: Send + Sync + 'static {
    fn room_id(&self) -> RoomId;

    /// Occupied seats, connected or not.
    fn player_count(&self) -> usize;

    /// Seats the player. An error means "not here": during RTP matching
    /// the manager tries the next room.
    async fn on_join(&self, session: &Arc<Session>) -> Result<(), RoomError>;

    /// `session` replaces the previous session of the same identity.
    async fn on_reconnect(&self, session: &Arc<Session>) -> Result<(), RoomError>;

    async fn on_disconnect(&self, session: &Arc<Session>) -> Result<(), RoomError>;

    async fn on_message(&self, session: &Arc<Session>, command: &Command) -> Result<(), RoomError>;

    /// The player left for good; free their seat now. Shared rooms get
    /// this from [`RoomManager::exit_room`](crate::RoomManager::exit_room),
    /// single-use rooms are disposed instead. A room that keeps no seats
    /// can rely on the default, which does nothing.
    async fn on_leave(&self, _session: &Arc<Session>) -> Result<(), RoomError> {
        Ok(())
    }

    /// Releases the room. Single-use rooms only.
    async fn on_dispose(&self);
}

/// Builds rooms for the manager when no existing room accepts a player.
#[async_trait::async_trait]
pub trait RoomCreator: Send + Sync + 'static {
    async fn create_room(&self, room_id: RoomId, args: &RoomArgs) -> Result<Arc<dyn Room>, RoomError>;
}

/// A pre-room step for brands that pick tables themselves.
///
/// When a lobby is installed, [`RoomManager::login`] hands every login to
/// it, and every inbound command is offered to it before the room sees it.
/// The lobby places players with [`RoomManager::try_reconnect`] and
/// [`RoomManager::join`] under keys of its own choosing.
#[async_trait::async_trait]
pub trait Lobby: Send + Sync + 'static {
    async fn on_login(&self, manager: &Arc<RoomManager>, session: &Arc<Session>) -> Result<(), RoomError>;

    async fn on_message(
        &self,
        manager: &Arc<RoomManager>,
        session: &Arc<Session>,
        command: &Command,
    ) -> Result<(), RoomError>;
}
