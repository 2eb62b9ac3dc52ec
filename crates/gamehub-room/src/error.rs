//! Error types for the room layer.

use gamehub_protocol::RoomId;
use gamehub_session::SessionError;

use crate::TableMatcher;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No free seat. During RTP matching this moves the scan on to the
    /// next candidate room.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The player already holds a seat in this room.
    #[error("player {0} already in room {1}")]
    AlreadyInRoom(String, RoomId),

    /// The player has no seat in this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(String, RoomId),

    /// Game-specific refusal (precondition failed, bad command, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The room was disposed; it accepts no further calls.
    #[error("room {0} is disposed")]
    Disposed(RoomId),

    /// The room's command channel closed without a dispose.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// The manager cannot log a player in under this matcher on its own.
    #[error("table matcher {0} needs a lobby")]
    UnsupportedMatcher(TableMatcher),

    /// A session call (send, ledger) failed inside a room operation.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl RoomError {
    /// Whether the room is gone for good, as opposed to refusing one call.
    pub fn is_stale_room(&self) -> bool {
        matches!(self, RoomError::Disposed(_) | RoomError::Unavailable(_))
    }
}
