//! Core types shared by every layer of the gateway.
//!
//! Identities name players and rooms; [`GameBrand`] names the third-party
//! integration a connection speaks; [`Command`] is the decoded, brand-free
//! shape of one inbound client message.

use std::fmt;
use std::str::FromStr;

use gamehub_transport::Frame;
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, engineio};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The system-wide identity of a player: an operator application plus the
/// player's id inside that application.
///
/// Two sessions with equal identities are the same logical player, even if
/// they arrived on different connections. [`ident`](Self::ident) is the
/// string used as a map key everywhere (`"{app_id}-{player_id}"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub app_id: String,
    pub player_id: String,
}

impl PlayerIdentity {
    pub fn new(app_id: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            player_id: player_id.into(),
        }
    }

    /// Map key for this identity.
    pub fn ident(&self) -> String {
        format!("{}-{}", self.app_id, self.player_id)
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.app_id, self.player_id)
    }
}

/// A unique identifier for a room instance.
///
/// Serialized as a plain number (`#[serde(transparent)]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GameBrand
// ---------------------------------------------------------------------------

/// A third-party game integration, each with its own wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameBrand {
    /// Engine.IO-style numeric-prefixed JSON text frames.
    Inout,
    /// Binary object-packed frames.
    Spribe,
    /// Binary object-packed frames with a second game-login stage.
    Jdb,
    /// Protobuf `Command{type, data}` envelopes.
    Jili,
}

impl GameBrand {
    pub fn as_str(self) -> &'static str {
        match self {
            GameBrand::Inout => "inout",
            GameBrand::Spribe => "spribe",
            GameBrand::Jdb => "jdb",
            GameBrand::Jili => "jili",
        }
    }

    /// Whether the client expects a pushed notification on every balance
    /// change instead of reading balances out of game replies.
    pub fn pushes_balance(self) -> bool {
        matches!(self, GameBrand::Inout)
    }

    /// The keep-alive frame the server pushes on a schedule, if the brand
    /// needs one. Clients of the other brands ping on their own.
    pub fn heartbeat_frame(self) -> Option<Frame> {
        match self {
            GameBrand::Inout => Some(Frame::from(engineio::PING)),
            _ => None,
        }
    }
}

impl fmt::Display for GameBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameBrand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inout" => Ok(GameBrand::Inout),
            "spribe" => Ok(GameBrand::Spribe),
            "jdb" => Ok(GameBrand::Jdb),
            "jili" => Ok(GameBrand::Jili),
            other => Err(ProtocolError::UnknownBrand(other.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// What the client asked for: a named action or a numeric command code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Action(String),
    Code(u32),
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Action(a) => f.write_str(a),
            CommandKind::Code(c) => write!(f, "#{c}"),
        }
    }
}

/// One decoded inbound message, as rooms and lobbies see it.
///
/// `payload` stays in the brand's body encoding (JSON text for inout,
/// SFS-packed object for spribe/jdb, raw protobuf body for jili); rooms of a
/// given game know which one they receive. `reply_to` carries the
/// correlation id the adapter needs to address a response (the `43xx`
/// acknowledgement id for inout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub reply_to: Option<String>,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn action(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: CommandKind::Action(name.into()),
            reply_to: None,
            payload: payload.into(),
        }
    }

    pub fn code(code: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: CommandKind::Code(code),
            reply_to: None,
            payload: payload.into(),
        }
    }

    pub fn with_reply_to(mut self, id: impl Into<String>) -> Self {
        self.reply_to = Some(id.into());
        self
    }

    /// Returns the action name, if this is a named command.
    pub fn action_name(&self) -> Option<&str> {
        match &self.kind {
            CommandKind::Action(a) => Some(a),
            CommandKind::Code(_) => None,
        }
    }
}
