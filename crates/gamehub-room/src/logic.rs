//! The `GameLogic` trait: the rules of a game hosted in an
//! [`ActorRoom`](crate::ActorRoom).
//!
//! The actor owns seats, timers and delivery. Game code only sees player
//! idents and returns the frames to send.

use std::time::Duration;

use gamehub_protocol::{Command, RoomId};
use gamehub_transport::Frame;

use crate::{RoomArgs, RoomConfig};

/// Who an outbound frame is for. Players are named by ident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    All,
    Player(String),
    AllExcept(String),
}

pub type Outbound = Vec<(Recipient, Frame)>;

/// Game rules for an actor-hosted room.
///
/// One value per room, created by [`create`](Self::create) and then driven
/// by exactly one task, so methods take `&mut self` freely. Every hook
/// returns the frames to send; disconnected occupants are skipped.
pub trait GameLogic: Send + 'static {
    /// Shared per-game settings handed to every new room.
    type Config: Send + Sync + Clone + Default + 'static;

    fn create(room_id: RoomId, args: &RoomArgs, config: &Self::Config) -> Self;

    /// Processes a command from a seated player.
    fn handle_command(&mut self, sender: &str, command: &Command) -> Outbound;

    /// Checked before [`handle_command`](Self::handle_command). An `Err`
    /// rejects the command. Default: accept all.
    fn validate_command(&self, _sender: &str, _command: &Command) -> Result<(), String> {
        Ok(())
    }

    /// Default: no-op.
    fn on_player_join(&mut self, _player: &str) -> Outbound {
        Vec::new()
    }

    /// Default: no-op.
    fn on_player_disconnect(&mut self, _player: &str) -> Outbound {
        Vec::new()
    }

    /// Resend whatever the client needs to resume. Default: no-op.
    fn on_player_reconnect(&mut self, _player: &str) -> Outbound {
        Vec::new()
    }

    /// The seat is gone (grace expired). Default: no-op.
    fn on_player_leave(&mut self, _player: &str) -> Outbound {
        Vec::new()
    }

    /// Called every tick when `room_config().tick_rate > 0`.
    fn tick(&mut self, _dt: Duration) -> Outbound {
        Vec::new()
    }

    fn room_config() -> RoomConfig {
        RoomConfig::default()
    }
}
