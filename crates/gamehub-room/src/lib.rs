//! Room and session management for the gamehub gateway.
//!
//! The [`RoomManager`] is the engine every brand adapter calls into. It
//! matches logged-in sessions into rooms, remembers where each identity is
//! so a reconnect lands in the same room, and evicts superseded
//! connections so an identity has at most one live session.
//!
//! # Key types
//!
//! - [`Room`], [`RoomCreator`], [`Lobby`]: the contracts game code implements
//! - [`TableMatcher`]: RTP-bucketed shared rooms, single-use rooms, or lobby placement
//! - [`RoomManager`]: registry, directory, login/reconnect/exit
//! - [`HeartbeatConfig`]: scheduled keep-alive pushes
//! - [`ActorRoom`] + [`GameLogic`]: a ready-made room running as a Tokio actor

#![allow(async_fn_in_trait)]

mod actor;
mod config;
mod contract;
mod error;
pub mod heartbeat;
mod logic;
mod manager;

pub use actor::{ActorRoom, ActorRoomCreator, RoomInfo};
pub use config::RoomConfig;
pub use contract::{Lobby, Room, RoomArgs, RoomCreator, Session, TableMatcher};
pub use error::RoomError;
pub use heartbeat::HeartbeatConfig;
pub use logic::{GameLogic, Outbound, Recipient};
pub use manager::{RoomManager, RoomManagerBuilder, exit_room};
