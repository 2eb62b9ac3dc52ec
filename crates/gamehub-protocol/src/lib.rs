//! Wire protocol for the gamehub gateway.
//!
//! This crate defines what the rest of the gateway agrees on:
//!
//! - **Types** ([`PlayerIdentity`], [`RoomId`], [`GameBrand`], [`Command`])
//!   shared by sessions, rooms and adapters.
//! - **Brand codecs**: [`engineio`] (numeric-prefixed JSON text frames),
//!   [`sfs`] (binary object packing) and [`envelope`] (protobuf command
//!   envelope). Each turns wire frames into [`Command`]s and back.
//! - **Errors** ([`ProtocolError`]) for everything that can go wrong while
//!   decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (Frame) → Protocol (Command) → Room Manager → Room
//! ```
//!
//! Nothing past this crate parses wire bytes.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

pub mod engineio;
pub mod envelope;
mod error;
pub mod sfs;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::ProtocolError;
pub use types::{Command, CommandKind, GameBrand, PlayerIdentity, RoomId};
