//! Unified error type for the gateway.

use gamehub_protocol::ProtocolError;
use gamehub_room::RoomError;
use gamehub_session::{LedgerError, SessionError};
use gamehub_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapping variant generates the `From`
/// impl, so `?` converts sub-crate errors without ceremony.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame that did not decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or profile lookup failed, or a session send failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A balance or RTP call failed during login.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Placement or routing failed inside the room layer.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The upgrade path matches no adapter for the configured brand.
    #[error("no route for {0}")]
    UnknownRoute(String),

    /// The client broke the brand's connect sequence.
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether the client failed to authenticate.
    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Session(e) if e.is_auth())
    }
}
