//! Error types for the session layer.

use gamehub_transport::TransportError;

/// Errors that can occur while authenticating or driving a player session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token is not valid hex/protobuf.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The token signature does not match its contents.
    #[error("invalid sign")]
    BadSignature,

    /// The token's expiry is in the past.
    #[error("token expired")]
    TokenExpired,

    /// Authentication failed for any other reason (custom authenticators).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No stored profile for the player.
    #[error("no profile for player {0}")]
    ProfileNotFound(String),

    /// Writing to the player's connection failed. The connection has been
    /// closed by the time this is returned.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A ledger or RTP call failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SessionError {
    /// Whether this error means the client failed to prove who it is.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            SessionError::MalformedToken(_)
                | SessionError::BadSignature
                | SessionError::TokenExpired
                | SessionError::AuthFailed(_)
        )
    }
}

/// Errors returned by the ledger and RTP services.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// `transaction_type` was not one of `bet`, `win`, `refund`. Raised
    /// locally, before any remote call.
    #[error("transaction_type {0} error")]
    InvalidTransactionType(String),

    /// The service could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The service answered with an error (insufficient funds, unknown
    /// player, ...).
    #[error("ledger rejected request: {0}")]
    Rejected(String),
}
