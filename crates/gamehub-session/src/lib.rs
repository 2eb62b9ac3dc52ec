//! Player sessions for the gamehub gateway.
//!
//! This crate covers everything about *one player* that does not depend on
//! which room they are in:
//!
//! 1. **Authentication**: turning a client token into a
//!    [`PlayerIdentity`](gamehub_protocol::PlayerIdentity)
//!    ([`Authenticator`], [`SsoTokenAuthenticator`])
//! 2. **Profile**: currency, language and brand ([`PlayerProfile`],
//!    [`ProfileStore`])
//! 3. **Ledger contracts**: the balance/bet/win/refund and RTP services the
//!    gateway consumes ([`Ledger`], [`RtpService`])
//! 4. **The live session**: [`PlayerSession`], which owns the current
//!    connection, the cached balance and the room binding
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← binds sessions to rooms, routes commands
//!     ↕
//! Session Layer (this crate)  ← identity, connection slot, balance
//!     ↕
//! Protocol / Transport (below)  ← identities, frames, connections
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
pub mod ledger;
mod profile;
mod session;

pub use auth::{
    Authenticator, SsoTokenAuthenticator, TokenClaims, TokenConfig,
    TokenPayload,
};
pub use error::{LedgerError, SessionError};
pub use ledger::{Ledger, RtpService};
pub use profile::{InMemoryProfiles, PlayerProfile, ProfileStore};
pub use session::PlayerSession;
