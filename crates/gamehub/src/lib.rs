//! # gamehub
//!
//! A real-time gateway for multiplayer casino games.
//!
//! Clients of several game brands connect over WebSocket, each speaking its
//! own dialect: Engine.IO text frames (inout), SFS binary objects (spribe,
//! jdb) or protobuf envelopes (jili). The gateway authenticates them with a
//! signed SSO token, loads their profile, RTP tier and balance, and hands the
//! resulting session to a [`RoomManager`] that places it into a room and
//! routes its commands there.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gamehub::prelude::*;
//!
//! # async fn run(services: Services, creator: Arc<dyn RoomCreator>) -> Result<(), GatewayError> {
//! let auth = SsoTokenAuthenticator::new(TokenConfig::new("secret"));
//! let server = GatewayServer::builder()
//!     .config(GatewayConfig::from_env()?)
//!     .build(auth, services, creator)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod adapters;
mod config;
mod error;
mod handler;
mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::{GatewayServer, GatewayServerBuilder, Services};

/// Everything needed to stand up a gateway and write rooms for it.
pub mod prelude {
    pub use crate::{GatewayConfig, GatewayError, GatewayServer, GatewayServerBuilder, Services};

    pub use gamehub_protocol::{Command, CommandKind, GameBrand, PlayerIdentity, RoomId};
    pub use gamehub_room::{
        ActorRoom, ActorRoomCreator, GameLogic, HeartbeatConfig, Lobby, Outbound, Recipient, Room,
        RoomArgs, RoomConfig, RoomCreator, RoomError, RoomManager, Session, TableMatcher,
    };
    pub use gamehub_session::{
        Authenticator, InMemoryProfiles, Ledger, PlayerProfile, ProfileStore, RtpService,
        SessionError, SsoTokenAuthenticator, TokenClaims, TokenConfig,
    };
    pub use gamehub_session::ledger::{FixedRtp, InMemoryLedger};
    pub use gamehub_transport::Frame;
}
