//! `GatewayServer` builder and accept loop.
//!
//! This is the entry point for running a gateway. It ties the layers
//! together: transport → brand adapter → session → room manager.

use std::future::Future;
use std::sync::Arc;

use gamehub_room::{HeartbeatConfig, Lobby, RoomCreator, RoomManager};
use gamehub_session::{Authenticator, Ledger, ProfileStore, RtpService, SsoTokenAuthenticator};
use gamehub_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{GatewayConfig, GatewayError};

/// The external services a login needs.
#[derive(Clone)]
pub struct Services {
    pub profiles: Arc<dyn ProfileStore>,
    pub ledger: Arc<dyn Ledger>,
    pub rtp: Arc<dyn RtpService>,
}

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<A: Authenticator> {
    pub(crate) config: GatewayConfig,
    pub(crate) auth: A,
    pub(crate) services: Services,
    pub(crate) manager: Arc<RoomManager>,
}

/// Builder for configuring and starting a gateway.
///
/// # Example
///
/// ```rust,ignore
/// let server = GatewayServer::builder()
///     .config(GatewayConfig::from_env()?)
///     .build(auth, services, Arc::new(ActorRoomCreator::<MyGame>::default()))
///     .await?;
/// server.run().await
/// ```
pub struct GatewayServerBuilder {
    config: GatewayConfig,
    lobby: Option<Arc<dyn Lobby>>,
    heartbeat: Option<Option<HeartbeatConfig>>,
}

impl GatewayServerBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            lobby: None,
            heartbeat: None,
        }
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_owned();
        self
    }

    pub fn lobby(mut self, lobby: Arc<dyn Lobby>) -> Self {
        self.lobby = Some(lobby);
        self
    }

    /// Replaces the heartbeat derived from the config. `None` disables it.
    pub fn heartbeat(mut self, heartbeat: Option<HeartbeatConfig>) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// Binds the listener and starts the room manager (and its heartbeat).
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
        services: Services,
        creator: Arc<dyn RoomCreator>,
    ) -> Result<GatewayServer<A>, GatewayError> {
        self.config.validate()?;
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let mut manager = RoomManager::builder(self.config.matcher, creator);
        if let Some(lobby) = self.lobby {
            manager = manager.lobby(lobby);
        }
        if let Some(heartbeat) = self.heartbeat.unwrap_or_else(|| self.config.heartbeat()) {
            manager = manager.heartbeat(heartbeat);
        }

        let state = Arc::new(ServerState {
            config: self.config,
            auth,
            services,
            manager: manager.build(),
        });

        Ok(GatewayServer { transport, state })
    }
}

impl Default for GatewayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound gateway. Call [`run`](Self::run) to start accepting
/// connections.
pub struct GatewayServer<A: Authenticator> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A>>,
}

impl GatewayServer<SsoTokenAuthenticator> {
    /// Starts a [`GatewayServerBuilder`].
    ///
    /// Lives on a concrete impl so `GatewayServer::builder()` resolves
    /// without naming a type; the authenticator actually used is whatever
    /// is passed to [`GatewayServerBuilder::build`].
    pub fn builder() -> GatewayServerBuilder {
        GatewayServerBuilder::new()
    }
}

impl<A: Authenticator> GatewayServer<A> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, GatewayError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// The room manager behind this gateway.
    pub fn manager(&self) -> &Arc<RoomManager> {
        &self.state.manager
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), GatewayError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `signal` resolves, then stops the
    /// heartbeat. Connections already accepted keep running.
    pub async fn run_until(mut self, signal: impl Future<Output = ()>) -> Result<(), GatewayError> {
        tracing::info!(
            game = %self.state.config.game_name,
            brand = %self.state.config.brand,
            matcher = %self.state.config.matcher,
            "gateway running"
        );
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = self.transport.accept() => match accepted {
                    Ok((conn, target)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, target, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.state.manager.shutdown().await;
        tracing::info!("gateway stopped");
        Ok(())
    }
}
