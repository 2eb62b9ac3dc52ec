//! Keep-alive pushes for brands whose clients expect the server to ping.

use std::sync::Weak;
use std::time::Duration;

use futures_util::future::join_all;
use gamehub_protocol::GameBrand;
use gamehub_tick::{TickConfig, TickScheduler};
use gamehub_transport::Frame;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::RoomManager;

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub frame: Frame,
    /// Longest a single send may take before that recipient is skipped for
    /// this round.
    pub send_timeout: Duration,
}

impl HeartbeatConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(20);

    pub fn new(interval: Duration, frame: impl Into<Frame>) -> Self {
        Self {
            interval,
            frame: frame.into(),
            send_timeout: Duration::from_secs(5),
        }
    }

    /// The brand's keep-alive at the default interval, if it has one.
    pub fn for_brand(brand: GameBrand) -> Option<Self> {
        brand
            .heartbeat_frame()
            .map(|frame| Self::new(Self::DEFAULT_INTERVAL, frame))
    }
}

pub(crate) fn spawn(
    manager: Weak<RoomManager>,
    config: HeartbeatConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scheduler = TickScheduler::new(TickConfig::every(config.interval));
        debug!(interval_ms = config.interval.as_millis() as u64, "heartbeat started");
        loop {
            tokio::select! {
                _ = async {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                } => break,
                info = scheduler.wait_for_tick() => {
                    let Some(manager) = manager.upgrade() else { break };
                    let sent = beat(&manager, &config).await;
                    trace!(tick = info.tick, sent, "heartbeat");
                    scheduler.record_tick_end();
                }
            }
        }
        let stats = scheduler.stats();
        debug!(beats = stats.ticks, missed = stats.missed, "heartbeat stopped");
    })
}

/// Sends one keep-alive to every connected session. Returns how many
/// sends succeeded.
///
/// Sends run concurrently, each under `send_timeout`, so a stuck socket
/// delays nobody else. A failed or stalled send closes that connection
/// inside [`Session::send_within`](crate::Session).
pub async fn beat(manager: &RoomManager, config: &HeartbeatConfig) -> usize {
    let sessions = manager.connected_sessions();
    let sends = sessions.iter().map(|session| async move {
        session
            .send_within(config.frame.clone(), config.send_timeout)
            .await
            .inspect_err(|e| debug!(ident = %session.ident(), error = %e, "heartbeat send failed"))
            .is_ok()
    });
    join_all(sends).await.into_iter().filter(|ok| *ok).count()
}
