//! The live player session.
//!
//! A [`PlayerSession`] is the engine's view of one logical player. It
//! outlives individual connections: on reconnect the room manager installs
//! a fresh session for the same identity and force-closes the old
//! connection, but the room the player was in stays the same.
//!
//! The session is generic over the room type `R` and the owning manager
//! type `M` so this crate does not need to know what a room is; the room
//! crate fixes both.

use std::sync::{Arc, Weak};
use std::time::Duration;

use gamehub_protocol::{GameBrand, PlayerIdentity, engineio};
use gamehub_transport::{Connection, Frame, TransportError};
use parking_lot::Mutex;

use crate::ledger::{BalanceReply, BetReply, RefundReply, TransactionReply, WinReply};
use crate::{PlayerProfile, SessionError};

/// RTP used when the tier string does not parse as a number.
pub const DEFAULT_RTP: f64 = 97.0;

pub struct PlayerSession<R: ?Sized, M> {
    identity: PlayerIdentity,
    ident: String,
    profile: PlayerProfile,
    rtp: String,
    balance: Mutex<f64>,
    /// `None` means "known but currently disconnected".
    conn: Mutex<Option<Arc<dyn Connection>>>,
    /// `None` iff the player is not in any room.
    room: Mutex<Option<Arc<R>>>,
    manager: Weak<M>,
}

impl<R, M> PlayerSession<R, M>
where
    R: ?Sized + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    pub fn new(
        identity: PlayerIdentity,
        profile: PlayerProfile,
        rtp: impl Into<String>,
        manager: Weak<M>,
    ) -> Self {
        let ident = identity.ident();
        Self {
            identity,
            ident,
            profile,
            rtp: rtp.into(),
            balance: Mutex::new(0.0),
            conn: Mutex::new(None),
            room: Mutex::new(None),
            manager,
        }
    }

    pub fn with_connection(self, conn: Arc<dyn Connection>) -> Self {
        *self.conn.lock() = Some(conn);
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    /// `"{app_id}-{player_id}"`, the directory key for this player.
    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn app_id(&self) -> &str {
        &self.identity.app_id
    }

    pub fn player_id(&self) -> &str {
        &self.identity.player_id
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }

    pub fn brand(&self) -> GameBrand {
        self.profile.game_brand
    }

    pub fn currency(&self) -> &str {
        &self.profile.currency
    }

    pub fn lang(&self) -> &str {
        self.profile.lang()
    }

    /// The RTP tier exactly as the RTP service returned it.
    pub fn rtp_tier(&self) -> &str {
        &self.rtp
    }

    /// The RTP tier as a percentage, [`DEFAULT_RTP`] when unparsable.
    pub fn rtp(&self) -> f64 {
        self.rtp.trim().parse().unwrap_or(DEFAULT_RTP)
    }

    pub fn balance(&self) -> f64 {
        *self.balance.lock()
    }

    pub fn manager(&self) -> Option<Arc<M>> {
        self.manager.upgrade()
    }

    // -----------------------------------------------------------------------
    // Connection slot
    // -----------------------------------------------------------------------

    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.conn.lock().clone()
    }

    /// Whether a connection is attached and still open.
    pub fn is_connected(&self) -> bool {
        self.conn.lock().as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Installs `conn`, returning whatever was attached before.
    pub fn replace_connection(&self, conn: Arc<dyn Connection>) -> Option<Arc<dyn Connection>> {
        self.conn.lock().replace(conn)
    }

    /// Forgets the connection without closing it.
    pub fn clear_connection(&self) -> Option<Arc<dyn Connection>> {
        self.conn.lock().take()
    }

    /// Detaches and closes the connection, if any.
    pub async fn close_connection(&self) {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                tracing::debug!(ident = %self.ident, error = %e, "close failed");
            }
        }
    }

    /// Sends one frame to the player.
    ///
    /// With no connection attached the frame is dropped and `Ok` returned.
    /// A failed write closes and detaches that connection before the error
    /// is returned, so later sends become no-ops instead of retries.
    pub async fn send(&self, frame: impl Into<Frame>) -> Result<(), SessionError> {
        let Some(conn) = self.connection() else {
            return Ok(());
        };
        if let Err(e) = conn.send(frame.into()).await {
            tracing::warn!(ident = %self.ident, conn = %conn.id(), error = %e, "send failed, closing");
            {
                let mut slot = self.conn.lock();
                if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &conn)) {
                    slot.take();
                }
            }
            let _ = conn.close().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// [`send`](Self::send) bounded by `limit`.
    ///
    /// A write still pending at the deadline detaches the connection and
    /// closes it in the background, so later sends skip this player instead
    /// of stalling on it again.
    pub async fn send_within(&self, frame: impl Into<Frame>, limit: Duration) -> Result<(), SessionError> {
        match tokio::time::timeout(limit, self.send(frame)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(ident = %self.ident, limit_ms = limit.as_millis() as u64, "send stalled, closing");
                if let Some(conn) = self.clear_connection() {
                    tokio::spawn(async move {
                        let _ = conn.close().await;
                    });
                }
                Err(TransportError::Timeout.into())
            }
        }
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Frame::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        self.send(Frame::Binary(data.into())).await
    }

    // -----------------------------------------------------------------------
    // Room binding
    // -----------------------------------------------------------------------

    pub fn room(&self) -> Option<Arc<R>> {
        self.room.lock().clone()
    }

    pub fn has_room(&self) -> bool {
        self.room.lock().is_some()
    }

    pub fn bind_room(&self, room: Arc<R>) -> Option<Arc<R>> {
        self.room.lock().replace(room)
    }

    pub fn take_room(&self) -> Option<Arc<R>> {
        self.room.lock().take()
    }

    // -----------------------------------------------------------------------
    // Balance
    // -----------------------------------------------------------------------

    /// Stores `balance` and, for brands that expect it, pushes an
    /// `onBalanceChange` notification. A failed push only closes the
    /// connection; the balance stays applied.
    async fn set_balance(&self, balance: f64) {
        *self.balance.lock() = balance;
        if self.brand().pushes_balance() {
            let frame = engineio::balance_change(self.currency(), balance);
            let _ = self.send_text(frame).await;
        }
    }

    pub async fn set_balance_by_balance_reply(&self, reply: &BalanceReply) {
        self.set_balance(reply.balance).await;
    }

    pub async fn set_balance_by_bet_reply(&self, reply: &BetReply) {
        self.set_balance(reply.balance).await;
    }

    /// Applies a win only if the ledger flagged a balance change.
    pub async fn set_balance_by_win_reply(&self, reply: &WinReply) {
        if reply.has_balance_change {
            self.set_balance(reply.balance).await;
        }
    }

    pub async fn set_balance_by_refund_reply(&self, reply: &RefundReply) {
        self.set_balance(reply.balance).await;
    }

    pub async fn set_balance_by_transaction_reply(&self, reply: &TransactionReply) {
        if reply.has_balance_change {
            self.set_balance(reply.balance).await;
        }
    }
}

impl<R: ?Sized, M> std::fmt::Debug for PlayerSession<R, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSession")
            .field("ident", &self.ident)
            .field("brand", &self.profile.game_brand)
            .field("rtp", &self.rtp)
            .finish_non_exhaustive()
    }
}
