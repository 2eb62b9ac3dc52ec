//! Room manager: matches players into rooms and remembers where they are.
//!
//! Two indexes, each behind its own lock:
//!
//! - the **registry** (`match key → rooms`) lets RTP-matched players share
//!   long-lived rooms;
//! - the **directory** (`ident → room + active session`) lets a
//!   reconnecting player land back in the room they left.
//!
//! Neither lock is ever held across a call into room or lobby code. A room
//! is created and seated outside the registry lock, then inserted with a
//! short write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gamehub_protocol::{Command, PlayerIdentity, RoomId};
use gamehub_session::PlayerProfile;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::heartbeat::{self, HeartbeatConfig};
use crate::{Lobby, Room, RoomArgs, RoomCreator, RoomError, Session, TableMatcher};

/// Counter for generating unique room IDs.
static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

type LoginGates = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// One login's hold on its identity's gate. Dropping it, on completion or
/// cancellation alike, removes the gate once nobody else is queued on it.
struct LoginGate<'a> {
    gates: &'a LoginGates,
    ident: &'a str,
    turn: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> LoginGate<'a> {
    fn enter(gates: &'a LoginGates, ident: &'a str) -> Self {
        let turn = gates.lock().entry(ident.to_owned()).or_default().clone();
        Self { gates, ident, turn }
    }
}

impl Drop for LoginGate<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock();
        // Ours plus the map's: nobody else is waiting.
        let idle = Arc::strong_count(&self.turn) <= 2;
        if idle && gates.get(self.ident).is_some_and(|g| Arc::ptr_eq(g, &self.turn)) {
            gates.remove(self.ident);
        }
    }
}

/// Where an identity currently is, and which of its sessions is live.
struct DirectoryEntry {
    room: Arc<dyn Room>,
    session: Arc<Session>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct RoomManagerBuilder {
    matcher: TableMatcher,
    creator: Arc<dyn RoomCreator>,
    lobby: Option<Arc<dyn Lobby>>,
    heartbeat: Option<HeartbeatConfig>,
}

impl RoomManagerBuilder {
    pub fn lobby(mut self, lobby: Arc<dyn Lobby>) -> Self {
        self.lobby = Some(lobby);
        self
    }

    /// Pushes `config.frame` to every connected session on a schedule.
    pub fn heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.heartbeat = Some(config);
        self
    }

    /// Builds the manager and, if configured, starts its heartbeat task.
    ///
    /// Must be called inside a Tokio runtime when a heartbeat is set.
    pub fn build(self) -> Arc<RoomManager> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Arc::new(RoomManager {
            matcher: self.matcher,
            creator: self.creator,
            lobby: self.lobby,
            registry: RwLock::new(HashMap::new()),
            directory: RwLock::new(HashMap::new()),
            login_gates: Mutex::new(HashMap::new()),
            shutdown: shutdown_tx,
            heartbeat_task: Mutex::new(None),
        });

        if let Some(config) = self.heartbeat {
            let task = heartbeat::spawn(Arc::downgrade(&manager), config, shutdown_rx);
            *manager.heartbeat_task.lock() = Some(task);
        }

        info!(matcher = %manager.matcher, lobby = manager.lobby.is_some(), "room manager ready");
        manager
    }
}

// ---------------------------------------------------------------------------
// RoomManager
// ---------------------------------------------------------------------------

pub struct RoomManager {
    matcher: TableMatcher,
    creator: Arc<dyn RoomCreator>,
    lobby: Option<Arc<dyn Lobby>>,
    /// Match key → rooms in creation order. Keys are never removed.
    registry: RwLock<HashMap<String, Vec<Arc<dyn Room>>>>,
    /// Ident → last known room and the one active session.
    directory: RwLock<HashMap<String, DirectoryEntry>>,
    /// Serializes logins per identity.
    login_gates: LoginGates,
    shutdown: watch::Sender<bool>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomManager {
    pub fn builder(matcher: TableMatcher, creator: Arc<dyn RoomCreator>) -> RoomManagerBuilder {
        RoomManagerBuilder {
            matcher,
            creator,
            lobby: None,
            heartbeat: None,
        }
    }

    pub fn matcher(&self) -> TableMatcher {
        self.matcher
    }

    pub fn lobby(&self) -> Option<&Arc<dyn Lobby>> {
        self.lobby.as_ref()
    }

    /// Creates a session owned by this manager. Attach the connection with
    /// [`Session::with_connection`].
    pub fn new_session(
        self: &Arc<Self>,
        identity: PlayerIdentity,
        profile: PlayerProfile,
        rtp: impl Into<String>,
    ) -> Session {
        Session::new(identity, profile, rtp, Arc::downgrade(self))
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    /// Places a freshly authenticated session.
    ///
    /// With a lobby installed the lobby decides. Otherwise the session
    /// reconnects into its previous room if it has one, or joins under the
    /// matcher's key. Logins for the same identity run one at a time.
    pub async fn login(self: &Arc<Self>, session: &Arc<Session>) -> Result<(), RoomError> {
        let gate = LoginGate::enter(&self.login_gates, session.ident());
        let _turn = gate.turn.lock().await;
        match &self.lobby {
            Some(lobby) => lobby.on_login(self, session).await,
            None => self.login_without_lobby(session).await,
        }
    }

    async fn login_without_lobby(&self, session: &Arc<Session>) -> Result<(), RoomError> {
        if self.matcher == TableMatcher::Custom {
            return Err(RoomError::UnsupportedMatcher(self.matcher));
        }
        if self.try_reconnect(session).await? {
            return Ok(());
        }
        let key = self.matcher.match_key(session);
        let args = self.matcher.room_args(session);
        self.join(session, &key, args).await
    }

    // -----------------------------------------------------------------------
    // Reconnect
    // -----------------------------------------------------------------------

    /// Moves `session` into the room its identity was last seen in.
    ///
    /// Returns `Ok(false)` when there is nothing to reconnect to, including
    /// when the remembered room has been disposed; the caller should then
    /// join afresh.
    pub async fn try_reconnect(&self, session: &Arc<Session>) -> Result<bool, RoomError> {
        let ident = session.ident();

        let (room, previous) = {
            let mut directory = self.directory.write();
            let Some(entry) = directory.get_mut(ident) else {
                return Ok(false);
            };
            let previous = std::mem::replace(&mut entry.session, session.clone());
            (entry.room.clone(), previous)
        };

        if !Arc::ptr_eq(&previous, session) {
            previous.take_room();
            previous.close_connection().await;
        }
        session.bind_room(room.clone());

        match room.on_reconnect(session).await {
            Ok(()) => {
                info!(%ident, room_id = %room.room_id(), "player reconnected");
                Ok(true)
            }
            Err(e) => {
                session.take_room();
                self.forget_if(ident, session);
                if e.is_stale_room() || matches!(e, RoomError::NotInRoom(..)) {
                    info!(%ident, room_id = %room.room_id(), error = %e, "stale room on reconnect, joining afresh");
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// Seats `session` in a room.
    ///
    /// Under a non-empty `match_key` the rooms registered for it are tried
    /// in order and the first to accept wins. Otherwise, or if all refuse,
    /// a new room is created from `args`; if that room refuses its first
    /// player the join fails and the room is dropped unregistered.
    ///
    /// The directory then records this session as the identity's live one.
    /// A different session it replaces loses its room and its connection.
    pub async fn join(&self, session: &Arc<Session>, match_key: &str, args: RoomArgs) -> Result<(), RoomError> {
        let ident = session.ident();
        if let Some(room) = session.room() {
            return Err(RoomError::AlreadyInRoom(ident.to_owned(), room.room_id()));
        }

        let room = match self.find_room(session, match_key).await {
            Some(room) => room,
            None => self.create_room(session, match_key, &args).await?,
        };
        session.bind_room(room.clone());

        let replaced = self.directory.write().insert(
            ident.to_owned(),
            DirectoryEntry {
                room: room.clone(),
                session: session.clone(),
            },
        );
        if let Some(old) = replaced {
            if !Arc::ptr_eq(&old.session, session) {
                self.evict(old.session).await;
            }
        }

        info!(%ident, room_id = %room.room_id(), key = %match_key, "player joined");
        Ok(())
    }

    async fn find_room(&self, session: &Arc<Session>, match_key: &str) -> Option<Arc<dyn Room>> {
        if match_key.is_empty() {
            return None;
        }
        let candidates = self.registry.read().get(match_key).cloned().unwrap_or_default();
        for room in candidates {
            match room.on_join(session).await {
                Ok(()) => return Some(room),
                Err(e) => debug!(ident = %session.ident(), room_id = %room.room_id(), error = %e, "room refused"),
            }
        }
        None
    }

    async fn create_room(
        &self,
        session: &Arc<Session>,
        match_key: &str,
        args: &RoomArgs,
    ) -> Result<Arc<dyn Room>, RoomError> {
        let room_id = RoomId(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed));
        let room = self.creator.create_room(room_id, args).await?;

        if let Err(e) = room.on_join(session).await {
            warn!(ident = %session.ident(), %room_id, error = %e, "new room refused its first player");
            room.on_dispose().await;
            return Err(e);
        }

        if !match_key.is_empty() {
            let mut registry = self.registry.write();
            let rooms = registry.entry(match_key.to_owned()).or_default();
            if !rooms.iter().any(|r| Arc::ptr_eq(r, &room)) {
                rooms.push(room.clone());
            }
        }

        info!(%room_id, key = %match_key, matcher = %self.matcher, "room created");
        Ok(room)
    }

    /// Retires a session that lost the directory to a newer one.
    async fn evict(&self, stale: Arc<Session>) {
        warn!(ident = %stale.ident(), "evicting superseded session");
        let room = stale.take_room();
        stale.close_connection().await;
        if let Some(room) = room {
            if self.matcher == TableMatcher::Single {
                room.on_dispose().await;
            } else if let Err(e) = room.on_disconnect(&stale).await {
                debug!(ident = %stale.ident(), error = %e, "evicted session disconnect failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Traffic
    // -----------------------------------------------------------------------

    /// Lobby first (if any), then the session's room.
    pub async fn dispatch(self: &Arc<Self>, session: &Arc<Session>, command: &Command) -> Result<(), RoomError> {
        if let Some(lobby) = &self.lobby {
            lobby.on_message(self, session, command).await?;
        }
        self.on_message(session, command).await
    }

    /// Forwards `command` to the session's room. Without a room this is a
    /// no-op.
    pub async fn on_message(&self, session: &Arc<Session>, command: &Command) -> Result<(), RoomError> {
        match session.room() {
            Some(room) => room.on_message(session, command).await,
            None => Ok(()),
        }
    }

    /// Called by a connection task when its read loop ends.
    ///
    /// Does nothing if `session` has been superseded by a reconnect. The
    /// directory entry is kept so a later login can reconnect.
    pub async fn on_disconnect(&self, session: &Arc<Session>) -> Result<(), RoomError> {
        if !self.is_active(session) {
            debug!(ident = %session.ident(), "disconnect of superseded session ignored");
            return Ok(());
        }
        session.close_connection().await;
        match session.room() {
            Some(room) => {
                debug!(ident = %session.ident(), room_id = %room.room_id(), "player disconnected");
                room.on_disconnect(session).await
            }
            None => Ok(()),
        }
    }

    /// Takes the player out of their room for good.
    ///
    /// Idempotent. Forgets the identity's directory entry (if this session
    /// still owns it), closes the connection when `is_disconnect`, and
    /// disposes single-use rooms. Shared rooms are told via
    /// [`Room::on_leave`] so the seat frees up at once.
    pub async fn exit_room(&self, session: &Arc<Session>, is_disconnect: bool) {
        let Some(room) = session.take_room() else {
            if is_disconnect {
                session.close_connection().await;
            }
            return;
        };

        self.forget_if(session.ident(), session);
        if is_disconnect {
            session.close_connection().await;
        }
        info!(ident = %session.ident(), room_id = %room.room_id(), is_disconnect, "player exited room");

        if self.matcher == TableMatcher::Single {
            room.on_dispose().await;
        } else if let Err(e) = room.on_leave(session).await {
            // Grace expiry already freed the seat.
            debug!(ident = %session.ident(), room_id = %room.room_id(), error = %e, "leave not applied");
        }
    }

    /// Removes the directory entry for `ident` if `session` is its live
    /// session.
    fn forget_if(&self, ident: &str, session: &Arc<Session>) {
        let mut directory = self.directory.write();
        if directory
            .get(ident)
            .is_some_and(|e| Arc::ptr_eq(&e.session, session))
        {
            directory.remove(ident);
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn is_active(&self, session: &Arc<Session>) -> bool {
        self.directory
            .read()
            .get(session.ident())
            .is_some_and(|e| Arc::ptr_eq(&e.session, session))
    }

    /// The live session for `ident`, if any.
    pub fn active_session(&self, ident: &str) -> Option<Arc<Session>> {
        self.directory.read().get(ident).map(|e| e.session.clone())
    }

    /// The room `ident` was last placed in.
    pub fn directory_room(&self, ident: &str) -> Option<Arc<dyn Room>> {
        self.directory.read().get(ident).map(|e| e.room.clone())
    }

    /// Rooms registered under `match_key`, in creation order.
    pub fn registered_rooms(&self, match_key: &str) -> Vec<Arc<dyn Room>> {
        self.registry.read().get(match_key).cloned().unwrap_or_default()
    }

    /// Identities with a login running or queued.
    pub fn logins_in_progress(&self) -> usize {
        self.login_gates.lock().len()
    }

    pub fn session_count(&self) -> usize {
        self.directory.read().len()
    }

    /// Snapshot of sessions that currently have a connection.
    pub fn connected_sessions(&self) -> Vec<Arc<Session>> {
        self.directory
            .read()
            .values()
            .filter(|e| e.session.is_connected())
            .map(|e| e.session.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stops the heartbeat task. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.heartbeat_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "heartbeat task ended abnormally");
            }
        }
    }
}

impl Drop for RoomManager {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Exits `session` from its room through the manager that owns it.
///
/// For room code reacting to a timer or a game rule. A session whose manager
/// is gone is just closed when `is_disconnect`.
pub async fn exit_room(session: &Arc<Session>, is_disconnect: bool) {
    match session.manager() {
        Some(manager) => manager.exit_room(session, is_disconnect).await,
        None if is_disconnect => session.close_connection().await,
        None => {}
    }
}
