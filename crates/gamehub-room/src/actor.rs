//! Actor-hosted rooms: a [`GameLogic`] running in its own Tokio task.
//!
//! [`ActorRoom`] is the [`Room`] handle the manager holds; every contract
//! call becomes a message to the room's task, so the game state is only
//! ever touched by one task and needs no locking.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use gamehub_protocol::{Command, RoomId};
use gamehub_tick::{TickConfig, TickScheduler};
use gamehub_transport::Frame;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::logic::{Outbound, Recipient};
use crate::{GameLogic, Room, RoomArgs, RoomConfig, RoomCreator, RoomError, Session};

type Reply<T = ()> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
enum RoomCommand {
    Join { session: Arc<Session>, reply: Reply },
    Reconnect { session: Arc<Session>, reply: Reply },
    Disconnect { session: Arc<Session>, reply: Reply },
    Leave { session: Arc<Session>, reply: Reply },
    Message {
        session: Arc<Session>,
        command: Command,
        reply: Reply,
    },
    /// A disconnected occupant's grace period ran out. Ignored if the
    /// seat's generation moved on since.
    GraceExpired { ident: String, generation: u64 },
    GetInfo { reply: Reply<RoomInfo> },
    Dispose,
}

/// A snapshot of room metadata (not the game state itself).
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    /// Occupied seats, including disconnected ones.
    pub player_count: usize,
    pub connected_count: usize,
    pub max_players: usize,
}

/// State visible from the handle without a round trip.
#[derive(Default)]
struct Shared {
    players: AtomicUsize,
    disposed: AtomicBool,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running room actor.
pub struct ActorRoom<G: GameLogic> {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
    shared: Arc<Shared>,
    _game: PhantomData<fn() -> G>,
}

impl<G: GameLogic> ActorRoom<G> {
    /// Creates the game and spawns its task.
    pub fn spawn(room_id: RoomId, args: &RoomArgs, game_config: &G::Config) -> Arc<Self> {
        let config = G::room_config();
        let (tx, rx) = mpsc::channel(config.channel_size.max(1));
        let shared = Arc::new(Shared::default());

        let actor = RoomActor::<G> {
            room_id,
            game: G::create(room_id, args, game_config),
            seats: HashMap::new(),
            receiver: rx,
            timer_sender: tx.downgrade(),
            shared: shared.clone(),
            config,
        };
        tokio::spawn(actor.run());

        Arc::new(Self {
            room_id,
            sender: tx,
            shared,
            _game: PhantomData,
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.call(|reply| RoomCommand::GetInfo { reply }).await
    }

    fn gone(&self) -> RoomError {
        if self.is_disposed() {
            RoomError::Disposed(self.room_id)
        } else {
            RoomError::Unavailable(self.room_id)
        }
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> RoomCommand) -> Result<T, RoomError> {
        if self.is_disposed() {
            return Err(RoomError::Disposed(self.room_id));
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }
}

#[async_trait::async_trait]
impl<G: GameLogic> Room for ActorRoom<G> {
    fn room_id(&self) -> RoomId {
        self.room_id
    }

    fn player_count(&self) -> usize {
        self.shared.players.load(Ordering::Acquire)
    }

    async fn on_join(&self, session: &Arc<Session>) -> Result<(), RoomError> {
        let session = session.clone();
        self.call(|reply| RoomCommand::Join { session, reply }).await
    }

    async fn on_reconnect(&self, session: &Arc<Session>) -> Result<(), RoomError> {
        let session = session.clone();
        self.call(|reply| RoomCommand::Reconnect { session, reply }).await
    }

    async fn on_disconnect(&self, session: &Arc<Session>) -> Result<(), RoomError> {
        let session = session.clone();
        self.call(|reply| RoomCommand::Disconnect { session, reply }).await
    }

    async fn on_leave(&self, session: &Arc<Session>) -> Result<(), RoomError> {
        let session = session.clone();
        self.call(|reply| RoomCommand::Leave { session, reply }).await
    }

    async fn on_message(&self, session: &Arc<Session>, command: &Command) -> Result<(), RoomError> {
        let session = session.clone();
        let command = command.clone();
        self.call(|reply| RoomCommand::Message {
            session,
            command,
            reply,
        })
        .await
    }

    async fn on_dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.sender.send(RoomCommand::Dispose).await;
    }
}

/// [`RoomCreator`] spawning an [`ActorRoom<G>`] per request.
pub struct ActorRoomCreator<G: GameLogic> {
    config: G::Config,
}

impl<G: GameLogic> ActorRoomCreator<G> {
    pub fn new(config: G::Config) -> Self {
        Self { config }
    }
}

impl<G: GameLogic> Default for ActorRoomCreator<G> {
    fn default() -> Self {
        Self::new(G::Config::default())
    }
}

#[async_trait::async_trait]
impl<G: GameLogic> RoomCreator for ActorRoomCreator<G> {
    async fn create_room(&self, room_id: RoomId, args: &RoomArgs) -> Result<Arc<dyn Room>, RoomError> {
        let room: Arc<dyn Room> = ActorRoom::<G>::spawn(room_id, args, &self.config);
        Ok(room)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Seat {
    session: Arc<Session>,
    connected: bool,
    /// Bumped on every disconnect/reconnect so stale grace timers are
    /// recognisable.
    generation: u64,
}

struct RoomActor<G: GameLogic> {
    room_id: RoomId,
    config: RoomConfig,
    game: G,
    seats: HashMap<String, Seat>,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Weak so pending grace timers do not keep the room alive.
    timer_sender: mpsc::WeakSender<RoomCommand>,
    shared: Arc<Shared>,
}

impl<G: GameLogic> RoomActor<G> {
    async fn run(mut self) {
        info!(room_id = %self.room_id, "room actor started");
        let mut scheduler = TickScheduler::new(TickConfig::with_rate(self.config.tick_rate));

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd).await {
                        break;
                    }
                }
                tick = scheduler.wait_for_tick() => {
                    let out = self.game.tick(tick.dt);
                    deliver(&self.seats, out, self.config.send_timeout).await;
                    scheduler.record_tick_end();
                }
            }
        }

        self.shared.disposed.store(true, Ordering::Release);
        info!(room_id = %self.room_id, "room actor stopped");
    }

    /// Returns `false` once the room should stop.
    async fn handle(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join { session, reply } => {
                let result = self.handle_join(session).await;
                let _ = reply.send(result);
            }
            RoomCommand::Reconnect { session, reply } => {
                let result = self.handle_reconnect(session).await;
                let _ = reply.send(result);
            }
            RoomCommand::Disconnect { session, reply } => {
                let result = self.handle_disconnect(&session).await;
                let _ = reply.send(result);
            }
            RoomCommand::Leave { session, reply } => {
                let result = self.handle_leave(&session).await;
                let _ = reply.send(result);
            }
            RoomCommand::Message {
                session,
                command,
                reply,
            } => {
                let result = self.handle_message(&session, &command).await;
                let _ = reply.send(result);
            }
            RoomCommand::GraceExpired { ident, generation } => {
                self.handle_grace_expired(&ident, generation).await;
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(Ok(self.info()));
            }
            RoomCommand::Dispose => {
                info!(room_id = %self.room_id, players = self.seats.len(), "room disposed");
                self.seats.clear();
                self.shared.players.store(0, Ordering::Release);
                return false;
            }
        }
        true
    }

    async fn handle_join(&mut self, session: Arc<Session>) -> Result<(), RoomError> {
        let ident = session.ident().to_owned();
        if self.seats.contains_key(&ident) {
            return Err(RoomError::AlreadyInRoom(ident, self.room_id));
        }
        if self.seats.len() >= self.config.max_players {
            return Err(RoomError::RoomFull(self.room_id));
        }

        self.seats.insert(
            ident.clone(),
            Seat {
                session,
                connected: true,
                generation: 0,
            },
        );
        self.shared.players.store(self.seats.len(), Ordering::Release);
        info!(room_id = %self.room_id, %ident, players = self.seats.len(), "player seated");

        let out = self.game.on_player_join(&ident);
        deliver(&self.seats, out, self.config.send_timeout).await;
        Ok(())
    }

    async fn handle_reconnect(&mut self, session: Arc<Session>) -> Result<(), RoomError> {
        let ident = session.ident().to_owned();
        let Some(seat) = self.seats.get_mut(&ident) else {
            return Err(RoomError::NotInRoom(ident, self.room_id));
        };
        seat.session = session;
        seat.connected = true;
        seat.generation += 1;
        debug!(room_id = %self.room_id, %ident, "seat resumed");

        let out = self.game.on_player_reconnect(&ident);
        deliver(&self.seats, out, self.config.send_timeout).await;
        Ok(())
    }

    async fn handle_disconnect(&mut self, session: &Arc<Session>) -> Result<(), RoomError> {
        let ident = session.ident().to_owned();
        let seat = self.seat_of(session)?;
        seat.connected = false;
        seat.generation += 1;
        let generation = seat.generation;

        self.start_grace(ident.clone(), generation);
        debug!(room_id = %self.room_id, %ident, grace_ms = self.config.reconnect_grace.as_millis() as u64, "seat held");

        let out = self.game.on_player_disconnect(&ident);
        deliver(&self.seats, out, self.config.send_timeout).await;
        Ok(())
    }

    async fn handle_message(&mut self, session: &Arc<Session>, command: &Command) -> Result<(), RoomError> {
        self.seat_of(session)?;
        let ident = session.ident();

        if let Err(reason) = self.game.validate_command(ident, command) {
            debug!(room_id = %self.room_id, %ident, %reason, "command rejected");
            return Err(RoomError::Rejected(reason));
        }

        let out = self.game.handle_command(ident, command);
        deliver(&self.seats, out, self.config.send_timeout).await;
        Ok(())
    }

    /// Unlike grace expiry, the manager already knows: no exit follows.
    async fn handle_leave(&mut self, session: &Arc<Session>) -> Result<(), RoomError> {
        self.seat_of(session)?;
        let ident = session.ident();
        self.seats.remove(ident);
        self.shared.players.store(self.seats.len(), Ordering::Release);
        info!(room_id = %self.room_id, %ident, players = self.seats.len(), "player left, seat released");

        let out = self.game.on_player_leave(ident);
        deliver(&self.seats, out, self.config.send_timeout).await;
        Ok(())
    }

    async fn handle_grace_expired(&mut self, ident: &str, generation: u64) {
        let expired = self
            .seats
            .get(ident)
            .is_some_and(|s| !s.connected && s.generation == generation);
        if !expired {
            return;
        }
        let Some(seat) = self.seats.remove(ident) else {
            return;
        };
        self.shared.players.store(self.seats.len(), Ordering::Release);
        info!(room_id = %self.room_id, %ident, "grace expired, seat released");

        let out = self.game.on_player_leave(ident);
        deliver(&self.seats, out, self.config.send_timeout).await;

        // Off the actor task: exiting a single-use room disposes it, which
        // sends back into this actor's channel.
        tokio::spawn(async move {
            crate::manager::exit_room(&seat.session, false).await;
        });
    }

    fn seat_of(&mut self, session: &Arc<Session>) -> Result<&mut Seat, RoomError> {
        let room_id = self.room_id;
        match self.seats.get_mut(session.ident()) {
            Some(seat) if Arc::ptr_eq(&seat.session, session) => Ok(seat),
            _ => Err(RoomError::NotInRoom(session.ident().to_owned(), room_id)),
        }
    }

    fn start_grace(&self, ident: String, generation: u64) {
        let grace = self.config.reconnect_grace;
        let sender = self.timer_sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(RoomCommand::GraceExpired { ident, generation }).await;
            }
        });
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id,
            player_count: self.seats.len(),
            connected_count: self.seats.values().filter(|s| s.connected).count(),
            max_players: self.config.max_players,
        }
    }
}

/// Sends each frame to its connected recipients. Sends run concurrently,
/// each bounded by `timeout`; a failed or stalled one disconnects only that
/// player.
async fn deliver(seats: &HashMap<String, Seat>, out: Outbound, timeout: Duration) {
    for (recipient, frame) in out {
        let sends = seats
            .iter()
            .filter(|(ident, seat)| seat.connected && recipient.includes(ident))
            .map(|(_, seat)| send_one(&seat.session, frame.clone(), timeout));
        join_all(sends).await;
    }
}

async fn send_one(session: &Arc<Session>, frame: Frame, timeout: Duration) {
    if let Err(e) = session.send_within(frame, timeout).await {
        debug!(ident = %session.ident(), error = %e, "room send failed");
    }
}
