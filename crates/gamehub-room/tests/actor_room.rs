//! Integration tests for actor-hosted rooms using a mock game.

use std::sync::Arc;
use std::time::Duration;

use gamehub_protocol::{Command, GameBrand, PlayerIdentity, RoomId};
use gamehub_room::{
    ActorRoom, ActorRoomCreator, GameLogic, Outbound, Recipient, Room, RoomArgs, RoomConfig, RoomError,
    RoomManager, Session, TableMatcher,
};
use gamehub_session::PlayerProfile;
use gamehub_transport::{Connection, Frame, MemoryConnection, MemoryPeer, memory_pair};

// =========================================================================
// Mock game: a shared counter; two seats, short grace, optional ticking.
// =========================================================================

#[derive(Debug)]
struct CounterGame {
    count: u32,
    limit: u32,
}

#[derive(Clone, Debug, Default)]
struct CounterConfig {
    limit: u32,
}

impl GameLogic for CounterGame {
    type Config = CounterConfig;

    fn create(_room_id: RoomId, _args: &RoomArgs, config: &CounterConfig) -> Self {
        Self {
            count: 0,
            limit: if config.limit == 0 { u32::MAX } else { config.limit },
        }
    }

    fn handle_command(&mut self, sender: &str, _command: &Command) -> Outbound {
        self.count += 1;
        vec![
            (Recipient::All, Frame::Text(format!("count:{}", self.count))),
            (Recipient::Player(sender.to_owned()), Frame::Text("ack".into())),
        ]
    }

    fn validate_command(&self, _sender: &str, command: &Command) -> Result<(), String> {
        if command.action_name() != Some("inc") {
            return Err("unknown command".into());
        }
        if self.count >= self.limit {
            return Err("limit reached".into());
        }
        Ok(())
    }

    fn on_player_join(&mut self, player: &str) -> Outbound {
        vec![(Recipient::AllExcept(player.to_owned()), Frame::Text(format!("joined:{player}")))]
    }

    fn on_player_reconnect(&mut self, player: &str) -> Outbound {
        vec![(Recipient::Player(player.to_owned()), Frame::Text(format!("state:{}", self.count)))]
    }

    fn on_player_leave(&mut self, player: &str) -> Outbound {
        vec![(Recipient::All, Frame::Text(format!("left:{player}")))]
    }

    fn room_config() -> RoomConfig {
        RoomConfig {
            max_players: 2,
            reconnect_grace: Duration::from_secs(10),
            ..RoomConfig::default()
        }
    }
}

/// Same rules, ticking at 10 Hz.
struct TickingGame {
    ticks: u32,
}

impl GameLogic for TickingGame {
    type Config = ();

    fn create(_room_id: RoomId, _args: &RoomArgs, _config: &()) -> Self {
        Self { ticks: 0 }
    }

    fn handle_command(&mut self, _sender: &str, _command: &Command) -> Outbound {
        Vec::new()
    }

    fn tick(&mut self, _dt: Duration) -> Outbound {
        self.ticks += 1;
        vec![(Recipient::All, Frame::Text(format!("tick:{}", self.ticks)))]
    }

    fn room_config() -> RoomConfig {
        RoomConfig {
            tick_rate: 10,
            ..RoomConfig::default()
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn rtp_args() -> RoomArgs {
    RoomArgs::Rtp {
        app_id: "app1".into(),
        rtp: "95".into(),
        currency: "USD".into(),
    }
}

fn counter_manager(matcher: TableMatcher) -> Arc<RoomManager> {
    RoomManager::builder(matcher, Arc::new(ActorRoomCreator::<CounterGame>::default())).build()
}

fn connect(mgr: &Arc<RoomManager>, player: &str) -> (Arc<Session>, Arc<MemoryConnection>, MemoryPeer) {
    let (conn, peer) = memory_pair();
    let conn = Arc::new(conn);
    let session = mgr
        .new_session(
            PlayerIdentity::new("app1", player),
            PlayerProfile::new("USD", GameBrand::Jili),
            "95",
        )
        .with_connection(conn.clone());
    (Arc::new(session), conn, peer)
}

fn text(frame: Option<Frame>) -> String {
    frame.and_then(|f| f.as_text().map(str::to_owned)).unwrap_or_default()
}

fn inc() -> Command {
    Command::action("inc", Vec::new())
}

// =========================================================================
// Seating
// =========================================================================

#[tokio::test]
async fn test_on_join_seats_and_notifies_others() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let room = ActorRoom::<CounterGame>::spawn(RoomId(1), &rtp_args(), &CounterConfig::default());
    let (a, _ca, mut pa) = connect(&mgr, "a");
    let (b, _cb, mut pb) = connect(&mgr, "b");

    room.on_join(&a).await.unwrap();
    room.on_join(&b).await.unwrap();

    assert_eq!(room.player_count(), 2);
    assert_eq!(text(pa.recv().await), "joined:app1-b");
    assert_eq!(pb.try_recv(), None);
}

#[tokio::test]
async fn test_on_join_full_room_refused() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let room = ActorRoom::<CounterGame>::spawn(RoomId(2), &rtp_args(), &CounterConfig::default());
    for p in ["a", "b"] {
        let (s, _c, _p) = connect(&mgr, p);
        room.on_join(&s).await.unwrap();
    }
    let (c, _cc, _pc) = connect(&mgr, "c");

    let err = room.on_join(&c).await.unwrap_err();
    assert!(matches!(err, RoomError::RoomFull(RoomId(2))));
}

#[tokio::test]
async fn test_on_join_twice_refused() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let room = ActorRoom::<CounterGame>::spawn(RoomId(3), &rtp_args(), &CounterConfig::default());
    let (a, _ca, _pa) = connect(&mgr, "a");

    room.on_join(&a).await.unwrap();
    assert!(matches!(room.on_join(&a).await, Err(RoomError::AlreadyInRoom(..))));
}

#[tokio::test]
async fn test_manager_scans_past_full_actor_room() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let mut sessions = Vec::new();
    for p in ["a", "b", "c"] {
        let (s, c, peer) = connect(&mgr, p);
        mgr.login(&s).await.unwrap();
        sessions.push((s, c, peer));
    }

    let rooms = mgr.registered_rooms("app1-95");
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].player_count(), 2);
    assert_eq!(rooms[1].player_count(), 1);
}

// =========================================================================
// Commands
// =========================================================================

#[tokio::test]
async fn test_on_message_broadcasts_and_acks_sender() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let (a, _ca, mut pa) = connect(&mgr, "a");
    let (b, _cb, mut pb) = connect(&mgr, "b");
    mgr.login(&a).await.unwrap();
    mgr.login(&b).await.unwrap();
    assert_eq!(text(pa.recv().await), "joined:app1-b");

    mgr.on_message(&a, &inc()).await.unwrap();

    assert_eq!(text(pa.recv().await), "count:1");
    assert_eq!(text(pa.recv().await), "ack");
    assert_eq!(text(pb.recv().await), "count:1");
    assert_eq!(pb.try_recv(), None);
}

#[tokio::test]
async fn test_on_message_invalid_command_rejected() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let (a, _ca, _pa) = connect(&mgr, "a");
    mgr.login(&a).await.unwrap();

    let err = mgr
        .on_message(&a, &Command::action("dec", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::Rejected(r) if r == "unknown command"));
}

#[tokio::test]
async fn test_on_message_from_non_member_rejected() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let room = ActorRoom::<CounterGame>::spawn(RoomId(4), &rtp_args(), &CounterConfig::default());
    let (a, _ca, _pa) = connect(&mgr, "a");

    assert!(matches!(room.on_message(&a, &inc()).await, Err(RoomError::NotInRoom(..))));
}

#[tokio::test]
async fn test_send_failure_isolated_to_one_player() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let (a, _ca, mut pa) = connect(&mgr, "a");
    let (b, cb, _pb) = connect(&mgr, "b");
    mgr.login(&a).await.unwrap();
    mgr.login(&b).await.unwrap();
    let _ = pa.recv().await;
    cb.break_sends();

    mgr.on_message(&a, &inc()).await.unwrap();

    assert_eq!(text(pa.recv().await), "count:1");
    assert!(cb.is_closed());
    assert!(!b.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_recipient_does_not_freeze_room() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let (a, _ca, mut pa) = connect(&mgr, "a");
    let (b, cb, _pb) = connect(&mgr, "b");
    mgr.login(&a).await.unwrap();
    mgr.login(&b).await.unwrap();
    let _ = pa.recv().await;
    cb.stall_sends();

    let first = tokio::time::timeout(Duration::from_secs(30), mgr.on_message(&a, &inc())).await;
    assert!(matches!(first, Ok(Ok(()))));
    assert_eq!(text(pa.recv().await), "count:1");
    assert_eq!(text(pa.recv().await), "ack");
    assert!(!b.is_connected());

    // b is detached, so the next broadcast does not wait on it again.
    let start = tokio::time::Instant::now();
    mgr.on_message(&a, &inc()).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(text(pa.recv().await), "count:2");

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(cb.is_closed());
}

// =========================================================================
// Disconnect / reconnect / grace
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_resumes_seat() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let (a, _ca, _pa) = connect(&mgr, "a");
    mgr.login(&a).await.unwrap();
    mgr.on_message(&a, &inc()).await.unwrap();
    mgr.on_disconnect(&a).await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let (a2, _ca2, mut pa2) = connect(&mgr, "a");
    mgr.login(&a2).await.unwrap();

    assert_eq!(text(pa2.recv().await), "state:1");

    // The old grace timer fires later and must not release the seat.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let room = mgr.directory_room("app1-a").unwrap();
    assert_eq!(room.player_count(), 1);
    assert!(mgr.is_active(&a2));
}

#[tokio::test(start_paused = true)]
async fn test_grace_expiry_releases_seat_and_exits() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let (a, _ca, mut pa) = connect(&mgr, "a");
    let (b, _cb, _pb) = connect(&mgr, "b");
    mgr.login(&a).await.unwrap();
    mgr.login(&b).await.unwrap();
    let _ = pa.recv().await;

    mgr.on_disconnect(&b).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(text(pa.recv().await), "left:app1-b");
    let room = mgr.directory_room("app1-a").unwrap();
    assert_eq!(room.player_count(), 1);
    assert!(mgr.directory_room("app1-b").is_none());
    assert!(!b.has_room());
}

#[tokio::test]
async fn test_exit_room_releases_seat_without_grace() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let (a, _ca, mut pa) = connect(&mgr, "a");
    let (b, _cb, _pb) = connect(&mgr, "b");
    mgr.login(&a).await.unwrap();
    mgr.login(&b).await.unwrap();
    let _ = pa.recv().await;
    let room = mgr.directory_room("app1-a").unwrap();

    mgr.exit_room(&b, false).await;

    assert_eq!(room.player_count(), 1);
    assert_eq!(text(pa.recv().await), "left:app1-b");

    // The freed seat is taken by the next player instead of a new room.
    let (c, _cc, _pc) = connect(&mgr, "c");
    mgr.login(&c).await.unwrap();
    assert_eq!(mgr.registered_rooms("app1-95").len(), 1);
    assert_eq!(room.player_count(), 2);
}

#[tokio::test]
async fn test_on_leave_from_non_member_rejected() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let room = ActorRoom::<CounterGame>::spawn(RoomId(9), &rtp_args(), &CounterConfig::default());
    let (a, _ca, _pa) = connect(&mgr, "a");

    assert!(matches!(room.on_leave(&a).await, Err(RoomError::NotInRoom(..))));
}

#[tokio::test(start_paused = true)]
async fn test_single_room_disposed_after_grace() {
    let mgr = counter_manager(TableMatcher::Single);
    let (a, _ca, _pa) = connect(&mgr, "a");
    mgr.login(&a).await.unwrap();
    let room = a.room().unwrap();

    mgr.on_disconnect(&a).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert!(!a.has_room());
    assert!(mgr.directory_room("app1-a").is_none());
    let (a2, _ca2, _pa2) = connect(&mgr, "a");
    assert!(matches!(room.on_reconnect(&a2).await, Err(RoomError::Disposed(_))));
}

// =========================================================================
// Dispose
// =========================================================================

#[tokio::test]
async fn test_disposed_room_refuses_every_call() {
    let mgr = counter_manager(TableMatcher::Single);
    let room = ActorRoom::<CounterGame>::spawn(RoomId(5), &RoomArgs::Single { app_id: "app1".into() }, &CounterConfig::default());
    let (a, _ca, _pa) = connect(&mgr, "a");
    room.on_join(&a).await.unwrap();

    room.on_dispose().await;
    room.on_dispose().await;

    assert!(room.is_disposed());
    assert!(matches!(room.on_join(&a).await, Err(RoomError::Disposed(_))));
    assert!(matches!(room.on_reconnect(&a).await, Err(RoomError::Disposed(_))));
    assert!(matches!(room.on_disconnect(&a).await, Err(RoomError::Disposed(_))));
    assert!(matches!(room.on_message(&a, &inc()).await, Err(RoomError::Disposed(_))));
    assert!(matches!(room.info().await, Err(RoomError::Disposed(_))));
}

#[tokio::test]
async fn test_info_reports_seats() {
    let mgr = counter_manager(TableMatcher::Rtp);
    let room = ActorRoom::<CounterGame>::spawn(RoomId(6), &rtp_args(), &CounterConfig::default());
    let (a, _ca, _pa) = connect(&mgr, "a");
    let (b, _cb, _pb) = connect(&mgr, "b");
    room.on_join(&a).await.unwrap();
    room.on_join(&b).await.unwrap();
    room.on_disconnect(&b).await.unwrap();

    let info = room.info().await.unwrap();
    assert_eq!(info.player_count, 2);
    assert_eq!(info.connected_count, 1);
    assert_eq!(info.max_players, 2);
}

// =========================================================================
// Ticking
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ticking_room_broadcasts_ticks() {
    let mgr = RoomManager::builder(TableMatcher::Rtp, Arc::new(ActorRoomCreator::<TickingGame>::default())).build();
    let (a, _ca, mut pa) = connect(&mgr, "a");
    mgr.login(&a).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(text(pa.try_recv()), "tick:1");
    assert_eq!(text(pa.try_recv()), "tick:2");
    assert_eq!(pa.try_recv(), None);
}
