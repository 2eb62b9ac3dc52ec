//! Integration tests for the gateway: every brand's connect sequence and
//! message loop over a real WebSocket.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gamehub::prelude::*;
use gamehub_protocol::envelope;
use gamehub_protocol::sfs::{SfsMessage, SfsObject, SfsValue};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Mock game
// =========================================================================

/// Greets each player and echoes every command back to its sender as
/// `reply_to:kind:payload`.
struct EchoGame;

impl GameLogic for EchoGame {
    type Config = ();

    fn create(_room_id: RoomId, _args: &RoomArgs, _config: &()) -> Self {
        EchoGame
    }

    fn handle_command(&mut self, sender: &str, command: &Command) -> Outbound {
        let text = format!(
            "{}:{}:{}",
            command.reply_to.as_deref().unwrap_or("-"),
            command.kind,
            String::from_utf8_lossy(&command.payload)
        );
        vec![(Recipient::Player(sender.to_owned()), Frame::Text(text))]
    }

    fn validate_command(&self, _sender: &str, command: &Command) -> Result<(), String> {
        match command.action_name() {
            Some("forbidden") => Err("forbidden".into()),
            _ => Ok(()),
        }
    }

    fn on_player_join(&mut self, player: &str) -> Outbound {
        vec![(Recipient::Player(player.to_owned()), Frame::Text(format!("welcome:{player}")))]
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const SECRET: &str = "test-secret";
const WAIT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: String,
    manager: Arc<RoomManager>,
    game: String,
    brand: GameBrand,
}

impl TestServer {
    async fn start(game: &str, brand: GameBrand) -> Self {
        Self::start_with(game, brand, |b| b).await
    }

    async fn start_with(
        game: &str,
        brand: GameBrand,
        tweak: impl FnOnce(GatewayServerBuilder) -> GatewayServerBuilder,
    ) -> Self {
        let config = GatewayConfig {
            bind_addr: "127.0.0.1:0".into(),
            game_name: game.into(),
            brand,
            ..GatewayConfig::default()
        };
        let services = Services {
            profiles: Arc::new(InMemoryProfiles::with_fallback(PlayerProfile::new("USD", brand))),
            ledger: Arc::new(InMemoryLedger::new(100.0)),
            rtp: Arc::new(FixedRtp("95".into())),
        };
        let server = tweak(GatewayServer::builder().config(config))
            .build(
                SsoTokenAuthenticator::new(TokenConfig::new(SECRET)),
                services,
                Arc::new(ActorRoomCreator::<EchoGame>::default()),
            )
            .await
            .expect("server should build");

        let addr = server.local_addr().expect("should have local addr").to_string();
        let manager = Arc::clone(server.manager());
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            manager,
            game: game.into(),
            brand,
        }
    }

    fn token(&self, player: &str) -> String {
        SsoTokenAuthenticator::new(TokenConfig::new(SECRET))
            .encode(&PlayerIdentity::new("app1", player), self.brand.as_str(), &self.game)
            .expect("token should encode")
    }

    async fn connect(&self, path_and_query: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}{path_and_query}", self.addr))
            .await
            .expect("should connect");
        ws
    }

    /// Engine.IO client past the open packet.
    async fn inout_client(&self, player: &str) -> ClientWs {
        let mut ws = self
            .connect(&format!("/{}/io?Authorization={}", self.game, self.token(player)))
            .await;
        let open = recv_text(&mut ws).await;
        assert!(open.starts_with(r#"0{"sid":""#), "unexpected open frame {open}");
        ws
    }

    /// Engine.IO client logged in, with the login frames drained.
    async fn inout_logged_in(&self, player: &str) -> ClientWs {
        let mut ws = self.inout_client(player).await;
        send_text(&mut ws, "40").await;
        for _ in 0..5 {
            recv_text(&mut ws).await;
        }
        ws
    }
}

async fn send_text(ws: &mut ClientWs, text: &str) {
    ws.send(Message::Text(text.into())).await.expect("send should succeed");
}

async fn send_binary(ws: &mut ClientWs, data: Vec<u8>) {
    ws.send(Message::Binary(data.into())).await.expect("send should succeed");
}

async fn recv(ws: &mut ClientWs) -> Message {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read should succeed");
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return msg;
        }
    }
}

async fn recv_text(ws: &mut ClientWs) -> String {
    match recv(ws).await {
        Message::Text(text) => text.as_str().to_owned(),
        other => panic!("expected text, got {other:?}"),
    }
}

async fn recv_binary(ws: &mut ClientWs) -> Vec<u8> {
    match recv(ws).await {
        Message::Binary(data) => data.to_vec(),
        other => panic!("expected binary, got {other:?}"),
    }
}

/// Waits for the server to close the socket, skipping data frames.
async fn assert_closed(ws: &mut ClientWs) {
    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server did not close the connection");
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never became true");
}

fn sfs(controller: u8, action: i16, params: SfsObject) -> Vec<u8> {
    SfsMessage::new(controller, action, params).to_packet()
}

// =========================================================================
// Engine.IO (inout)
// =========================================================================

#[tokio::test]
async fn test_inout_connect_sends_login_frames_in_order() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_client("p1").await;

    send_text(&mut ws, "40").await;

    let ack = recv_text(&mut ws).await;
    assert!(ack.starts_with(r#"40{"sid":""#), "got {ack}");
    let balance = recv_text(&mut ws).await;
    assert!(balance.starts_with(r#"42["onBalanceChange""#), "got {balance}");
    assert!(balance.contains(r#""balance":"100.00""#));
    assert_eq!(recv_text(&mut ws).await, "welcome:app1-p1");
    let my_data = recv_text(&mut ws).await;
    assert!(my_data.starts_with(r#"42["myData""#));
    assert!(my_data.contains(r#""userId":"p1""#));
    assert_eq!(recv_text(&mut ws).await, r#"42["currencies",{"USD":1.0}]"#);

    assert_eq!(server.manager.session_count(), 1);
    assert_eq!(server.manager.registered_rooms("app1-95").len(), 1);
}

#[tokio::test]
async fn test_inout_ping_answered_with_pong() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_logged_in("p1").await;

    send_text(&mut ws, "2").await;
    assert_eq!(recv_text(&mut ws).await, "3");
}

#[tokio::test]
async fn test_inout_latency_test_answered_locally() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_logged_in("p1").await;

    send_text(&mut ws, r#"421["gameService-latencyTest"]"#).await;
    let reply = recv_text(&mut ws).await;
    assert!(reply.starts_with(r#"431[{"date":"#), "got {reply}");
}

#[tokio::test]
async fn test_inout_game_service_routed_to_room() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_logged_in("p1").await;

    send_text(&mut ws, r#"427["gameService",{"action":"bet","payload":{"amount":5}}]"#).await;
    assert_eq!(recv_text(&mut ws).await, r#"437:bet:{"amount":5}"#);
}

#[tokio::test]
async fn test_inout_bets_history_routed_with_empty_payload() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_logged_in("p1").await;

    send_text(&mut ws, r#"423["gameService-get-my-bets-history"]"#).await;
    assert_eq!(recv_text(&mut ws).await, "433:gameService-get-my-bets-history:{}");
}

#[tokio::test]
async fn test_inout_rejected_command_gets_error_frame() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_logged_in("p1").await;

    send_text(&mut ws, r#"424["gameService",{"action":"forbidden"}]"#).await;
    assert_eq!(recv_text(&mut ws).await, r#"434[{"error":{"message":"forbidden"}}]"#);

    // The connection survives a rejection.
    send_text(&mut ws, "2").await;
    assert_eq!(recv_text(&mut ws).await, "3");
}

#[tokio::test]
async fn test_inout_non_event_custom_frame_gets_null_reply() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_logged_in("p1").await;

    send_text(&mut ws, "450").await;
    assert_eq!(recv_text(&mut ws).await, "430[null]");
}

#[tokio::test]
async fn test_inout_bad_token_closes_without_open_frame() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.connect("/crash/io?Authorization=nothex").await;

    let first = tokio::time::timeout(WAIT, ws.next()).await.expect("server should react");
    assert!(
        matches!(first, None | Some(Err(_)) | Some(Ok(Message::Close(_)))),
        "expected close, got {first:?}"
    );
    assert_eq!(server.manager.session_count(), 0);
}

#[tokio::test]
async fn test_inout_malformed_frame_closes_connection() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_logged_in("p1").await;

    send_text(&mut ws, "hello").await;
    assert_closed(&mut ws).await;
}

#[tokio::test]
async fn test_inout_second_login_evicts_first_connection() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut first = server.inout_logged_in("p1").await;

    let mut second = server.inout_client("p1").await;
    send_text(&mut second, "40").await;
    assert!(recv_text(&mut second).await.starts_with("40"));

    assert_closed(&mut first).await;
    assert_eq!(server.manager.session_count(), 1);
    assert_eq!(server.manager.registered_rooms("app1-95").len(), 1);

    send_text(&mut second, "2").await;
    loop {
        if recv_text(&mut second).await == "3" {
            break;
        }
    }
}

#[tokio::test]
async fn test_inout_client_close_keeps_directory_entry() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.inout_logged_in("p1").await;

    ws.close(None).await.expect("close should succeed");

    let manager = Arc::clone(&server.manager);
    eventually(move || manager.connected_sessions().is_empty()).await;
    assert_eq!(server.manager.session_count(), 1);
    assert!(server.manager.directory_room("app1-p1").is_some());
}

#[tokio::test]
async fn test_inout_heartbeat_pushes_ping() {
    let server = TestServer::start_with("crash", GameBrand::Inout, |b| {
        b.heartbeat(Some(HeartbeatConfig::new(Duration::from_millis(100), "2")))
    })
    .await;
    let mut ws = server.inout_client("p1").await;
    send_text(&mut ws, "40").await;

    // A beat may land between login frames; wait for one after them.
    let mut seen_currencies = false;
    loop {
        let text = recv_text(&mut ws).await;
        if text.starts_with(r#"42["currencies""#) {
            seen_currencies = true;
        } else if seen_currencies && text == "2" {
            break;
        }
    }
}

#[tokio::test]
async fn test_unknown_route_closes_connection() {
    let server = TestServer::start("crash", GameBrand::Inout).await;
    let mut ws = server.connect("/other/io?Authorization=x").await;

    assert_closed(&mut ws).await;
}

// =========================================================================
// Protobuf (jili)
// =========================================================================

#[tokio::test]
async fn test_jili_logs_in_from_path_token() {
    let server = TestServer::start("fish", GameBrand::Jili).await;
    let mut ws = server.connect(&format!("/fish/ws/{}", server.token("p1"))).await;

    assert_eq!(recv_text(&mut ws).await, "welcome:app1-p1");
    assert_eq!(server.manager.session_count(), 1);
}

#[tokio::test]
async fn test_jili_envelope_routed_as_code() {
    let server = TestServer::start("fish", GameBrand::Jili).await;
    let mut ws = server.connect(&format!("/fish/ws/{}", server.token("p1"))).await;
    recv_text(&mut ws).await;

    send_binary(&mut ws, envelope::pack(7, b"hi")).await;
    assert_eq!(recv_text(&mut ws).await, "-:#7:hi");
}

#[tokio::test]
async fn test_jili_bad_token_closes() {
    let server = TestServer::start("fish", GameBrand::Jili).await;
    let mut ws = server.connect("/fish/ws/00ff").await;

    assert_closed(&mut ws).await;
    assert_eq!(server.manager.session_count(), 0);
}

// =========================================================================
// SFS (spribe, jdb)
// =========================================================================

async fn sfs_handshake(ws: &mut ClientWs) -> SfsMessage {
    send_binary(ws, sfs(0, 0, SfsObject::new().with("api", "1.8.0"))).await;
    SfsMessage::from_packet(&recv_binary(ws).await).expect("handshake reply should decode")
}

#[tokio::test]
async fn test_spribe_handshake_then_login() {
    let server = TestServer::start("aviator", GameBrand::Spribe).await;
    let mut ws = server.connect("/aviator/websocket").await;

    let reply = sfs_handshake(&mut ws).await;
    assert!(reply.is(0, 0));
    assert_eq!(reply.params.get("ct").and_then(SfsValue::as_i64), Some(1024));

    let login = SfsObject::new().with("zn", "aviator").with("p", SfsObject::new().with("token", server.token("p1")));
    send_binary(&mut ws, sfs(0, 1, login)).await;

    assert_eq!(recv_text(&mut ws).await, "welcome:app1-p1");
    assert_eq!(server.manager.session_count(), 1);
}

#[tokio::test]
async fn test_spribe_extension_routed_by_command_name() {
    let server = TestServer::start("aviator", GameBrand::Spribe).await;
    let mut ws = server.connect("/aviator/websocket").await;
    sfs_handshake(&mut ws).await;
    let login = SfsObject::new().with("p", SfsObject::new().with("token", server.token("p1")));
    send_binary(&mut ws, sfs(0, 1, login)).await;
    recv_text(&mut ws).await;

    let bet = SfsMessage::extension("betHandler", SfsObject::new().with("bet", "1.00"));
    send_binary(&mut ws, bet.to_packet()).await;

    assert!(recv_text(&mut ws).await.starts_with("-:betHandler:"));
}

#[tokio::test]
async fn test_spribe_login_out_of_order_closes() {
    let server = TestServer::start("aviator", GameBrand::Spribe).await;
    let mut ws = server.connect("/aviator/websocket").await;

    send_binary(&mut ws, sfs(0, 1, SfsObject::new())).await;
    assert_closed(&mut ws).await;
}

#[tokio::test]
async fn test_jdb_zone_login_then_game_login() {
    let server = TestServer::start("slots", GameBrand::Jdb).await;
    let mut ws = server.connect("/slots/websocket").await;
    sfs_handshake(&mut ws).await;

    let zone = SfsObject::new().with("un", "guest").with("zn", "jdb");
    send_binary(&mut ws, sfs(0, 1, zone)).await;
    let reply = SfsMessage::from_packet(&recv_binary(&mut ws).await).unwrap();
    assert!(reply.is(0, 1));
    assert_eq!(reply.params.get_str("un"), Some("guest"));

    let game_login = SfsMessage::extension("gameLogin", SfsObject::new().with("sessionID3", server.token("p1")));
    send_binary(&mut ws, game_login.to_packet()).await;
    assert_eq!(recv_text(&mut ws).await, "welcome:app1-p1");
}

#[tokio::test]
async fn test_jdb_ping_echoed() {
    let server = TestServer::start("slots", GameBrand::Jdb).await;
    let mut ws = server.connect("/slots/websocket").await;
    sfs_handshake(&mut ws).await;
    send_binary(&mut ws, sfs(0, 1, SfsObject::new())).await;
    recv_binary(&mut ws).await;
    let game_login = SfsMessage::extension("gameLogin", SfsObject::new().with("sessionID3", server.token("p1")));
    send_binary(&mut ws, game_login.to_packet()).await;
    recv_text(&mut ws).await;

    let ping = sfs(0, 29, SfsObject::new());
    send_binary(&mut ws, ping.clone()).await;
    assert_eq!(recv_binary(&mut ws).await, ping);
}
