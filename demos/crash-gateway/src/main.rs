use std::sync::Arc;
use std::time::Duration;

use gamehub::prelude::*;
use gamehub_protocol::engineio;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CrashConfig {
    /// Multiplier growth per second of flight.
    pub growth: f64,
    pub betting_window: Duration,
    pub cooldown: Duration,
    pub max_bet: f64,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            growth: 0.25,
            betting_window: Duration::from_secs(5),
            cooldown: Duration::from_secs(3),
            max_bet: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Betting { left: Duration },
    Flying { multiplier: f64, crash_at: f64 },
    Crashed { left: Duration },
}

#[derive(Deserialize)]
struct BetPayload {
    amount: f64,
}

// ---------------------------------------------------------------------------
// Game logic
// ---------------------------------------------------------------------------

struct CrashGame {
    config: CrashConfig,
    phase: Phase,
    round: u64,
    /// Open bets of this round, by player ident.
    bets: Vec<(String, f64)>,
}

impl CrashGame {
    fn event(name: &str, data: serde_json::Value) -> Frame {
        Frame::Text(engineio::game_service_data("", name, &data))
    }

    fn reply(command: &Command, data: serde_json::Value) -> Frame {
        let msg_id = command.reply_to.as_deref().unwrap_or_default();
        let action = command.action_name().unwrap_or_default();
        Frame::Text(engineio::game_service_data(msg_id, action, &data))
    }

    fn start_betting(&mut self) -> Outbound {
        self.round += 1;
        self.bets.clear();
        self.phase = Phase::Betting {
            left: self.config.betting_window,
        };
        vec![(Recipient::All, Self::event("betting", json!({ "round": self.round })))]
    }

    fn take_off(&mut self) -> Outbound {
        let crash_at = crash_point(rand::random::<f64>());
        self.phase = Phase::Flying {
            multiplier: 1.0,
            crash_at,
        };
        vec![(Recipient::All, Self::event("takeOff", json!({ "round": self.round })))]
    }
}

/// Maps a uniform sample to a crash multiplier with a 1% house edge,
/// capped at 1000x.
fn crash_point(sample: f64) -> f64 {
    let point = 0.99 / (1.0 - sample.clamp(0.0, 0.999_999));
    point.clamp(1.0, 1000.0)
}

impl GameLogic for CrashGame {
    type Config = CrashConfig;

    fn create(_room_id: RoomId, _args: &RoomArgs, config: &CrashConfig) -> Self {
        Self {
            config: config.clone(),
            phase: Phase::Betting {
                left: config.betting_window,
            },
            round: 1,
            bets: Vec::new(),
        }
    }

    fn validate_command(&self, sender: &str, command: &Command) -> Result<(), String> {
        match command.action_name() {
            Some("bet") => {
                if !matches!(self.phase, Phase::Betting { .. }) {
                    return Err("betting is closed".into());
                }
                let bet: BetPayload =
                    serde_json::from_slice(&command.payload).map_err(|_| "invalid bet".to_owned())?;
                if !(bet.amount > 0.0 && bet.amount <= self.config.max_bet) {
                    return Err("bet amount out of range".into());
                }
                if self.bets.iter().any(|(p, _)| p == sender) {
                    return Err("already placed a bet".into());
                }
                Ok(())
            }
            Some("cashout") => {
                if !matches!(self.phase, Phase::Flying { .. }) {
                    return Err("not flying".into());
                }
                if !self.bets.iter().any(|(p, _)| p == sender) {
                    return Err("no open bet".into());
                }
                Ok(())
            }
            _ => Err("unknown action".into()),
        }
    }

    fn handle_command(&mut self, sender: &str, command: &Command) -> Outbound {
        match command.action_name() {
            Some("bet") => {
                let Ok(bet) = serde_json::from_slice::<BetPayload>(&command.payload) else {
                    return Vec::new();
                };
                self.bets.push((sender.to_owned(), bet.amount));
                vec![(
                    Recipient::Player(sender.to_owned()),
                    Self::reply(command, json!({ "round": self.round, "amount": bet.amount })),
                )]
            }
            Some("cashout") => {
                let Phase::Flying { multiplier, .. } = self.phase else {
                    return Vec::new();
                };
                let Some(pos) = self.bets.iter().position(|(p, _)| p == sender) else {
                    return Vec::new();
                };
                let (_, amount) = self.bets.swap_remove(pos);
                let win = (amount * multiplier * 100.0).round() / 100.0;
                vec![
                    (
                        Recipient::Player(sender.to_owned()),
                        Self::reply(command, json!({ "multiplier": multiplier, "win": win })),
                    ),
                    (
                        Recipient::AllExcept(sender.to_owned()),
                        Self::event("cashedOut", json!({ "player": sender, "multiplier": multiplier })),
                    ),
                ]
            }
            _ => Vec::new(),
        }
    }

    fn on_player_reconnect(&mut self, player: &str) -> Outbound {
        let state = match self.phase {
            Phase::Betting { .. } => json!({ "phase": "betting", "round": self.round }),
            Phase::Flying { multiplier, .. } => {
                json!({ "phase": "flying", "round": self.round, "multiplier": multiplier })
            }
            Phase::Crashed { .. } => json!({ "phase": "crashed", "round": self.round }),
        };
        vec![(Recipient::Player(player.to_owned()), Self::event("state", state))]
    }

    fn tick(&mut self, dt: Duration) -> Outbound {
        match self.phase {
            Phase::Betting { left } => match left.checked_sub(dt) {
                Some(left) if !left.is_zero() => {
                    self.phase = Phase::Betting { left };
                    Vec::new()
                }
                _ => self.take_off(),
            },
            Phase::Flying {
                multiplier,
                crash_at,
            } => {
                let next = multiplier * (1.0 + self.config.growth * dt.as_secs_f64());
                if next >= crash_at {
                    self.bets.clear();
                    self.phase = Phase::Crashed {
                        left: self.config.cooldown,
                    };
                    tracing::info!(round = self.round, crash_at, "round crashed");
                    vec![(Recipient::All, Self::event("crash", json!({ "multiplier": crash_at })))]
                } else {
                    self.phase = Phase::Flying {
                        multiplier: next,
                        crash_at,
                    };
                    vec![(Recipient::All, Self::event("x", json!({ "multiplier": next })))]
                }
            }
            Phase::Crashed { left } => match left.checked_sub(dt) {
                Some(left) if !left.is_zero() => {
                    self.phase = Phase::Crashed { left };
                    Vec::new()
                }
                _ => self.start_betting(),
            },
        }
    }

    fn room_config() -> RoomConfig {
        RoomConfig {
            max_players: 200,
            tick_rate: 10,
            ..RoomConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;
    let secret = std::env::var("GAMEHUB_SECRET").unwrap_or_else(|_| "dev-secret".into());
    let auth = SsoTokenAuthenticator::new(TokenConfig::new(secret));

    let dev_token = auth.encode(
        &PlayerIdentity::new("demo", "player1"),
        config.brand.as_str(),
        &config.game_name,
    )?;
    tracing::info!(token = %dev_token, "development token for demo-player1");

    let services = Services {
        profiles: Arc::new(InMemoryProfiles::with_fallback(PlayerProfile::new("USD", config.brand))),
        ledger: Arc::new(InMemoryLedger::new(1_000.0)),
        rtp: Arc::new(FixedRtp("97".into())),
    };

    let server = GatewayServer::builder()
        .config(config)
        .build(auth, services, Arc::new(ActorRoomCreator::<CrashGame>::default()))
        .await?;
    tracing::info!(addr = %server.local_addr()?, "crash gateway listening");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
