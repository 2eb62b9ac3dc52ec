//! Gateway configuration.
//!
//! Loadable from any serde source, or from `GAMEHUB_*` environment
//! variables via [`GatewayConfig::from_env`].

use std::collections::BTreeMap;
use std::time::Duration;

use gamehub_protocol::GameBrand;
use gamehub_room::{HeartbeatConfig, TableMatcher};
use serde::{Deserialize, Serialize};

use crate::GatewayError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
    /// First path segment every route is mounted under.
    pub game_name: String,
    pub brand: GameBrand,
    pub matcher: TableMatcher,
    /// Keep-alive period in seconds. `None` uses the brand default and `0`
    /// disables the heartbeat.
    pub heartbeat_secs: Option<u64>,
    /// How long a client may take over each connect/login frame.
    pub login_timeout_secs: u64,
    /// Longest silence tolerated once logged in. `0` waits forever.
    pub idle_timeout_secs: u64,
    /// Exchange-rate table pushed to Engine.IO clients after login.
    pub exchange_rates: BTreeMap<String, f64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_owned(),
            game_name: "crash".to_owned(),
            brand: GameBrand::Inout,
            matcher: TableMatcher::Rtp,
            heartbeat_secs: None,
            login_timeout_secs: 10,
            idle_timeout_secs: 90,
            exchange_rates: BTreeMap::from([("USD".to_owned(), 1.0)]),
        }
    }
}

impl GatewayConfig {
    /// Reads `GAMEHUB_BIND`, `GAMEHUB_GAME`, `GAMEHUB_BRAND`,
    /// `GAMEHUB_MATCHER`, `GAMEHUB_HEARTBEAT_SECS`, `GAMEHUB_LOGIN_TIMEOUT_SECS`
    /// and `GAMEHUB_IDLE_TIMEOUT_SECS`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let mut config = Self::default();
        if let Some(addr) = lookup("GAMEHUB_BIND") {
            config.bind_addr = addr;
        }
        if let Some(game) = lookup("GAMEHUB_GAME") {
            config.game_name = game;
        }
        if let Some(brand) = lookup("GAMEHUB_BRAND") {
            config.brand = brand
                .parse()
                .map_err(|e| GatewayError::Config(format!("GAMEHUB_BRAND: {e}")))?;
        }
        if let Some(matcher) = lookup("GAMEHUB_MATCHER") {
            config.matcher = parse_matcher(&matcher)?;
        }
        if let Some(secs) = lookup("GAMEHUB_HEARTBEAT_SECS") {
            config.heartbeat_secs = Some(parse_secs("GAMEHUB_HEARTBEAT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("GAMEHUB_LOGIN_TIMEOUT_SECS") {
            config.login_timeout_secs = parse_secs("GAMEHUB_LOGIN_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("GAMEHUB_IDLE_TIMEOUT_SECS") {
            config.idle_timeout_secs = parse_secs("GAMEHUB_IDLE_TIMEOUT_SECS", &secs)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.game_name.is_empty() || self.game_name.contains('/') {
            return Err(GatewayError::Config(format!(
                "game name {:?} is not a single path segment",
                self.game_name
            )));
        }
        if self.login_timeout_secs == 0 {
            return Err(GatewayError::Config("login timeout must be positive".into()));
        }
        Ok(())
    }

    /// The heartbeat to run, if any.
    pub fn heartbeat(&self) -> Option<HeartbeatConfig> {
        match self.heartbeat_secs {
            Some(0) => None,
            Some(secs) => self
                .brand
                .heartbeat_frame()
                .map(|frame| HeartbeatConfig::new(Duration::from_secs(secs), frame)),
            None => HeartbeatConfig::for_brand(self.brand),
        }
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

fn parse_matcher(value: &str) -> Result<TableMatcher, GatewayError> {
    match value.to_ascii_lowercase().as_str() {
        "rtp" => Ok(TableMatcher::Rtp),
        "single" => Ok(TableMatcher::Single),
        "custom" => Ok(TableMatcher::Custom),
        other => Err(GatewayError::Config(format!("GAMEHUB_MATCHER: unknown matcher {other:?}"))),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, GatewayError> {
    value
        .trim()
        .parse()
        .map_err(|_| GatewayError::Config(format!("{key}: {value:?} is not a number of seconds")))
}
