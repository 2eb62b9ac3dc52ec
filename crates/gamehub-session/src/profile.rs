//! Player profile: the per-player settings the gateway reads at login.

use std::collections::HashMap;

use gamehub_protocol::{GameBrand, PlayerIdentity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Cached player settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub currency: String,
    /// Empty means "use the default" (see [`lang`](Self::lang)).
    #[serde(default)]
    pub lang: String,
    pub game_brand: GameBrand,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl PlayerProfile {
    pub fn new(currency: impl Into<String>, game_brand: GameBrand) -> Self {
        Self {
            currency: currency.into(),
            lang: String::new(),
            game_brand,
            game_id: String::new(),
            nickname: None,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = game_id.into();
        self
    }

    /// Client language, `"en"` when unset.
    pub fn lang(&self) -> &str {
        if self.lang.is_empty() { "en" } else { &self.lang }
    }
}

/// Read-through source of player profiles.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync + 'static {
    async fn load(&self, identity: &PlayerIdentity) -> Result<PlayerProfile, SessionError>;
}

/// Map-backed [`ProfileStore`] with an optional fallback for unknown
/// players.
#[derive(Default)]
pub struct InMemoryProfiles {
    profiles: RwLock<HashMap<String, PlayerProfile>>,
    fallback: Option<PlayerProfile>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unknown player gets a copy of `profile`.
    pub fn with_fallback(profile: PlayerProfile) -> Self {
        Self {
            profiles: RwLock::default(),
            fallback: Some(profile),
        }
    }

    pub fn insert(&self, identity: &PlayerIdentity, profile: PlayerProfile) {
        self.profiles.write().insert(identity.ident(), profile);
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfiles {
    async fn load(&self, identity: &PlayerIdentity) -> Result<PlayerProfile, SessionError> {
        if let Some(p) = self.profiles.read().get(&identity.ident()) {
            return Ok(p.clone());
        }
        self.fallback
            .clone()
            .ok_or_else(|| SessionError::ProfileNotFound(identity.ident()))
    }
}
