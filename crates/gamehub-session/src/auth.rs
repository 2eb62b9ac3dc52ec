//! Authentication: turning a client token into a player identity.
//!
//! The gateway does not care how a token proves identity, only that an
//! [`Authenticator`] turns it into [`TokenClaims`] or refuses. The stock
//! implementation is [`SsoTokenAuthenticator`], which understands the
//! operator platform's signed SSO tokens:
//!
//! ```text
//! token = hex(protobuf(TokenPayload { app_id, player_id, game_brand,
//!                                     game_id, expire, sign }))
//! sign  = first 6 + last 6 hex chars of
//!         HMAC-SHA256(app_id ‖ player_id ‖ game_brand ‖ game_id ‖ expire)
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gamehub_protocol::PlayerIdentity;
use hmac::{Hmac, Mac};
use prost::Message;
use sha2::Sha256;

use crate::SessionError;

type HmacSha256 = Hmac<Sha256>;

/// What a verified token says about the connecting client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub identity: PlayerIdentity,
    pub game_brand: String,
    pub game_id: String,
    /// Unix seconds.
    pub expire: i64,
}

/// Validates a client's token and returns their identity.
///
/// Errors must be one of the authentication variants of [`SessionError`]
/// (see [`SessionError::is_auth`]); the connection is dropped before any
/// room is touched.
///
/// # Example
///
/// ```rust
/// use gamehub_protocol::PlayerIdentity;
/// use gamehub_session::{Authenticator, SessionError, TokenClaims};
///
/// /// Treats the token as `app:player`. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<TokenClaims, SessionError> {
///         let (app, player) = token
///             .split_once(':')
///             .ok_or_else(|| SessionError::AuthFailed("want app:player".into()))?;
///         Ok(TokenClaims {
///             identity: PlayerIdentity::new(app, player),
///             game_brand: "inout".into(),
///             game_id: "dev".into(),
///             expire: i64::MAX,
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<TokenClaims, SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// SSO token
// ---------------------------------------------------------------------------

/// Protobuf body of an SSO token.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TokenPayload {
    #[prost(string, tag = "1")]
    pub app_id: String,
    #[prost(string, tag = "2")]
    pub player_id: String,
    #[prost(string, tag = "3")]
    pub game_brand: String,
    #[prost(string, tag = "4")]
    pub game_id: String,
    #[prost(int64, tag = "5")]
    pub expire: i64,
    #[prost(string, tag = "6")]
    pub sign: String,
}

impl TokenPayload {
    /// Fields in protobuf tag order, as covered by the signature.
    fn signed_text(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.app_id, self.player_id, self.game_brand, self.game_id, self.expire
        )
    }
}

/// Configuration for [`SsoTokenAuthenticator`].
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC key shared with the operator platform.
    pub secret: String,
    /// Lifetime given to tokens minted by [`SsoTokenAuthenticator::encode`].
    pub ttl: Duration,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Verifies (and, for tools and tests, mints) SSO tokens.
#[derive(Debug, Clone)]
pub struct SsoTokenAuthenticator {
    config: TokenConfig,
}

impl SsoTokenAuthenticator {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    fn sign(&self, text: &str) -> Result<String, SessionError> {
        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .map_err(|e| SessionError::AuthFailed(format!("bad token key: {e}")))?;
        mac.update(text.as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}{}", &digest[..6], &digest[digest.len() - 6..]))
    }

    /// Mints a token for `identity` valid for the configured TTL from `now`.
    pub fn encode_at(
        &self,
        identity: &PlayerIdentity,
        game_brand: &str,
        game_id: &str,
        now_unix: i64,
    ) -> Result<String, SessionError> {
        let mut payload = TokenPayload {
            app_id: identity.app_id.clone(),
            player_id: identity.player_id.clone(),
            game_brand: game_brand.to_owned(),
            game_id: game_id.to_owned(),
            expire: now_unix + self.config.ttl.as_secs() as i64,
            sign: String::new(),
        };
        payload.sign = self.sign(&payload.signed_text())?;
        Ok(hex::encode(payload.encode_to_vec()))
    }

    pub fn encode(
        &self,
        identity: &PlayerIdentity,
        game_brand: &str,
        game_id: &str,
    ) -> Result<String, SessionError> {
        self.encode_at(identity, game_brand, game_id, unix_now())
    }

    /// Decodes and verifies `token` as of `now_unix`.
    pub fn verify_at(&self, token: &str, now_unix: i64) -> Result<TokenClaims, SessionError> {
        let raw = hex::decode(token)
            .map_err(|e| SessionError::MalformedToken(e.to_string()))?;
        let payload = TokenPayload::decode(raw.as_slice())
            .map_err(|e| SessionError::MalformedToken(e.to_string()))?;

        if self.sign(&payload.signed_text())? != payload.sign {
            return Err(SessionError::BadSignature);
        }
        if payload.expire < now_unix {
            return Err(SessionError::TokenExpired);
        }

        Ok(TokenClaims {
            identity: PlayerIdentity::new(payload.app_id, payload.player_id),
            game_brand: payload.game_brand,
            game_id: payload.game_id,
            expire: payload.expire,
        })
    }
}

impl Authenticator for SsoTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<TokenClaims, SessionError> {
        let claims = self.verify_at(token, unix_now());
        if let Err(e) = &claims {
            tracing::debug!(error = %e, "token rejected");
        }
        claims
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn auth() -> SsoTokenAuthenticator {
        SsoTokenAuthenticator::new(TokenConfig::new("test-secret"))
    }

    fn id() -> PlayerIdentity {
        PlayerIdentity::new("app1", "p1")
    }

    #[test]
    fn test_verify_at_valid_token_returns_claims() {
        let a = auth();
        let token = a.encode_at(&id(), "inout", "aviator", NOW).unwrap();

        let claims = a.verify_at(&token, NOW + 10).unwrap();
        assert_eq!(claims.identity, id());
        assert_eq!(claims.game_brand, "inout");
        assert_eq!(claims.game_id, "aviator");
        assert_eq!(claims.expire, NOW + 24 * 3600);
    }

    #[test]
    fn test_encode_sign_is_twelve_hex_chars() {
        let a = auth();
        let token = a.encode_at(&id(), "jili", "fish", NOW).unwrap();
        let payload = TokenPayload::decode(hex::decode(token).unwrap().as_slice()).unwrap();
        assert_eq!(payload.sign.len(), 12);
        assert!(payload.sign.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_at_expired_token_rejected() {
        let a = auth();
        let token = a.encode_at(&id(), "inout", "aviator", NOW).unwrap();
        let err = a.verify_at(&token, NOW + 24 * 3600 + 1).unwrap_err();
        assert!(matches!(err, SessionError::TokenExpired));
        assert!(err.is_auth());
    }

    #[test]
    fn test_verify_at_tampered_payload_rejected() {
        let a = auth();
        let token = a.encode_at(&id(), "inout", "aviator", NOW).unwrap();
        let mut payload = TokenPayload::decode(hex::decode(&token).unwrap().as_slice()).unwrap();
        payload.player_id = "someone-else".into();
        let forged = hex::encode(payload.encode_to_vec());

        let err = a.verify_at(&forged, NOW).unwrap_err();
        assert!(matches!(err, SessionError::BadSignature));
    }

    #[test]
    fn test_verify_at_other_secret_rejected() {
        let token = auth().encode_at(&id(), "inout", "aviator", NOW).unwrap();
        let other = SsoTokenAuthenticator::new(TokenConfig::new("other"));
        assert!(matches!(
            other.verify_at(&token, NOW),
            Err(SessionError::BadSignature)
        ));
    }

    #[test]
    fn test_verify_at_not_hex_is_malformed() {
        let err = auth().verify_at("zz-not-hex", NOW).unwrap_err();
        assert!(matches!(err, SessionError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn test_authenticate_fresh_token_succeeds() {
        let a = auth();
        let token = a.encode(&id(), "spribe", "mines").unwrap();
        let claims = a.authenticate(&token).await.unwrap();
        assert_eq!(claims.identity.ident(), "app1-p1");
    }
}
