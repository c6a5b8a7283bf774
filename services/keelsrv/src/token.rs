//! Plugin token issuance
//!
//! Plugins exchange their registration secret for an HS256 JWT carrying
//! `plugin_id`. The gateway verifies that token to identify internal
//! callers.

use crate::registry::PluginRegistry;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use errors::{KeelError, KeelResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub const SECRET_LEN: usize = 32;
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;
const REFRESH_TTL_FACTOR: u32 = 30;

/// Random alphanumeric registration secret
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: Uuid,
    pub plugin_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

pub struct TokenIssuer {
    registry: Arc<dyn PluginRegistry>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    settings: TokenSettings,
}

impl TokenIssuer {
    pub fn new(registry: Arc<dyn PluginRegistry>, settings: TokenSettings) -> Self {
        Self {
            registry,
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            settings,
        }
    }

    /// Exchange a plugin's client credentials for a token pair
    pub async fn issue(&self, client_id: &str, client_secret: &str) -> KeelResult<TokenResponse> {
        let plugin = self.registry.get(client_id).await?.ok_or_else(|| {
            KeelError::Unauthorized(format!("unknown client {}", client_id))
        })?;
        if plugin.secret.is_empty() || !secrets_match(&plugin.secret, client_secret) {
            warn!("Token request for {} with a wrong secret", client_id);
            return Err(KeelError::Unauthorized(format!(
                "invalid secret for {}",
                client_id
            )));
        }

        let ttl = self.settings.ttl;
        let access_token = self.sign(client_id, ttl)?;
        let refresh_token = self.sign(client_id, ttl * REFRESH_TTL_FACTOR)?;
        debug!("Issued token for {}", client_id);

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: ttl.as_secs(),
            refresh_token: Some(refresh_token),
        })
    }

    /// Sign a token for `plugin_id` valid for `ttl`
    pub fn sign(&self, plugin_id: &str, ttl: Duration) -> KeelResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: plugin_id.to_string(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now,
            nbf: now,
            exp: now + ttl.as_secs() as i64,
            jti: Uuid::new_v4(),
            plugin_id: plugin_id.to_string(),
        };
        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding)
            .map_err(|e| KeelError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Check signature, expiry, issuer and audience
    pub fn verify(&self, token: &str) -> KeelResult<Claims> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.set_issuer(&[&self.settings.issuer]);
        validation.set_audience(&[&self.settings.audience]);
        validation.validate_nbf = true;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| KeelError::Unauthorized(format!("Invalid token: {}", e)))
    }
}

/// Comparison whose duration does not depend on where the inputs differ
fn secrets_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Split a `Basic <base64(id:secret)>` header value
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::registry::StatePluginRegistry;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use keel_model::{KeySpace, Plugin};
    use keel_state::helpers::create_test_store;

    fn settings() -> TokenSettings {
        TokenSettings {
            secret: "unit-test-signing-key".into(),
            issuer: "keel".into(),
            audience: "keel".into(),
            ttl: Duration::from_secs(3600),
        }
    }

    async fn issuer_with(plugin_secret: &str) -> TokenIssuer {
        let registry = Arc::new(StatePluginRegistry::new(create_test_store(), KeySpace::test()));
        let mut plugin = Plugin::new("core");
        plugin.secret = plugin_secret.into();
        registry.create(&plugin).await.unwrap();
        TokenIssuer::new(registry, settings())
    }

    #[tokio::test]
    async fn test_verify_rejects_unsigned_token() {
        let issuer = issuer_with("s3cret").await;
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"plugin_id":"core"}"#);
        let unsigned = format!("{}.{}.sig", header, payload);
        assert!(matches!(issuer.verify(&unsigned), Err(KeelError::Unauthorized(_))));
    }

    #[test]
    fn test_generate_secret() {
        let a = generate_secret();
        assert_eq!(a.len(), SECRET_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, generate_secret());
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let issuer = issuer_with("s3cret").await;
        let resp = issuer.issue("core", "s3cret").await.unwrap();
        assert_eq!(resp.token_type, "Bearer");
        assert_eq!(resp.expires_in, 3600);

        let claims = issuer.verify(&resp.access_token).unwrap();
        assert_eq!(claims.plugin_id, "core");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[tokio::test]
    async fn test_issue_rejects_bad_credentials() {
        let issuer = issuer_with("s3cret").await;
        assert!(matches!(
            issuer.issue("core", "wrong").await,
            Err(KeelError::Unauthorized(_))
        ));
        assert!(matches!(
            issuer.issue("ghost", "s3cret").await,
            Err(KeelError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_rejects_foreign_signature() {
        let issuer = issuer_with("s3cret").await;
        let mut other = settings();
        other.secret = "another-signing-key".into();
        let foreign = TokenIssuer::new(
            Arc::new(StatePluginRegistry::new(create_test_store(), KeySpace::test())),
            other,
        );
        let token = foreign.sign("core", Duration::from_secs(60)).unwrap();
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn test_basic_parsing() {
        let header = format!("Basic {}", STANDARD.encode("core:s3cret"));
        assert_eq!(
            parse_basic(&header),
            Some(("core".to_string(), "s3cret".to_string()))
        );
        assert_eq!(parse_basic("Bearer x"), None);
    }
}
