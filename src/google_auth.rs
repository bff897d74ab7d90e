//! Google service account authentication (OAuth2 JWT bearer grant).
//!
//! Mints an RS256-signed assertion from the service account key, exchanges it
//! for an access token and caches the token until shortly before it expires.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub const CLOUD_VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Seconds before expiry at which a cached token is considered stale.
const REFRESH_MARGIN_SECS: u64 = 60;

#[derive(Clone)]
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    scope: String,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

impl ServiceAccountAuth {
    /// Load a service account key file.
    pub fn from_key_file(path: &Path, scope: &str) -> Result<Self> {
        let key_json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key: {:?}", path))?;
        Self::from_key_json(&key_json, scope)
            .with_context(|| format!("Failed to parse service account key: {:?}", path))
    }

    pub fn from_key_json(key_json: &str, scope: &str) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(key_json)?;
        Ok(Self {
            key,
            scope: scope.to_string(),
            token_cache: Arc::new(Mutex::new(None)),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn token_uri(&self) -> &str {
        self.key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn cached_token(&self, now: u64) -> Option<String> {
        let cache = self.token_cache.lock().ok()?;
        cache
            .as_ref()
            .filter(|cached| now < cached.expires_at.saturating_sub(REFRESH_MARGIN_SECS))
            .map(|cached| cached.access_token.clone())
    }

    /// Get a valid OAuth2 access token, refreshing if expired.
    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let now = now_secs();
        if let Some(token) = self.cached_token(now) {
            return Ok(token);
        }

        let claims = serde_json::json!({
            "iss": self.key.client_email,
            "scope": self.scope,
            "aud": self.token_uri(),
            "iat": now,
            "exp": now + 3600,
        });

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Invalid RSA private key in service account JSON")?;

        let jwt = jsonwebtoken::encode(&header, &claims, &encoding_key)
            .context("Failed to encode JWT")?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let resp: TokenResponse = client
            .post(self.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await
            .context("Token exchange request failed")?
            .error_for_status()
            .context("Token exchange returned error")?
            .json()
            .await
            .context("Failed to parse token response")?;

        debug!(
            "Minted access token for {} (expires in {}s)",
            self.key.client_email, resp.expires_in
        );

        let token = resp.access_token.clone();
        if let Ok(mut cache) = self.token_cache.lock() {
            *cache = Some(CachedToken {
                access_token: resp.access_token,
                expires_at: now + resp.expires_in,
            });
        }

        Ok(token)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
