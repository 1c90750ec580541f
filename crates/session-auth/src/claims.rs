//! Access-token claims
//!
//! Access tokens are JWTs. The client reads the payload segment to show who
//! is signed in and when the token expires. The signature is NOT checked:
//! the API verifies tokens, the client only displays what they say.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Claims carried in an access token payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccessClaims {
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry as unix seconds
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Deployment-specific claims (company, user role, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AccessClaims {
    /// Decode the payload segment of `token`.
    pub fn decode(token: &str) -> Result<Self> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => {
                return Err(Error::MalformedToken(
                    "expected three dot-separated segments".into(),
                ));
            }
        };

        // Some issuers pad the segment even though JWT forbids it
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::MalformedToken(format!("payload is not a JSON object: {e}")))
    }

    /// Whether the token had expired at `now_secs` (unix seconds). Tokens
    /// without `exp` never expire from the client's point of view.
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.exp.is_some_and(|exp| exp <= now_secs)
    }

    /// `is_expired_at` against the system clock.
    pub fn is_expired(&self) -> bool {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.is_expired_at(now)
    }
}
