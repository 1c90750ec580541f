//! Token responses and the refresh exchange
//!
//! The auth service answers both login (`TOKEN_PATH`) and refresh
//! (`REFRESH_PATH`) with the same JSON shape: `{"access": ..., "refresh": ...}`.
//! Refresh tokens rotate, so a refresh response may carry a new `refresh`
//! value; when it does not, the previous refresh token stays valid.
//!
//! Login goes through the API client like any other exempt call. The refresh
//! exchange is issued directly from here so it never passes through request
//! authorization or refresh coordination.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

/// Body returned by the token and refresh endpoints.
#[derive(Deserialize, Serialize)]
pub struct TokenResponse {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    /// Profile data some deployments attach to login responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

impl TokenResponse {
    /// Pair issued at login. Both tokens must be present.
    pub fn into_pair(self) -> Result<CredentialPair> {
        if self.access.is_empty() {
            return Err(Error::TokenExchange("no access token received".into()));
        }
        match self.refresh {
            Some(refresh) if !refresh.is_empty() => Ok(CredentialPair::new(self.access, refresh)),
            _ => Err(Error::TokenExchange("no refresh token received".into())),
        }
    }

    /// Pair after a refresh, keeping `previous_refresh` unless a rotated
    /// token was issued.
    pub fn rotate(self, previous_refresh: &str) -> CredentialPair {
        let refresh = match self.refresh {
            Some(rotated) if !rotated.is_empty() => rotated,
            _ => previous_refresh.to_string(),
        };
        CredentialPair::new(self.access, refresh)
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access", &"[REDACTED]")
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .finish()
    }
}

/// Exchange a refresh token for a new access token.
///
/// `url` is the absolute refresh endpoint. The call carries its own timeout
/// and no Authorization header. 401/403 mean the refresh token itself is
/// expired or blacklisted.
pub async fn refresh_token(
    client: &reqwest::Client,
    url: &str,
    refresh: &str,
    timeout: Duration,
) -> Result<TokenResponse> {
    let response = client
        .post(url)
        .json(&serde_json::json!({ "refresh": refresh }))
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))?;

    if token.access.is_empty() {
        return Err(Error::TokenExchange("no access token received".into()));
    }

    debug!(rotated = token.refresh.is_some(), "refresh exchange succeeded");
    Ok(token)
}
