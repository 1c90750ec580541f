//! Session operations on top of the facade
//!
//! Login, registration and verification are ordinary exempt calls: they go
//! through `execute` without a credential and a 401 from them is reported
//! as `Unauthorized`, never refreshed.

use common::Secret;
use serde_json::{Value, json};
use session_auth::{AccessClaims, REGISTER_PATH, TOKEN_PATH, TokenResponse, VERIFY_PATH};
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::error::{ApiError, ErrorKind, Result};
use crate::request::ApiRequest;

impl ApiClient {
    /// Exchange email and password for a credential pair and store it.
    ///
    /// Returns the profile the service attached to the response, if any.
    pub async fn login(&self, email: &str, password: &Secret<String>) -> Result<Option<Value>> {
        let response = self
            .execute(ApiRequest::post(TOKEN_PATH).json(json!({
                "email": email,
                "password": password.expose(),
            })))
            .await?;

        let token: TokenResponse = response.json()?;
        let user = token.user.clone();
        let pair = token
            .into_pair()
            .map_err(|e| ApiError::invalid_response(e.to_string()).with_status(response.status().as_u16()))?;

        self.coordinator().install(pair).await;
        info!("logged in");
        Ok(user)
    }

    /// Create an account. The body is passed through unchanged.
    pub async fn register(&self, body: Value) -> Result<Value> {
        self.post_json(REGISTER_PATH, body).await
    }

    /// Check the stored access token with the auth service.
    ///
    /// `Ok(false)` when there is no session or the token was rejected; a
    /// rejected token also ends the session.
    pub async fn verify(&self) -> Result<bool> {
        let Some(pair) = self.coordinator().snapshot().await.credential else {
            return Ok(false);
        };

        match self
            .execute(ApiRequest::post(VERIFY_PATH).json(json!({ "token": pair.access })))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind == ErrorKind::Unauthorized => {
                warn!(reason = %e.message, "stored token rejected, signing out");
                self.logout().await;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// End the session locally. No re-authentication signal is sent.
    pub async fn logout(&self) {
        self.coordinator().sign_out().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.coordinator().snapshot().await.credential.is_some()
    }

    /// Claims of the stored access token, decoded without verification.
    pub async fn claims(&self) -> Result<Option<AccessClaims>> {
        let Some(pair) = self.coordinator().snapshot().await.credential else {
            return Ok(None);
        };
        AccessClaims::decode(&pair.access)
            .map(Some)
            .map_err(|e| ApiError::invalid_response(e.to_string()))
    }
}
