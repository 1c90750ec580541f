//! Request authorization
//!
//! Attaches `Authorization: Bearer <access>` to outgoing requests. Requests
//! to the auth service itself (login, refresh, verify, registration) are
//! exempt: they never carry a credential and a 401 from them never starts a
//! refresh.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use session_auth::{AUTH_PATHS, BEARER_SCHEME, CredentialPair};
use tracing::warn;

use crate::request::ApiRequest;

/// Endpoint patterns that never receive a credential.
///
/// A path is exempt when it contains any pattern. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExemptionSet {
    patterns: Arc<[String]>,
}

impl ExemptionSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        Self {
            patterns: patterns.into(),
        }
    }

    /// The auth-service endpoints.
    pub fn auth_endpoints() -> Self {
        Self::new(AUTH_PATHS.iter().copied())
    }

    /// The auth-service endpoints plus `extra`.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            AUTH_PATHS
                .iter()
                .map(|p| p.to_string())
                .chain(extra.into_iter().map(Into::into)),
        )
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for ExemptionSet {
    fn default() -> Self {
        Self::auth_endpoints()
    }
}

/// Attach the credential to `request` unless its path is exempt or there is
/// no credential.
///
/// Any Authorization header already on the request is dropped: the session
/// is the only source of credentials.
pub fn authorize(
    mut request: ApiRequest,
    credential: Option<&CredentialPair>,
    exemptions: &ExemptionSet,
) -> ApiRequest {
    request.headers_mut().remove(AUTHORIZATION);

    if exemptions.is_exempt(request.path()) {
        return request;
    }
    let Some(credential) = credential else {
        return request;
    };

    match HeaderValue::from_str(&format!("{BEARER_SCHEME} {}", credential.access)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Err(e) => {
            warn!(path = request.path(), error = %e, "access token is not a valid header value, sending without it");
        }
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_auth::{REFRESH_PATH, REGISTER_PATH, TOKEN_PATH, VERIFY_PATH};

    fn credential() -> CredentialPair {
        CredentialPair::new("at_current", "rt_current")
    }

    #[test]
    fn attaches_bearer_token() {
        let request = authorize(
            ApiRequest::get("/employees/"),
            Some(&credential()),
            &ExemptionSet::default(),
        );
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer at_current"
        );
    }

    #[test]
    fn exempt_paths_never_carry_credential() {
        let exemptions = ExemptionSet::default();
        for path in [TOKEN_PATH, REFRESH_PATH, VERIFY_PATH, REGISTER_PATH, "/auth/login/"] {
            let request = authorize(ApiRequest::post(path), Some(&credential()), &exemptions);
            assert!(
                request.headers().get(AUTHORIZATION).is_none(),
                "{path} must not carry a credential"
            );
        }
    }

    #[test]
    fn exempt_paths_drop_caller_supplied_authorization() {
        let request = ApiRequest::post(VERIFY_PATH)
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer smuggled"));
        let request = authorize(request, Some(&credential()), &ExemptionSet::default());
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn no_credential_leaves_request_unauthorized() {
        let request = authorize(ApiRequest::get("/employees/"), None, &ExemptionSet::default());
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn replaces_stale_authorization() {
        let request = ApiRequest::get("/employees/")
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer at_old"));
        let request = authorize(request, Some(&credential()), &ExemptionSet::default());
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer at_current"
        );
    }

    #[test]
    fn exemption_matches_substring_of_full_path() {
        let exemptions = ExemptionSet::default();
        assert!(exemptions.is_exempt("/api/auth/token/refresh/"));
        assert!(!exemptions.is_exempt("/employees/auth/"));
    }

    #[test]
    fn extra_patterns_extend_defaults() {
        let exemptions = ExemptionSet::with_extra(["/public/"]);
        assert!(exemptions.is_exempt("/public/holidays/"));
        assert!(exemptions.is_exempt(TOKEN_PATH));
    }

    #[test]
    fn invalid_token_is_skipped() {
        let bad = CredentialPair::new("at\nbroken", "rt");
        let request = authorize(ApiRequest::get("/employees/"), Some(&bad), &ExemptionSet::default());
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn retry_marker_is_preserved() {
        let mut request = ApiRequest::get("/employees/");
        request.mark_retried();
        let request = authorize(request, Some(&credential()), &ExemptionSet::default());
        assert!(request.is_retried());
    }
}
