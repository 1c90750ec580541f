//! Auth-service endpoints and client defaults
//!
//! Paths are relative to the API base URL. All of them are served by the
//! auth service and are exempt from credential attachment and refresh.

use std::time::Duration;

/// Base URL of the API when no configuration overrides it
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Issue a credential pair from email + password
pub const TOKEN_PATH: &str = "/auth/token/";

/// Exchange a refresh token for a new access token
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Check whether an access token is still valid
pub const VERIFY_PATH: &str = "/auth/token/verify/";

/// Register a new account
pub const REGISTER_PATH: &str = "/auth/register/";

/// Legacy login path, still exempt
pub const LOGIN_PATH: &str = "/auth/login/";

/// Every auth-service path. Requests to these never carry a credential.
pub const AUTH_PATHS: &[&str] = &[VERIFY_PATH, REFRESH_PATH, LOGIN_PATH, REGISTER_PATH, TOKEN_PATH];

/// Authorization scheme expected by the API
pub const BEARER_SCHEME: &str = "Bearer";

/// Per-call timeout for ordinary API requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the refresh exchange. Shorter than ordinary calls since every
/// queued request waits on it.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);
