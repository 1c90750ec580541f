//! Session-aware HTTP client for the payroll API
//!
//! Every call goes through `ApiClient::execute`, which:
//! 1. Attaches the current access token unless the path is exempt
//!    (`authorize`)
//! 2. Sends the request with its own timeout
//! 3. On 401 from a non-exempt path, hands control to the
//!    `RefreshCoordinator`, which runs at most one refresh at a time and
//!    replays every blocked request once with the new token
//! 4. Collapses any other failure body into one `ApiError` (`normalize`)
//!
//! Session lifecycle:
//! 1. `login()` stores the issued pair
//! 2. Access token expires → first 401 starts a refresh, later 401s queue
//! 3. Refresh succeeds → queued requests replay in arrival order
//! 4. Refresh fails → store cleared, every queued caller gets the same
//!    `SessionInvalid` error, `SessionEvent::ReauthenticationRequired` fires once

pub mod authorize;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod request;
pub mod session;

#[cfg(test)]
mod test_support;

pub use authorize::{ExemptionSet, authorize};
pub use client::{ApiClient, ClientConfig};
pub use coordinator::{
    HttpTokenRefresher, RefreshCoordinator, SessionEvent, SessionSnapshot, TokenRefresher,
};
pub use error::{ApiError, ErrorKind, Result};
pub use normalize::{EntityReference, ErrorNormalizer, NestedErrorFormatter};
pub use request::{ApiRequest, ApiResponse};
