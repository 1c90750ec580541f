//! Client-side counters
//!
//! Emitted through the `metrics` facade. The library installs no recorder;
//! embedding applications decide whether and where to export.
//!
//! - `api_client_refresh_total` (counter): label `outcome`
//! - `api_client_replays_total` (counter)
//! - `api_client_errors_total` (counter): label `kind`

use crate::error::ErrorKind;

/// Record a resolved refresh exchange.
pub fn record_refresh(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("api_client_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request resubmitted with a refreshed credential.
pub fn record_replay() {
    metrics::counter!("api_client_replays_total").increment(1);
}

/// Record an error surfaced to a caller.
pub fn record_error(kind: ErrorKind) {
    metrics::counter!("api_client_errors_total", "kind" => kind.label()).increment(1);
}
