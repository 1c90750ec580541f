//! Refresh coordination
//!
//! When the access token expires, every in-flight request comes back 401 at
//! roughly the same time. The coordinator makes sure exactly one of them
//! triggers the refresh exchange; the rest wait for its outcome and replay
//! with the new token, or all fail with the same error if the exchange fails.
//!
//! State machine (guarded by one async Mutex):
//! - Idle → Refreshing: first 401, refresh task spawned
//! - Refreshing → Refreshing: further 401s enqueue a oneshot waiter
//! - Refreshing → Idle (success): pair stored, waiters resumed in arrival
//!   order, then the trigger
//! - Refreshing → Idle (failure): store cleared, every waiter and the trigger
//!   get the same `SessionInvalid`, `ReauthenticationRequired` broadcast once
//!
//! Every refresh resolution bumps a generation counter, as do login and
//! sign-out. A 401 for a request sent before the latest bump is answered
//! from the current session instead of starting another refresh.
//!
//! The exchange runs on a spawned task so a caller that gives up (timeout,
//! dropped future) cannot strand the waiters queued behind it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use session_auth::{CredentialPair, REFRESH_PATH, SessionStore, TokenResponse};
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::error::ApiError;

/// Result of one refresh exchange, fanned out to every waiter.
type RefreshOutcome = Result<CredentialPair, ApiError>;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 16;

/// Performs the refresh exchange against the auth service.
///
/// Uses `Pin<Box<dyn Future>>` for dyn-compatibility (`Arc<dyn TokenRefresher>`).
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenResponse>> + Send + 'a>>;
}

/// Refresher that posts to `REFRESH_PATH` under the API base URL.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTokenRefresher {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenResponse>> + Send + 'a>> {
        Box::pin(session_auth::refresh_token(
            &self.client,
            &self.url,
            refresh_token,
            self.timeout,
        ))
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A refresh succeeded and the new pair is stored.
    Refreshed,
    /// A refresh failed and the session was cleared. The user has to sign
    /// in again. Sent once per failed refresh, however many callers waited.
    ReauthenticationRequired { reason: String },
}

/// Credential read before sending a request, tagged with the refresh
/// generation it belongs to.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub credential: Option<CredentialPair>,
    generation: u64,
}

impl SessionSnapshot {
    /// Snapshot for a replay with a freshly issued credential.
    pub(crate) fn replay(&self, credential: CredentialPair) -> Self {
        Self {
            credential: Some(credential),
            generation: self.generation,
        }
    }
}

enum Phase {
    Idle,
    Refreshing {
        trigger: oneshot::Sender<RefreshOutcome>,
        pending: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

struct CoordinatorState {
    phase: Phase,
    generation: u64,
    last_failure: Option<ApiError>,
}

struct Inner {
    state: Mutex<CoordinatorState>,
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    events: broadcast::Sender<SessionEvent>,
}

/// Single-flight refresh state machine shared by all clones of an
/// `ApiClient`. Cheap to clone.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn SessionStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoordinatorState {
                    phase: Phase::Idle,
                    generation: 0,
                    last_failure: None,
                }),
                store,
                refresher,
                events,
            }),
        }
    }

    /// Current credential and refresh generation, read atomically.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock().await;
        SessionSnapshot {
            credential: self.inner.store.get().await,
            generation: state.generation,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn is_refreshing(&self) -> bool {
        matches!(self.inner.state.lock().await.phase, Phase::Refreshing { .. })
    }

    /// Requests waiting on the in-flight refresh, excluding the trigger.
    pub async fn pending_len(&self) -> usize {
        match &self.inner.state.lock().await.phase {
            Phase::Idle => 0,
            Phase::Refreshing { pending, .. } => pending.len(),
        }
    }

    /// Store a pair issued at login. Requests sent before this are replayed
    /// with the new pair if they come back 401.
    pub async fn install(&self, pair: CredentialPair) {
        let mut state = self.inner.state.lock().await;
        self.inner.store.set(pair).await;
        state.generation += 1;
        state.last_failure = None;
        info!("session established");
    }

    /// Forget the session without signalling re-authentication.
    pub async fn sign_out(&self) {
        let mut state = self.inner.state.lock().await;
        self.inner.store.clear().await;
        state.generation += 1;
        state.last_failure = None;
        info!("session cleared");
    }

    /// Recover from a 401 on a request sent with `sent`.
    ///
    /// Starts a refresh if none is running, otherwise waits for the running
    /// one. Returns the credential to replay with, or the `SessionInvalid`
    /// error shared by every caller of the failed refresh.
    pub async fn recover(&self, sent: &SessionSnapshot) -> RefreshOutcome {
        let waiter = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;

            if let Phase::Refreshing { pending, .. } = &mut state.phase {
                let (tx, rx) = oneshot::channel();
                pending.push(tx);
                debug!(queued = pending.len(), "refresh in flight, request queued");
                rx
            } else if state.generation != sent.generation {
                // Resolved after this request left; reuse that outcome
                return match self.inner.store.get().await {
                    Some(pair) => {
                        debug!("request predates latest refresh, replaying with current token");
                        Ok(pair)
                    }
                    None => Err(state.last_failure.clone().unwrap_or_else(|| {
                        ApiError::session_invalid("session ended while the request was in flight")
                    })),
                };
            } else {
                let (tx, rx) = oneshot::channel();
                state.phase = Phase::Refreshing {
                    trigger: tx,
                    pending: Vec::new(),
                };
                info!("access token rejected, starting refresh");
                tokio::spawn(run_refresh(self.inner.clone(), state.generation));
                rx
            }
        };

        waiter.await.unwrap_or_else(|_| {
            Err(ApiError::session_invalid(
                "refresh ended without reporting an outcome",
            ))
        })
    }
}

/// Run the exchange, then resolve every waiter under the state lock.
///
/// `started` is the generation the refresh began in. A login or sign-out
/// while the exchange was running owns the store; the stale result is
/// discarded and waiters are answered from the current session.
async fn run_refresh(inner: Arc<Inner>, started: u64) {
    let outcome = exchange(&inner).await;

    let mut guard = inner.state.lock().await;
    let state = &mut *guard;

    if state.generation != started {
        let Phase::Refreshing { trigger, pending } =
            std::mem::replace(&mut state.phase, Phase::Idle)
        else {
            warn!("refresh resolved with no refresh in flight");
            return;
        };
        let current = match inner.store.get().await {
            Some(pair) => Ok(pair),
            None => Err(ApiError::session_invalid(
                "session ended while the refresh was in flight",
            )),
        };
        info!(
            resumed = pending.len() + 1,
            "session replaced during refresh, discarding refresh result"
        );
        for waiter in pending {
            let _ = waiter.send(current.clone());
        }
        let _ = trigger.send(current);
        return;
    }

    match &outcome {
        Ok(pair) => inner.store.set(pair.clone()).await,
        Err(_) => inner.store.clear().await,
    }
    state.generation += 1;
    state.last_failure = outcome.as_ref().err().cloned();

    let Phase::Refreshing { trigger, pending } = std::mem::replace(&mut state.phase, Phase::Idle)
    else {
        warn!("refresh resolved with no refresh in flight");
        return;
    };

    crate::metrics::record_refresh(outcome.is_ok());
    let resumed = pending.len() + 1;

    // Signal before resolving so a caller that sees the failure can already
    // observe the event. send() only fails when nobody is subscribed.
    match &outcome {
        Ok(_) => {
            info!(resumed, "refresh succeeded, replaying queued requests");
            let _ = inner.events.send(SessionEvent::Refreshed);
        }
        Err(e) => {
            warn!(rejected = resumed, error = %e, "refresh failed, session cleared");
            let _ = inner.events.send(SessionEvent::ReauthenticationRequired {
                reason: e.message.clone(),
            });
        }
    }

    for waiter in pending {
        let _ = waiter.send(outcome.clone());
    }
    let _ = trigger.send(outcome);
}

async fn exchange(inner: &Inner) -> RefreshOutcome {
    let Some(current) = inner.store.get().await else {
        return Err(ApiError::session_invalid(
            session_auth::Error::MissingRefreshToken.to_string(),
        ));
    };

    match inner.refresher.refresh(&current.refresh).await {
        Ok(token) => Ok(token.rotate(&current.refresh)),
        Err(e) => Err(ApiError::session_invalid(format!("session expired: {e}"))),
    }
}
