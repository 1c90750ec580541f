//! Mock API service for client tests
//!
//! Serves a small slice of the payroll API under `/api` on an ephemeral port.
//! Tokens are fixed strings: `at_old` is expired, `at_new` is what a refresh
//! issues, `at_login`/`rt_login` are what a login issues.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use session_auth::{CredentialPair, MemorySessionStore, SessionStore};
use tokio::net::TcpListener;

/// How the refresh endpoint behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Answer `at_new`/`rt_new` after a short delay so concurrent 401s pile up.
    Succeed,
    /// Never answer within any test timeout.
    Hang,
    /// Reject the refresh token as blacklisted.
    Reject,
}

#[derive(Default)]
pub struct Counters {
    pub refresh_calls: AtomicUsize,
    pub employee_calls: AtomicUsize,
    /// Requests to auth endpoints that arrived with an Authorization header
    pub exempt_with_auth: AtomicUsize,
    /// Sends per `x-caller` header value on protected routes
    pub per_caller: std::sync::Mutex<HashMap<String, usize>>,
}

impl Counters {
    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sends_by(&self, caller: &str) -> usize {
        self.per_caller
            .lock()
            .unwrap()
            .get(caller)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct MockState {
    counters: Arc<Counters>,
    refresh: RefreshMode,
}

pub struct MockApi {
    pub base_url: String,
    pub counters: Arc<Counters>,
}

impl MockApi {
    pub async fn start(refresh: RefreshMode) -> Self {
        let counters = Arc::new(Counters::default());
        let state = MockState {
            counters: counters.clone(),
            refresh,
        };

        let api = Router::new()
            .route("/auth/token/", post(login))
            .route("/auth/token/refresh/", post(refresh_handler))
            .route("/auth/token/verify/", post(verify))
            .route("/auth/register/", post(register))
            .route("/employees/", get(employees).post(create_employee))
            .route("/always-401/", get(always_unauthorized))
            .route("/boom/", get(boom))
            .route("/slow/", get(slow))
            .route("/echo-query/", get(echo_query))
            .with_state(state);
        let app = Router::new().nest("/api", api);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api"),
            counters,
        }
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn note_caller(state: &MockState, headers: &HeaderMap) {
    if let Some(caller) = headers.get("x-caller").and_then(|v| v.to_str().ok()) {
        *state
            .counters
            .per_caller
            .lock()
            .unwrap()
            .entry(caller.to_string())
            .or_default() += 1;
    }
}

fn note_exempt(state: &MockState, headers: &HeaderMap) {
    if headers.contains_key("authorization") {
        state.counters.exempt_with_auth.fetch_add(1, Ordering::SeqCst);
    }
}

fn token_not_valid() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid"
        })),
    )
        .into_response()
}

async fn login(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    note_exempt(&state, &headers);
    if body["password"] == "secret" {
        Json(json!({"access": "at_login", "refresh": "rt_login", "user": {"email": body["email"]}}))
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response()
    }
}

async fn refresh_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    note_exempt(&state, &headers);
    state.counters.refresh_calls.fetch_add(1, Ordering::SeqCst);
    match state.refresh {
        RefreshMode::Succeed => {
            tokio::time::sleep(Duration::from_millis(150)).await;
            if body["refresh"].as_str().unwrap_or_default().is_empty() {
                return token_not_valid();
            }
            Json(json!({"access": "at_new", "refresh": "rt_new"})).into_response()
        }
        RefreshMode::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({"access": "at_late"})).into_response()
        }
        RefreshMode::Reject => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is blacklisted", "code": "token_not_valid"})),
        )
            .into_response(),
    }
}

async fn verify(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    note_exempt(&state, &headers);
    if body["token"] == "at_new" || body["token"] == "at_login" {
        Json(json!({})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired", "code": "token_not_valid"})),
        )
            .into_response()
    }
}

async fn register(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    note_exempt(&state, &headers);
    if body["email"] == "taken@example.com" {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"details": {"email": ["user with this email already exists."]}})),
        )
            .into_response()
    } else {
        (StatusCode::CREATED, Json(json!({"id": 7, "email": body["email"]}))).into_response()
    }
}

async fn employees(State(state): State<MockState>, headers: HeaderMap) -> Response {
    state.counters.employee_calls.fetch_add(1, Ordering::SeqCst);
    note_caller(&state, &headers);
    match bearer(&headers) {
        Some("at_new") | Some("at_login") => Json(json!([{"id": 1, "full_name": "Ana Ruiz"}])).into_response(),
        _ => token_not_valid(),
    }
}

async fn create_employee(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if bearer(&headers).is_none() {
        return token_not_valid();
    }
    if body.get("rfc").is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Invalid data", "details": {"rfc": ["This field is required."]}})),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn always_unauthorized(State(state): State<MockState>, headers: HeaderMap) -> Response {
    note_caller(&state, &headers);
    token_not_valid()
}

async fn boom() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": {"error": "X", "entity_id": 5}})),
    )
        .into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({})).into_response()
}

async fn echo_query(RawQuery(query): RawQuery) -> Response {
    Json(json!({"query": query})).into_response()
}

/// Memory store that counts writes.
#[derive(Default)]
pub struct CountingStore {
    inner: MemorySessionStore,
    pub sets: AtomicUsize,
    pub clears: AtomicUsize,
}

impl CountingStore {
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            inner: MemorySessionStore::with_pair(pair),
            ..Default::default()
        }
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl SessionStore for CountingStore {
    fn get(&self) -> Pin<Box<dyn Future<Output = Option<CredentialPair>> + Send + '_>> {
        self.inner.get()
    }

    fn set(&self, pair: CredentialPair) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(pair)
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }
}

/// Store holding the expired pair.
pub fn expired_session() -> Arc<CountingStore> {
    Arc::new(CountingStore::with_pair(CredentialPair::new("at_old", "rt_old")))
}
