//! Shared fixtures and collaborator mocks for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio::task::JoinHandle;

use crate::config::ApiConfig;
use crate::net::api::{ApiError, HttpApi, SessionApi};
use crate::net::types::{Group, Member, Registration};

/// A member fixture carrying the given group names.
#[must_use]
pub fn member_with_groups(groups: &[&str]) -> Member {
    Member {
        id: 1,
        username: "alice".to_owned(),
        created: Some("2024-09-01T12:00:00Z".to_owned()),
        email: "alice@example.com".to_owned(),
        role: "member".to_owned(),
        first_name: "Alice".to_owned(),
        last_name: "Liddell".to_owned(),
        discord_username: "alice".to_owned(),
        discord_id: None,
        preview: None,
        major: None,
        grad_date: None,
        linkedin: None,
        github: None,
        leetcode: None,
        resume_url: None,
        local: None,
        bio: None,
        groups: groups.iter().map(|name| Group { name: (*name).to_owned() }).collect(),
        profile_picture_url: None,
    }
}

#[must_use]
pub fn rejected(status: u16, detail: Option<&str>) -> ApiError {
    ApiError::Rejected { status, detail: detail.map(str::to_owned), username: None }
}

// =========================================================================
// MockApi
// =========================================================================

/// Scripted [`SessionApi`]. Each call pops the next queued result; an empty
/// queue falls back to a fixed default noted per field.
#[derive(Default)]
pub struct MockApi {
    /// Default: rejected 403.
    pub session_checks: Mutex<VecDeque<Result<(), ApiError>>>,
    /// Default: rejected 401.
    pub logins: Mutex<VecDeque<Result<(), ApiError>>>,
    /// Default: `Ok(())`.
    pub logouts: Mutex<VecDeque<Result<(), ApiError>>>,
    /// Default: rejected 400.
    pub registrations: Mutex<VecDeque<Result<i64, ApiError>>>,
    /// Default: a member without groups.
    pub members: Mutex<VecDeque<Result<Member, ApiError>>>,
    /// Delays applied to successive member fetches, in order.
    pub member_delays: Mutex<VecDeque<Duration>>,
    pub member_fetches: AtomicUsize,
    pub csrf_refreshes: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl MockApi {
    pub fn push_session_check(&self, result: Result<(), ApiError>) {
        self.session_checks.lock().unwrap().push_back(result);
    }

    pub fn push_login(&self, result: Result<(), ApiError>) {
        self.logins.lock().unwrap().push_back(result);
    }

    pub fn push_logout(&self, result: Result<(), ApiError>) {
        self.logouts.lock().unwrap().push_back(result);
    }

    pub fn push_registration(&self, result: Result<i64, ApiError>) {
        self.registrations.lock().unwrap().push_back(result);
    }

    pub fn push_member(&self, result: Result<Member, ApiError>) {
        self.members.lock().unwrap().push_back(result);
    }

    pub fn push_member_delay(&self, delay: Duration) {
        self.member_delays.lock().unwrap().push_back(delay);
    }

    pub fn csrf_refresh_count(&self) -> usize {
        self.csrf_refreshes.load(Ordering::SeqCst)
    }

    pub fn member_fetch_count(&self) -> usize {
        self.member_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SessionApi for MockApi {
    async fn check_session(&self) -> Result<(), ApiError> {
        let next = self.session_checks.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(rejected(403, None)))
    }

    async fn login(&self, _username: &str, _password: &str) -> Result<(), ApiError> {
        let next = self.logins.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(rejected(401, None)))
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.logouts.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))
    }

    async fn register(&self, _form: &Registration) -> Result<i64, ApiError> {
        let next = self.registrations.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(rejected(400, None)))
    }

    async fn fetch_current_member(&self) -> Result<Member, ApiError> {
        self.member_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.member_delays.lock().unwrap().pop_front();
        let next = self.members.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        next.unwrap_or_else(|| Ok(member_with_groups(&[])))
    }

    async fn refresh_csrf_token(&self) {
        self.csrf_refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

// =========================================================================
// StubServer
// =========================================================================

/// Token the stub hands out from `GET /auth/csrf/` unless overridden.
pub const STUB_CSRF_TOKEN: &str = "stub-token";

/// One request as the stub saw it.
#[derive(Clone, Debug)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub csrf: Option<String>,
    pub cookie: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct StubReply {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
}

#[derive(Default)]
struct StubState {
    replies: Mutex<HashMap<(String, String), StubReply>>,
    requests: Mutex<Vec<StubRequest>>,
}

/// Local axum server answering scripted replies keyed by method and path,
/// recording every request it receives. Unscripted routes answer 404.
pub struct StubServer {
    pub base_url: String,
    state: Arc<StubState>,
    server: JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new().fallback(stub_handler).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let stub = Self { base_url: format!("http://{addr}"), state, server };
        stub.reply_with_header("GET", "/auth/csrf/", 200, "", ("x-csrftoken", STUB_CSRF_TOKEN));
        stub
    }

    pub fn reply(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        self.insert(method, path, StubReply { status, body: body.into(), headers: Vec::new() });
    }

    pub fn reply_with_header(&self, method: &str, path: &str, status: u16, body: impl Into<String>, header: (&str, &str)) {
        let headers = vec![(header.0.to_owned(), header.1.to_owned())];
        self.insert(method, path, StubReply { status, body: body.into(), headers });
    }

    fn insert(&self, method: &str, path: &str, reply: StubReply) {
        self.state.replies.lock().unwrap().insert((method.to_owned(), path.to_owned()), reply);
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<StubRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn api(&self) -> HttpApi {
        HttpApi::new(&ApiConfig::with_base_url(&self.base_url)).unwrap()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn stub_handler(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    state.requests.lock().unwrap().push(StubRequest {
        method: method.to_string(),
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        csrf: header("x-csrftoken"),
        cookie: header("cookie"),
        content_type: header("content-type"),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let reply = state.replies.lock().unwrap().get(&(method.to_string(), uri.path().to_owned())).cloned();
    let Some(reply) = reply else {
        return (StatusCode::NOT_FOUND, r#"{"detail":"Not found."}"#).into_response();
    };
    let status = StatusCode::from_u16(reply.status).unwrap();
    let mut response = (status, reply.body).into_response();
    for (name, value) in reply.headers {
        response
            .headers_mut()
            .insert(HeaderName::from_bytes(name.as_bytes()).unwrap(), HeaderValue::from_str(&value).unwrap());
    }
    response
}

/// JSON for a member fixture as the backend would send it.
#[must_use]
pub fn member_json(groups: &[&str]) -> String {
    serde_json::to_string(&member_with_groups(groups)).unwrap()
}
