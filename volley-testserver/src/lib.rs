use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub mod mqtt;
pub mod sockets;

pub use mqtt::MqttTestBroker;
pub use sockets::EchoSockets;

pub const PATH_PING: &str = "/ping";
pub const PATH_LOGIN: &str = "/login";
pub const PATH_WHOAMI: &str = "/whoami";
pub const PATH_ECHO: &str = "/echo";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_STATUS: &str = "/status/{code}";
pub const PATH_GRAPHQL: &str = "/graphql";
pub const PATH_SOAP: &str = "/soap";

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    saw_test_header: Arc<AtomicU64>,
    logins: Arc<AtomicU64>,
    authorized: Arc<AtomicU64>,
    saw_soap_action: Arc<AtomicU64>,
}

impl TestServerStats {
    fn hit(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn saw_test_header(&self) -> u64 {
        self.saw_test_header.load(Ordering::Relaxed)
    }

    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// `/whoami` calls that carried a token issued by `/login`.
    pub fn authorized(&self) -> u64 {
        self.authorized.load(Ordering::Relaxed)
    }

    pub fn saw_soap_action(&self) -> u64 {
        self.saw_soap_action.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub ping: String,
    pub login: String,
    pub whoami: String,
    pub echo: String,
    pub slow: String,
    pub graphql: String,
    pub soap: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            ping: format!("{base_url}{PATH_PING}"),
            login: format!("{base_url}{PATH_LOGIN}"),
            whoami: format!("{base_url}{PATH_WHOAMI}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            graphql: format!("{base_url}{PATH_GRAPHQL}"),
            soap: format!("{base_url}{PATH_SOAP}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlRequest {
    query: String,
    #[serde(default)]
    variables: serde_json::Value,
}

async fn handle_ping(State(stats): State<TestServerStats>) -> &'static str {
    stats.hit();
    "pong"
}

async fn handle_slow(State(stats): State<TestServerStats>) -> &'static str {
    stats.hit();
    sleep(Duration::from_millis(50)).await;
    "slow"
}

async fn handle_status(
    State(stats): State<TestServerStats>,
    Path(code): Path<u16>,
) -> StatusCode {
    stats.hit();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn handle_login(State(stats): State<TestServerStats>, body: Bytes) -> Response {
    stats.hit();

    let Ok(req) = serde_json::from_slice::<LoginRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "bad json").into_response();
    };
    if req.password.is_empty() {
        return (StatusCode::UNAUTHORIZED, "missing password").into_response();
    }

    stats.logins.fetch_add(1, Ordering::Relaxed);
    Json(json!({
        "token": format!("tok-{}", req.username),
        "user": { "name": req.username, "roles": ["tester"] },
    }))
    .into_response()
}

async fn handle_whoami(State(stats): State<TestServerStats>, headers: HeaderMap) -> Response {
    stats.hit();

    let user = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|t| t.strip_prefix("tok-"))
        .filter(|u| !u.is_empty());

    match user {
        Some(user) => {
            stats.authorized.fetch_add(1, Ordering::Relaxed);
            Json(json!({ "user": user })).into_response()
        }
        None => (StatusCode::UNAUTHORIZED, "missing token").into_response(),
    }
}

async fn handle_echo(
    State(stats): State<TestServerStats>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    stats.hit();

    if headers.get("x-test").and_then(|v| v.to_str().ok()) == Some("1") {
        stats.saw_test_header.fetch_add(1, Ordering::Relaxed);
    }

    let mut res = (StatusCode::OK, body).into_response();
    if let Some(tag) = query.get("tag")
        && let Ok(v) = HeaderValue::from_str(tag)
    {
        res.headers_mut().insert("x-echo-tag", v);
    }
    res
}

async fn handle_graphql(State(stats): State<TestServerStats>, body: Bytes) -> Response {
    stats.hit();

    let Ok(req) = serde_json::from_slice::<GraphqlRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "bad json").into_response();
    };

    if req.query.contains("fail") {
        return Json(json!({ "errors": [{ "message": "field `fail` does not exist" }] }))
            .into_response();
    }

    Json(json!({ "data": { "query": req.query, "echo": req.variables } })).into_response()
}

async fn handle_soap(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    stats.hit();

    if headers.contains_key("soapaction") {
        stats.saw_soap_action.fetch_add(1, Ordering::Relaxed);
    }

    let text = String::from_utf8_lossy(&body);
    let xml_type = [("content-type", "text/xml; charset=utf-8")];

    if text.contains("<Fail") {
        let fault = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
             <soap:Body><soap:Fault><faultcode>soap:Server</faultcode>\
             <faultstring>operation failed</faultstring></soap:Fault></soap:Body></soap:Envelope>";
        return (StatusCode::INTERNAL_SERVER_ERROR, xml_type, fault).into_response();
    }

    let ok = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <soap:Body><Result>ok</Result></soap:Body></soap:Envelope>";
    (StatusCode::OK, xml_type, ok).into_response()
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_PING, get(handle_ping))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_STATUS, get(handle_status))
        .route(PATH_LOGIN, post(handle_login))
        .route(PATH_WHOAMI, get(handle_whoami))
        .route(PATH_ECHO, post(handle_echo))
        .route(PATH_GRAPHQL, post(handle_graphql))
        .route(PATH_SOAP, post(handle_soap))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
