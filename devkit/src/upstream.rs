/*!
Mock upstream server for kernel tests.

One axum server on an ephemeral port plays every external HTTP party:

- `GET /components`, `/incidents`, `/maintenances`: status provider
- `POST /subscribe`: subscription endpoint, records each body
- `POST /billing`: WHMCS API, answers per `action`, records each form

Handlers read shared state, so tests change answers while the server runs.
*/

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Default)]
struct Inner {
    components: String,
    incidents: String,
    maintenances: String,
    failure: Option<u16>,
    subscriptions: Vec<Value>,
    subscription_error: Option<String>,
    billing_replies: HashMap<String, Value>,
    billing_calls: Vec<HashMap<String, String>>,
}

type SharedInner = Arc<Mutex<Inner>>;

pub struct MockUpstream {
    addr: SocketAddr,
    inner: SharedInner,
}

impl MockUpstream {
    pub async fn start() -> Self {
        env_logger::try_init().ok();

        let inner: SharedInner = Arc::new(Mutex::new(Inner {
            components: "[]".into(),
            incidents: "[]".into(),
            maintenances: "[]".into(),
            ..Inner::default()
        }));

        let app = Router::new()
            .route("/components", get(components))
            .route("/incidents", get(incidents))
            .route("/maintenances", get(maintenances))
            .route("/subscribe", post(subscribe))
            .route("/billing", post(billing))
            .with_state(inner.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream address");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[mock-upstream] server stopped: {}", e);
            }
        });
        log::info!("[mock-upstream] listening on {}", addr);

        Self { addr, inner }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn set_components(&self, body: Value) {
        self.inner.lock().unwrap().components = body.to_string();
    }

    /// Served verbatim, for malformed-JSON cases.
    pub fn set_raw_components(&self, body: &str) {
        self.inner.lock().unwrap().components = body.to_string();
    }

    pub fn set_incidents(&self, body: Value) {
        self.inner.lock().unwrap().incidents = body.to_string();
    }

    pub fn set_maintenances(&self, body: Value) {
        self.inner.lock().unwrap().maintenances = body.to_string();
    }

    /// Every status provider route answers `code` until `recover`.
    pub fn fail_with(&self, code: u16) {
        self.inner.lock().unwrap().failure = Some(code);
    }

    pub fn recover(&self) {
        self.inner.lock().unwrap().failure = None;
    }

    pub fn subscriptions(&self) -> Vec<Value> {
        self.inner.lock().unwrap().subscriptions.clone()
    }

    /// Following subscriptions get `400 {error: msg}`.
    pub fn reject_subscriptions(&self, msg: &str) {
        self.inner.lock().unwrap().subscription_error = Some(msg.to_string());
    }

    pub fn set_billing_reply(&self, action: &str, reply: Value) {
        self.inner
            .lock()
            .unwrap()
            .billing_replies
            .insert(action.to_string(), reply);
    }

    pub fn billing_calls(&self) -> Vec<HashMap<String, String>> {
        self.inner.lock().unwrap().billing_calls.clone()
    }
}

fn feed(inner: &SharedInner, pick: fn(&Inner) -> &String) -> Response {
    let state = inner.lock().unwrap();
    if let Some(code) = state.failure {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "upstream failure").into_response();
    }
    ([(header::CONTENT_TYPE, "application/json")], pick(&state).clone()).into_response()
}

async fn components(State(inner): State<SharedInner>) -> Response {
    feed(&inner, |s| &s.components)
}

async fn incidents(State(inner): State<SharedInner>) -> Response {
    feed(&inner, |s| &s.incidents)
}

async fn maintenances(State(inner): State<SharedInner>) -> Response {
    feed(&inner, |s| &s.maintenances)
}

async fn subscribe(State(inner): State<SharedInner>, Json(body): Json<Value>) -> Response {
    let mut state = inner.lock().unwrap();
    if let Some(msg) = state.subscription_error.clone() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response();
    }
    state.subscriptions.push(body);
    Json(json!({ "success": true })).into_response()
}

async fn billing(State(inner): State<SharedInner>, Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    let mut state = inner.lock().unwrap();
    let action = form.get("action").cloned().unwrap_or_default();
    state.billing_calls.push(form);
    let reply = state
        .billing_replies
        .get(&action)
        .cloned()
        .unwrap_or_else(|| json!({ "result": "error", "message": format!("no reply configured for {action}") }));
    Json(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_and_fails_on_demand() {
        let upstream = MockUpstream::start().await;
        upstream.set_components(json!([{"id": "a"}]));

        let body: Value = reqwest::get(upstream.url("/components")).await.unwrap().json().await.unwrap();
        assert_eq!(body[0]["id"], "a");

        upstream.fail_with(502);
        let res = reqwest::get(upstream.url("/incidents")).await.unwrap();
        assert_eq!(res.status().as_u16(), 502);

        upstream.recover();
        let res = reqwest::get(upstream.url("/maintenances")).await.unwrap();
        assert_eq!(res.text().await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn records_subscriptions_and_billing_forms() {
        let upstream = MockUpstream::start().await;
        let client = reqwest::Client::new();

        client
            .post(upstream.url("/subscribe"))
            .json(&json!({"components": ["ALL"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(upstream.subscriptions().len(), 1);

        upstream.set_billing_reply("GetProducts", json!({"result": "success"}));
        let reply: Value = client
            .post(upstream.url("/billing"))
            .form(&[("action", "GetProducts")])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["result"], "success");
        assert_eq!(upstream.billing_calls()[0]["action"], "GetProducts");
    }
}
