/**
 * HOSTPULSE HTTP API
 *
 * ROLE:
 * Public status page API (tree, feeds, expansion, subscription forms) plus
 * the admin surface for site content and billing operations.
 *
 * HOW IT WORKS:
 * - Axum router over a cloned `AppState`
 * - Status and subscription routes are public, `/content` and `/billing`
 *   require `x-api-key` matching `HOSTPULSE_API_KEY` (denied when unset)
 * - Subscription forms belong to a session opened with `POST /subscribe/sessions`;
 *   the returned token scopes every later form call to that visitor
 * - Manual refreshes join a round in flight and are rate limited
 * - Errors come back as `{ok: false, error}` with 400/404/409/502/503
 * - Locks are taken board first, then sessions, and never held across an await
 */

use crate::billing::{BillingClient, BillingError, OrderRequest};
use crate::health::{HealthTracker, KernelHealth};
use crate::ports::{Collection, CollectionInfo, ContentQuery, ContentRecord, ContentRegistry, StoreError};
use crate::refresher::Refresher;
use crate::state::Shared;
use crate::status::feed::{IncidentView, MaintenanceView};
use crate::status::tree::ComponentTree;
use crate::status::view::StatusView;
use crate::subscriptions::{
    Channel, ChannelSubscription, HttpSubscriptionSink, SubscriberForms, SubscriptionError, SubscriptionSessions,
    SubscriptionSink,
};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rumqttc::AsyncClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(code: StatusCode, msg: impl ToString) -> ApiError {
    (code, Json(json!({ "ok": false, "error": msg.to_string() })))
}

#[derive(Clone)]
pub struct AppState {
    pub refresher: Refresher<AsyncClient>,
    pub sessions: Shared<SubscriptionSessions>,
    pub subscriber: Option<HttpSubscriptionSink>,
    pub content: Arc<ContentRegistry>,
    pub billing: Option<BillingClient>,
    pub health_tracker: HealthTracker,
    pub api_key: Option<String>,
    pub manual_refresh_gap: Duration,
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();
    if !(path.starts_with("/content") || path.starts_with("/billing")) {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.api_key.as_deref().filter(|k| !k.is_empty()) else {
        error!("HOSTPULSE_API_KEY not set, admin API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !ok {
        warn!("rejected admin request to {}", path);
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/status", get(get_status))
        .route("/status/refresh", post(refresh_status))
        .route("/status/toggle/{id}", post(toggle_node))
        .route("/status/incidents", get(get_incidents))
        .route("/status/maintenances", get(get_maintenances))
        .route("/subscribe/sessions", post(open_session))
        .route("/subscribe/sessions/{session}", get(get_forms).delete(close_session))
        .route("/subscribe/sessions/{session}/{channel}/contact", put(set_contact))
        .route("/subscribe/sessions/{session}/{channel}/select", post(select_component))
        .route("/subscribe/sessions/{session}/{channel}/notify-all", post(set_notify_all))
        .route("/subscribe/sessions/{session}/{channel}/submit", post(submit_subscription))
        .route("/content", get(list_collections))
        .route("/content/{collection}", get(list_content).post(create_content))
        .route("/content/{collection}/{key}", get(get_content).delete(delete_content))
        .route("/billing/clients/{id}", get(get_client).put(update_client).delete(delete_client))
        .route("/billing/clients/{id}/close", post(close_client))
        .route("/billing/clients/{id}/products", get(get_client_products))
        .route("/billing/products", get(get_products))
        .route("/billing/orders", post(add_order))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health())
}

// ---- status ----

async fn get_status(State(app): State<AppState>) -> Json<StatusView> {
    Json(app.refresher.board.lock().view())
}

async fn refresh_status(State(app): State<AppState>) -> Json<StatusView> {
    app.refresher.refresh_on_demand(app.manual_refresh_gap).await;
    Json(app.refresher.board.lock().view())
}

async fn toggle_node(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    match app.refresher.board.lock().toggle(&id) {
        Some(expanded) => Ok(Json(json!({ "id": id, "expanded": expanded }))),
        None => Err(api_error(StatusCode::NOT_FOUND, format!("no group {id}"))),
    }
}

#[derive(Debug, Deserialize)]
struct IncidentParams {
    #[serde(default)]
    include_resolved: bool,
}

#[derive(Debug, Deserialize)]
struct MaintenanceParams {
    #[serde(default)]
    include_completed: bool,
}

async fn get_incidents(State(app): State<AppState>, Query(p): Query<IncidentParams>) -> Json<Vec<IncidentView>> {
    let incidents = app.refresher.board.lock().incidents(p.include_resolved);
    Json(incidents.iter().map(IncidentView::from).collect())
}

async fn get_maintenances(
    State(app): State<AppState>,
    Query(p): Query<MaintenanceParams>,
) -> Json<Vec<MaintenanceView>> {
    let maintenances = app.refresher.board.lock().maintenances(p.include_completed);
    Json(maintenances.iter().map(MaintenanceView::from).collect())
}

// ---- subscriptions ----

fn subscription_error(e: SubscriptionError) -> ApiError {
    let code = match &e {
        SubscriptionError::UnknownChannel(_)
        | SubscriptionError::UnknownComponent(_)
        | SubscriptionError::UnknownSession => StatusCode::NOT_FOUND,
        SubscriptionError::SelectionLocked | SubscriptionError::SubmissionPending => StatusCode::CONFLICT,
        SubscriptionError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        _ if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    api_error(code, e)
}

fn parse_channel(raw: &str) -> Result<Channel, ApiError> {
    raw.parse().map_err(subscription_error)
}

/// Runs `f` on one form of a session, pruned against the current tree first.
fn with_form<T>(
    app: &AppState,
    session: &str,
    channel: Channel,
    f: impl FnOnce(&ComponentTree, &mut ChannelSubscription) -> Result<T, SubscriptionError>,
) -> Result<T, ApiError> {
    let board = app.refresher.board.lock();
    let mut sessions = app.sessions.lock();
    let form = sessions
        .forms_mut(session)
        .map_err(subscription_error)?
        .channel_mut(channel);
    form.reconcile(board.tree());
    f(board.tree(), form).map_err(subscription_error)
}

#[derive(Debug, Deserialize)]
struct ContactBody {
    value: String,
}

#[derive(Debug, Deserialize)]
struct SelectBody {
    id: String,
    checked: bool,
}

#[derive(Debug, Deserialize)]
struct NotifyAllBody {
    enabled: bool,
}

async fn open_session(State(app): State<AppState>) -> (StatusCode, Json<Value>) {
    let (session, forms) = app.sessions.lock().open();
    (StatusCode::CREATED, Json(json!({ "session": session, "forms": forms })))
}

async fn get_forms(State(app): State<AppState>, Path(session): Path<String>) -> ApiResult<SubscriberForms> {
    let board = app.refresher.board.lock();
    let mut sessions = app.sessions.lock();
    let forms = sessions.forms_mut(&session).map_err(subscription_error)?;
    forms.reconcile(board.tree());
    Ok(Json(forms.clone()))
}

async fn close_session(State(app): State<AppState>, Path(session): Path<String>) -> ApiResult<Value> {
    if app.sessions.lock().close(&session) {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(subscription_error(SubscriptionError::UnknownSession))
    }
}

async fn set_contact(
    State(app): State<AppState>,
    Path((session, channel)): Path<(String, String)>,
    Json(body): Json<ContactBody>,
) -> ApiResult<ChannelSubscription> {
    let channel = parse_channel(&channel)?;
    with_form(&app, &session, channel, |_, form| {
        form.set_contact(&body.value)?;
        Ok(form.clone())
    })
    .map(Json)
}

async fn select_component(
    State(app): State<AppState>,
    Path((session, channel)): Path<(String, String)>,
    Json(body): Json<SelectBody>,
) -> ApiResult<ChannelSubscription> {
    let channel = parse_channel(&channel)?;
    with_form(&app, &session, channel, |tree, form| {
        form.toggle(tree, &body.id, body.checked)?;
        Ok(form.clone())
    })
    .map(Json)
}

async fn set_notify_all(
    State(app): State<AppState>,
    Path((session, channel)): Path<(String, String)>,
    Json(body): Json<NotifyAllBody>,
) -> ApiResult<ChannelSubscription> {
    let channel = parse_channel(&channel)?;
    with_form(&app, &session, channel, |_, form| {
        form.set_notify_all(body.enabled)?;
        Ok(form.clone())
    })
    .map(Json)
}

async fn submit_subscription(
    State(app): State<AppState>,
    Path((session, channel)): Path<(String, String)>,
) -> ApiResult<Value> {
    let channel = parse_channel(&channel)?;
    let request = with_form(&app, &session, channel, |_, form| form.begin_submit())?;

    let result = match &app.subscriber {
        Some(sink) => sink.submit(&request).await,
        None => Err(SubscriptionError::NotConfigured),
    };
    match app.sessions.lock().forms_mut(&session) {
        Ok(forms) => forms.channel_mut(channel).complete(&result),
        Err(_) => debug!("session ended while its {} subscription was in flight", channel),
    }

    result
        .map(|()| Json(json!({ "ok": true, "channel": channel })))
        .map_err(subscription_error)
}

// ---- content ----

fn store_error(e: StoreError) -> ApiError {
    let code = match &e {
        StoreError::NotFound(_) | StoreError::UnknownCollection(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        StoreError::DuplicateSlug { .. } => StatusCode::CONFLICT,
        StoreError::Serialization(_) | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(code, e)
}

fn parse_collection(raw: &str) -> Result<Collection, ApiError> {
    raw.parse().map_err(store_error)
}

async fn list_collections(State(app): State<AppState>) -> Json<Vec<CollectionInfo>> {
    Json(app.content.list_info())
}

// GET /content/{collection}?limit=&offset=&<field>=<value>
async fn list_content(
    State(app): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<ContentRecord>> {
    let collection = parse_collection(&collection)?;
    let port = app
        .content
        .get(collection)
        .ok_or_else(|| store_error(StoreError::UnknownCollection(collection.to_string())))?;

    let mut query = ContentQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "limit" => query.limit = value.parse().ok().or(query.limit),
            "offset" => query.offset = value.parse().ok(),
            _ => {
                let filter = match value.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => Value::String(value),
                };
                query.filters.insert(key, filter);
            }
        }
    }
    port.list(&query).map(Json).map_err(store_error)
}

async fn get_content(
    State(app): State<AppState>,
    Path((collection, key)): Path<(String, String)>,
) -> ApiResult<ContentRecord> {
    let collection = parse_collection(&collection)?;
    let port = app
        .content
        .get(collection)
        .ok_or_else(|| store_error(StoreError::UnknownCollection(collection.to_string())))?;
    port.get(&key).map(Json).map_err(store_error)
}

async fn create_content(
    State(app): State<AppState>,
    Path(collection): Path<String>,
    Json(data): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let collection = parse_collection(&collection)?;
    let port = app
        .content
        .get(collection)
        .ok_or_else(|| store_error(StoreError::UnknownCollection(collection.to_string())))?;
    let id = port.insert(data).map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "id": id }))))
}

async fn delete_content(
    State(app): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let collection = parse_collection(&collection)?;
    let port = app
        .content
        .get(collection)
        .ok_or_else(|| store_error(StoreError::UnknownCollection(collection.to_string())))?;
    port.delete(&id).map_err(store_error)?;
    Ok(Json(json!({ "ok": true })))
}

// ---- billing ----

fn billing(app: &AppState) -> Result<&BillingClient, ApiError> {
    app.billing
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "billing not configured"))
}

fn billing_error(e: BillingError) -> ApiError {
    api_error(StatusCode::BAD_GATEWAY, e)
}

fn flag(ok: bool) -> (StatusCode, Json<Value>) {
    let code = if ok { StatusCode::OK } else { StatusCode::BAD_GATEWAY };
    (code, Json(json!({ "ok": ok })))
}

async fn get_client(State(app): State<AppState>, Path(id): Path<u64>) -> ApiResult<Value> {
    billing(&app)?.get_client_details(id).await.map(Json).map_err(billing_error)
}

async fn update_client(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(fields): Json<BTreeMap<String, String>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    Ok(flag(billing(&app)?.update_client(id, &fields).await))
}

async fn delete_client(State(app): State<AppState>, Path(id): Path<u64>) -> Result<(StatusCode, Json<Value>), ApiError> {
    Ok(flag(billing(&app)?.delete_client(id).await))
}

async fn close_client(State(app): State<AppState>, Path(id): Path<u64>) -> Result<(StatusCode, Json<Value>), ApiError> {
    Ok(flag(billing(&app)?.close_client(id).await))
}

async fn get_products(State(app): State<AppState>) -> ApiResult<Vec<Value>> {
    billing(&app)?.get_products().await.map(Json).map_err(billing_error)
}

async fn get_client_products(State(app): State<AppState>, Path(id): Path<u64>) -> ApiResult<Vec<Value>> {
    billing(&app)?.get_client_products(id).await.map(Json).map_err(billing_error)
}

async fn add_order(State(app): State<AppState>, Json(order): Json<OrderRequest>) -> ApiResult<Value> {
    let result = billing(&app)?.add_order(&order).await.map_err(billing_error)?;
    Ok(Json(json!({ "ok": true, "order_id": result.order_id, "invoice_id": result.invoice_id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GroupCatalog;
    use crate::config::{BillingConf, StatusConf};
    use crate::models::{ComponentRecord, Status};
    use crate::ports::create_content_store;
    use crate::state::new_state;
    use crate::status::{StatusBoard, StatusSource};
    use hostpulse_devkit::MockUpstream;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct Harness {
        base: String,
        http: reqwest::Client,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn open_session(&self) -> String {
            let res = self.http.post(self.url("/subscribe/sessions")).send().await.unwrap();
            assert_eq!(res.status(), StatusCode::CREATED);
            let body: Value = res.json().await.unwrap();
            body["session"].as_str().unwrap().to_string()
        }

        fn form_url(&self, session: &str, rest: &str) -> String {
            self.url(&format!("/subscribe/sessions/{session}{rest}"))
        }
    }

    fn fallback() -> Vec<ComponentRecord> {
        ["web-1", "web-2"]
            .into_iter()
            .map(|id| ComponentRecord {
                id: id.into(),
                name: id.into(),
                status: Status::Operational,
                group_id: Some("grp-web".into()),
                is_collapsed: None,
            })
            .collect()
    }

    async fn serve(upstream: Option<&MockUpstream>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let status_conf = StatusConf {
            components_url: upstream.map(|u| u.url("/components")),
            incidents_url: upstream.map(|u| u.url("/incidents")),
            maintenances_url: upstream.map(|u| u.url("/maintenances")),
            ..StatusConf::default()
        };
        let state = AppState {
            refresher: Refresher::new(
                new_state(StatusBoard::new(GroupCatalog::builtin(), &fallback())),
                StatusSource::new(&status_conf).unwrap(),
                HealthTracker::new(),
                None,
            ),
            sessions: new_state(SubscriptionSessions::new(Duration::from_secs(600), 100)),
            subscriber: upstream
                .map(|u| HttpSubscriptionSink::new(u.url("/subscribe"), Duration::from_secs(5)).unwrap()),
            content: Arc::new(create_content_store(dir.path()).unwrap()),
            billing: upstream.map(|u| {
                let cfg = BillingConf {
                    api_url: u.url("/billing"),
                    identifier: "id".into(),
                    secret: "secret".into(),
                };
                BillingClient::new(&cfg, Duration::from_secs(5)).unwrap()
            }),
            health_tracker: HealthTracker::new(),
            api_key: Some("k3y".into()),
            manual_refresh_gap: Duration::ZERO,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        Harness {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn status_is_public_and_starts_on_fallback() {
        let h = serve(None).await;
        let view: Value = h.http.get(h.url("/status")).send().await.unwrap().json().await.unwrap();
        assert_eq!(view["fallback"], true);
        assert_eq!(view["overall"], "OPERATIONAL");
        assert_eq!(view["groups"][0]["name"], "Web Hosting");

        let res = h.http.post(h.url("/status/toggle/grp-web")).send().await.unwrap();
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["expanded"], true);

        let res = h.http.post(h.url("/status/toggle/web-1")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn subscription_flow_over_http() {
        let upstream = MockUpstream::start().await;
        let h = serve(Some(&upstream)).await;
        let session = h.open_session().await;

        let res = h
            .http
            .post(h.form_url(&session, "/email/select"))
            .json(&json!({"id": "grp-web", "checked": true}))
            .send()
            .await
            .unwrap();
        let form: Value = res.json().await.unwrap();
        assert_eq!(form["selected"], json!(["grp-web", "web-1", "web-2"]));

        // Contact missing: rejected, selection kept.
        let res = h.http.post(h.form_url(&session, "/email/submit")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        h.http
            .put(h.form_url(&session, "/email/contact"))
            .json(&json!({"value": "ops@example.net"}))
            .send()
            .await
            .unwrap();
        let res = h.http.post(h.form_url(&session, "/email/submit")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(upstream.subscriptions()[0]["components"], json!(["grp-web", "web-1", "web-2"]));

        let forms: Value = h.http.get(h.form_url(&session, "")).send().await.unwrap().json().await.unwrap();
        assert_eq!(forms["email"]["contact"], "");
        assert_eq!(forms["email"]["selected"], json!([]));
        assert_eq!(forms["email"]["submitting"], false);
    }

    #[tokio::test]
    async fn visitors_do_not_share_forms() {
        let upstream = MockUpstream::start().await;
        let h = serve(Some(&upstream)).await;
        let alice = h.open_session().await;
        let bob = h.open_session().await;

        h.http
            .put(h.form_url(&alice, "/email/contact"))
            .json(&json!({"value": "alice@private.example"}))
            .send()
            .await
            .unwrap();
        h.http
            .post(h.form_url(&alice, "/email/select"))
            .json(&json!({"id": "web-1", "checked": true}))
            .send()
            .await
            .unwrap();

        let forms: Value = h.http.get(h.form_url(&bob, "")).send().await.unwrap().json().await.unwrap();
        assert_eq!(forms["email"]["contact"], "");
        assert_eq!(forms["email"]["selected"], json!([]));

        h.http
            .post(h.form_url(&bob, "/email/select"))
            .json(&json!({"id": "web-2", "checked": true}))
            .send()
            .await
            .unwrap();
        let res = h.http.post(h.form_url(&bob, "/email/submit")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(upstream.subscriptions().is_empty());

        let forms: Value = h.http.get(h.form_url(&alice, "")).send().await.unwrap().json().await.unwrap();
        assert_eq!(forms["email"]["contact"], "alice@private.example");
        assert_eq!(forms["email"]["selected"], json!(["web-1"]));

        let res = h.http.get(h.form_url("not-a-session", "")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = h.http.delete(h.form_url(&alice, "")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let res = h.http.get(h.form_url(&alice, "")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn notify_all_locks_selection() {
        let h = serve(None).await;
        let session = h.open_session().await;
        h.http
            .post(h.form_url(&session, "/slack/notify-all"))
            .json(&json!({"enabled": true}))
            .send()
            .await
            .unwrap();
        let res = h
            .http
            .post(h.form_url(&session, "/slack/select"))
            .json(&json!({"id": "web-1", "checked": true}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = h
            .http
            .post(h.form_url(&session, "/pager/notify-all"))
            .json(&json!({"enabled": true}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn feed_dates_degrade_to_unavailable() {
        let upstream = MockUpstream::start().await;
        upstream.set_incidents(json!([
            {"id": "i1", "name": "Mail delays", "status": "investigating", "created": "garbage"},
            {"id": "i2", "name": "Panel down", "status": "identified", "created": "2024-05-01T10:00:00Z"}
        ]));
        let h = serve(Some(&upstream)).await;
        h.http.post(h.url("/status/refresh")).send().await.unwrap();

        let incidents: Value = h.http.get(h.url("/status/incidents")).send().await.unwrap().json().await.unwrap();
        assert_eq!(incidents[0]["created"], "garbage");
        assert_eq!(incidents[0]["created_display"], "Date unavailable");
        assert_eq!(incidents[1]["created_display"], "May 1, 2024 10:00 UTC");
    }

    #[tokio::test]
    async fn admin_routes_need_the_key() {
        let h = serve(None).await;
        let res = h.http.get(h.url("/content/posts")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let post = |body: Value| h.http.post(h.url("/content/posts")).header("x-api-key", "k3y").json(&body).send();
        assert_eq!(post(json!({"title": "Hello"})).await.unwrap().status(), StatusCode::CREATED);
        assert_eq!(post(json!({"title": "hello!"})).await.unwrap().status(), StatusCode::CONFLICT);

        let res = h.http.get(h.url("/content/posts/hello")).header("x-api-key", "k3y").send().await.unwrap();
        let record: Value = res.json().await.unwrap();
        assert_eq!(record["data"]["title"], "Hello");

        let res = h.http.get(h.url("/billing/products")).header("x-api-key", "k3y").send().await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn manual_refresh_applies_upstream() {
        let upstream = MockUpstream::start().await;
        upstream.set_components(json!({"success": true, "data": [
            {"id": "db-1", "name": "Database", "status": "PARTIAL_OUTAGE"}
        ]}));
        let h = serve(Some(&upstream)).await;

        let view: Value = h.http.post(h.url("/status/refresh")).send().await.unwrap().json().await.unwrap();
        assert_eq!(view["fallback"], false);
        assert_eq!(view["overall"], "PARTIAL_OUTAGE");
        assert_eq!(view["other_services"]["components"][0]["id"], "db-1");
    }
}
