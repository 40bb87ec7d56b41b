/**
 * HOSTPULSE KERNEL - status page backend for a hosting provider
 *
 * ROLE: Wires config, the status board and its refresher, per-visitor
 * subscription sessions, the content store, the billing client, MQTT events
 * and the HTTP API.
 *
 * ARCHITECTURE: periodic upstream polling into an in-memory snapshot, served
 * over axum; status transitions fanned out over MQTT when a broker is set.
 */

mod billing;
mod catalog;
mod config;
mod events;
mod health;
mod http;
mod models;
mod ports;
mod refresher;
mod state;
mod status;
mod subscriptions;

use crate::billing::BillingClient;
use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::ports::{create_content_store, ContentRegistry};
use crate::refresher::Refresher;
use crate::state::new_state;
use crate::status::{StatusBoard, StatusSource};
use crate::subscriptions::{HttpSubscriptionSink, SubscriptionSessions};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hostpulse_kernel=info")),
        )
        .init();

    let cfg = load_config().await;
    let timeout = Duration::from_secs(cfg.status.request_timeout_secs);
    let health_tracker = HealthTracker::new();

    // status board starts on the fallback snapshot
    let board = new_state(StatusBoard::new(cfg.catalog.clone(), &cfg.fallback_records()));
    let source = StatusSource::new(&cfg.status)?;
    if cfg.status.components_url.is_none() {
        warn!("no components_url configured, serving fallback components only");
    }

    let content = match create_content_store(Path::new(&cfg.content.data_dir)) {
        Ok(registry) => registry,
        Err(e) => {
            error!("failed to open content store: {}", e);
            ContentRegistry::new()
        }
    };

    let billing = cfg
        .billing
        .as_ref()
        .map(|b| BillingClient::new(b, timeout))
        .transpose()?;
    let subscriber = cfg
        .status
        .subscribe_url
        .as_ref()
        .map(|url| HttpSubscriptionSink::new(url.clone(), timeout))
        .transpose()?;

    // MQTT is optional: without a broker, status changes are only logged
    let events = cfg.mqtt.as_ref().map(|mqtt_cfg| {
        let (client, eventloop) = events::create_mqtt_client(mqtt_cfg);
        health_tracker.mark_mqtt_connecting();
        events::spawn_event_loop(eventloop, health_tracker.clone());
        health_tracker.spawn_health_publisher(client.clone());
        info!("publishing status changes to {}:{}", mqtt_cfg.host, mqtt_cfg.port);
        Arc::new(client)
    });

    let refresher = Refresher::new(board, source, health_tracker.clone(), events);
    refresher
        .clone()
        .spawn_periodic(Duration::from_secs(cfg.status.refresh_interval_secs.max(1)));

    let api_key = std::env::var("HOSTPULSE_API_KEY").ok().filter(|k| !k.is_empty());
    if api_key.is_none() {
        warn!("HOSTPULSE_API_KEY not set, /content and /billing will refuse every request");
    }

    let app_state = AppState {
        refresher,
        sessions: new_state(SubscriptionSessions::new(
            Duration::from_secs(cfg.status.session_ttl_secs),
            cfg.status.max_sessions,
        )),
        manual_refresh_gap: Duration::from_secs(cfg.status.manual_refresh_min_secs),
        subscriber,
        content: Arc::new(content),
        billing,
        health_tracker,
        api_key,
    };

    let app = http::build_router(app_state);
    let listener = TcpListener::bind(&cfg.bind).await?;
    info!("listening on http://{}", cfg.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
