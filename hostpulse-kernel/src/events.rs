/**
 * STATUS EVENTS - MQTT fan-out of component status transitions
 *
 * ROLE:
 * After every applied refresh, components whose status changed are published
 * on `hostpulse/status/changed@v1` so notification workers (mail, webhooks,
 * chat) can react without polling the kernel. Kernel health goes out on
 * `hostpulse/kernel/health@v1` every 30s.
 *
 * Broker trouble is logged and counted in health; it never blocks a refresh.
 */

use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::models::Status;
use crate::status::tree::ComponentTree;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task;
use tracing::{debug, error, info, warn};

pub const STATUS_CHANGED_TOPIC: &str = "hostpulse/status/changed@v1";
pub const KERNEL_HEALTH_TOPIC: &str = "hostpulse/kernel/health@v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub component_id: String,
    pub name: String,
    pub previous: Status,
    pub current: Status,
    pub at: String,
}

/// Leaf-level transitions between two snapshots, matched by id.
/// Components that appear or disappear are not transitions.
pub fn diff_snapshots(old: &ComponentTree, new: &ComponentTree) -> Vec<StatusChange> {
    let previous: HashMap<&str, Status> = old
        .iter()
        .filter(|(_, n)| !n.is_group())
        .map(|(_, n)| (n.id.as_str(), n.status))
        .collect();
    let at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();

    new.iter()
        .filter(|(_, n)| !n.is_group())
        .filter_map(|(_, n)| {
            let before = *previous.get(n.id.as_str())?;
            (before != n.status).then(|| StatusChange {
                component_id: n.id.clone(),
                name: n.name.clone(),
                previous: before,
                current: n.status,
                at: at.clone(),
            })
        })
        .collect()
}

/// Anything that can put a payload on a broker topic.
pub trait EventSink {
    fn publish_json(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl EventSink for AsyncClient {
    async fn publish_json(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.publish(topic, QoS::AtLeastOnce, false, payload).await?;
        Ok(())
    }
}

/// Publishes each change, returns how many went out.
pub async fn publish_changes<S: EventSink + Sync>(sink: &S, changes: &[StatusChange]) -> usize {
    let mut sent = 0;
    for change in changes {
        let payload = match serde_json::to_vec(change) {
            Ok(p) => p,
            Err(e) => {
                error!("cannot encode status change for {}: {}", change.component_id, e);
                continue;
            }
        };
        match sink.publish_json(STATUS_CHANGED_TOPIC, payload).await {
            Ok(()) => {
                debug!("{}: {} -> {}", change.component_id, change.previous, change.current);
                sent += 1;
            }
            Err(e) => warn!("failed to publish status change for {}: {}", change.component_id, e),
        }
    }
    sent
}

pub fn create_mqtt_client(cfg: &MqttConf) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new("hostpulse-kernel", &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(15));
    AsyncClient::new(opts, 10)
}

/// Drives the MQTT event loop and mirrors its state into health.
pub fn spawn_event_loop(mut eventloop: EventLoop, health: HealthTracker) {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(rumqttc::Incoming::ConnAck(_))) => {
                    info!("connected to MQTT broker");
                    health.mark_mqtt_connected();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT error: {:?}", e);
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}
