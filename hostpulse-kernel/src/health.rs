use crate::events::{EventSink, KERNEL_HEALTH_TOPIC};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub components_tracked: u32,
    pub last_refresh: Option<String>,
    pub last_refresh_age_seconds: Option<u64>,
    pub refresh_ok: u32,
    pub refresh_failed: u32,
    pub serving_fallback: bool,
    pub memory_usage_mb: f32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Debug, Clone)]
struct RefreshMark {
    at: Instant,
    outcome: &'static str,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    components: Arc<AtomicUsize>,
    refresh_ok: Arc<AtomicU32>,
    refresh_failed: Arc<AtomicU32>,
    fallback: Arc<AtomicBool>,
    last_refresh: Arc<Mutex<Option<RefreshMark>>>,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<String>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            components: Arc::new(AtomicUsize::new(0)),
            refresh_ok: Arc::new(AtomicU32::new(0)),
            refresh_failed: Arc::new(AtomicU32::new(0)),
            fallback: Arc::new(AtomicBool::new(true)),
            last_refresh: Arc::new(Mutex::new(None)),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new("disabled".to_string())),
        }
    }

    /// `ok` is false when the components fetch failed, even if feeds succeeded.
    pub fn record_refresh(&self, ok: bool, components: usize, fallback: bool) {
        let counter = if ok { &self.refresh_ok } else { &self.refresh_failed };
        counter.fetch_add(1, Ordering::Relaxed);
        self.components.store(components, Ordering::Relaxed);
        self.fallback.store(fallback, Ordering::Relaxed);
        *self.last_refresh.lock() = Some(RefreshMark {
            at: Instant::now(),
            outcome: if ok { "ok" } else { "failed" },
        });
    }

    pub fn mark_mqtt_connecting(&self) {
        *self.mqtt_status.lock() = "connecting".to_string();
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self) -> KernelHealth {
        let last = self.last_refresh.lock().clone();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components_tracked: self.components.load(Ordering::Relaxed) as u32,
            last_refresh: last.as_ref().map(|m| m.outcome.to_string()),
            last_refresh_age_seconds: last.map(|m| m.at.elapsed().as_secs()),
            refresh_ok: self.refresh_ok.load(Ordering::Relaxed),
            refresh_failed: self.refresh_failed.load(Ordering::Relaxed),
            serving_fallback: self.fallback.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }

    /// Publishes kernel health every 30s on the shared broker connection.
    pub fn spawn_health_publisher<S>(&self, sink: S)
    where
        S: EventSink + Send + Sync + 'static,
    {
        let tracker = self.clone();
        task::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let health = tracker.get_health();
                let Ok(payload) = serde_json::to_vec(&health) else {
                    continue;
                };
                match sink.publish_json(KERNEL_HEALTH_TOPIC, payload).await {
                    Ok(()) => debug!(
                        "published kernel health (uptime: {}s, components: {})",
                        health.uptime_seconds, health.components_tracked
                    ),
                    Err(e) => warn!("failed to publish kernel health: {:?}", e),
                }
            }
        });
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|l| l.starts_with("VmRSS:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}
