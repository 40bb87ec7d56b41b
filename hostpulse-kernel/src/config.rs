use crate::catalog::GroupCatalog;
use crate::models::{ComponentRecord, Status};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub bind: String,
    pub status: StatusConf,
    pub catalog: GroupCatalog,
    /// Shown, all operational, until the first successful fetch.
    pub fallback: Vec<FallbackComponent>,
    pub billing: Option<BillingConf>,
    pub content: ContentConf,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StatusConf {
    pub components_url: Option<String>,
    pub incidents_url: Option<String>,
    pub maintenances_url: Option<String>,
    pub subscribe_url: Option<String>,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Minimum gap between two `POST /status/refresh` fetches.
    pub manual_refresh_min_secs: u64,
    pub session_ttl_secs: u64,
    pub max_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FallbackComponent {
    pub id: String,
    pub name: String,
    pub group_id: Option<String>,
}

impl FallbackComponent {
    pub fn to_record(&self) -> ComponentRecord {
        ComponentRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            status: Status::Operational,
            group_id: self.group_id.clone(),
            is_collapsed: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BillingConf {
    pub api_url: String,
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ContentConf {
    pub data_dir: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for StatusConf {
    fn default() -> Self {
        Self {
            components_url: None,
            incidents_url: None,
            maintenances_url: None,
            subscribe_url: None,
            refresh_interval_secs: 60,
            request_timeout_secs: 10,
            manual_refresh_min_secs: 10,
            session_ttl_secs: 1800,
            max_sessions: 10_000,
        }
    }
}

impl Default for ContentConf {
    fn default() -> Self {
        Self { data_dir: "./data".into() }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        let fallback = [
            ("web-panel", "Control Panel", "grp-web"),
            ("web-shared", "Shared Hosting", "grp-web"),
            ("vps-cloud", "Cloud VPS", "grp-vps"),
            ("billing-portal", "Client Area", "grp-billing"),
        ]
        .into_iter()
        .map(|(id, name, group)| FallbackComponent {
            id: id.into(),
            name: name.into(),
            group_id: Some(group.into()),
        })
        .collect();

        Self {
            bind: "0.0.0.0:8080".into(),
            status: StatusConf::default(),
            catalog: GroupCatalog::builtin(),
            fallback,
            billing: None,
            content: ContentConf::default(),
            mqtt: None,
        }
    }
}

impl KernelConfig {
    pub fn fallback_records(&self) -> Vec<ComponentRecord> {
        self.fallback.iter().map(FallbackComponent::to_record).collect()
    }

    /// Billing credentials from the environment win over the file.
    fn apply_env(&mut self) {
        let identifier = std::env::var("HOSTPULSE_BILLING_IDENTIFIER").ok();
        let secret = std::env::var("HOSTPULSE_BILLING_SECRET").ok();
        if let Some(billing) = self.billing.as_mut() {
            if let Some(identifier) = identifier {
                billing.identifier = identifier;
            }
            if let Some(secret) = secret {
                billing.secret = secret;
            }
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

pub async fn read_config(path: &Path) -> Result<KernelConfig, ConfigError> {
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("HOSTPULSE_CONFIG").unwrap_or_else(|_| "hostpulse.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        read_config(Path::new(&path)).await.unwrap_or_else(|e| {
            warn!("{e}, using default config");
            KernelConfig::default()
        })
    } else {
        warn!("no {path}, using default config");
        KernelConfig::default()
    };
    cfg.apply_env();
    cfg
}
