/**
 * STATUS SOURCE ADAPTER
 *
 * ROLE:
 * Only place that knows what the upstream status provider sends. Everything
 * past this module works on typed records.
 *
 * HOW IT WORKS:
 * - Accepts `{success, data: [...]}` envelopes and bare arrays
 * - Validates record by record: a bad record becomes a `ParseIssue`, the rest
 *   of the payload is still used
 * - Tolerates key drift (`groupId`/`parentId`, camelCase/snake_case)
 * - Flattens nested `children` arrays, children inheriting the parent as group
 */

use crate::models::{
    AffectedComponent, ComponentRecord, FeedUpdate, Incident, IncidentStatus, Maintenance,
    MaintenanceStatus, Status,
};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream answered HTTP {0}")]
    HttpStatus(u16),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("upstream reported failure")]
    Unsuccessful,
    #[error("unexpected payload shape: {0}")]
    Shape(String),
}

/// A record skipped during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub issues: Vec<ParseIssue>,
}

impl<T> Parsed<T> {
    fn log_issues(&self, what: &str) {
        for issue in &self.issues {
            warn!("skipping {} record #{}: {}", what, issue.index, issue.reason);
        }
    }
}

/// Unwraps `{success, data}` or returns a bare array as-is.
pub fn unwrap_envelope(body: Value) -> Result<Vec<Value>, SourceError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            if obj.get("success").and_then(Value::as_bool) == Some(false) {
                return Err(SourceError::Unsuccessful);
            }
            match obj.remove("data") {
                Some(Value::Array(items)) => Ok(items),
                Some(other) => Err(SourceError::Shape(format!("`data` is {}", kind_of(&other)))),
                None => Err(SourceError::Shape("object without `data`".into())),
            }
        }
        other => Err(SourceError::Shape(format!("top level is {}", kind_of(&other)))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First key holding a string (or number) value.
fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn flag(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| obj.get(*key).and_then(Value::as_bool))
}

fn array<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn parse_components(items: &[Value]) -> Parsed<ComponentRecord> {
    let mut parsed = Parsed { records: Vec::new(), issues: Vec::new() };
    for (index, item) in items.iter().enumerate() {
        flatten_component(item, None, index, &mut parsed);
    }
    parsed
}

fn flatten_component(item: &Value, inherited_group: Option<&str>, index: usize, out: &mut Parsed<ComponentRecord>) {
    let Some(obj) = item.as_object() else {
        out.issues.push(ParseIssue { index, reason: format!("component is {}", kind_of(item)) });
        return;
    };
    let Some(id) = text(obj, &["id"]) else {
        out.issues.push(ParseIssue { index, reason: "component without id".into() });
        return;
    };

    let record = ComponentRecord {
        name: text(obj, &["name"]).unwrap_or_else(|| id.clone()),
        status: text(obj, &["status"]).map(|s| Status::parse(&s)).unwrap_or(Status::Unknown),
        group_id: text(obj, &["groupId", "group_id", "parentId", "parent_id"])
            .or_else(|| inherited_group.map(str::to_string)),
        is_collapsed: flag(obj, &["isCollapsed", "is_collapsed"]),
        id,
    };
    let parent_id = record.id.clone();
    out.records.push(record);

    for child in array(obj, &["children"]) {
        flatten_component(child, Some(parent_id.as_str()), index, out);
    }
}

fn parse_affected(obj: &Map<String, Value>) -> Vec<AffectedComponent> {
    array(obj, &["components", "affectedComponents"])
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|c| {
            let id = text(c, &["id"])?;
            let name = text(c, &["name"]).unwrap_or_else(|| id.clone());
            Some(AffectedComponent { id, name })
        })
        .collect()
}

fn parse_updates(obj: &Map<String, Value>) -> Vec<FeedUpdate> {
    array(obj, &["updates", "incidentUpdates", "maintenanceUpdates"])
        .iter()
        .filter_map(Value::as_object)
        .enumerate()
        .map(|(i, u)| FeedUpdate {
            id: text(u, &["id"]).unwrap_or_else(|| i.to_string()),
            status: text(u, &["status"]).unwrap_or_default(),
            body: text(u, &["body", "message", "description"]).unwrap_or_default(),
            created: text(u, &["created", "createdAt", "created_at"]),
        })
        .collect()
}

pub fn parse_incidents(items: &[Value]) -> Parsed<Incident> {
    let mut parsed = Parsed { records: Vec::new(), issues: Vec::new() };
    for (index, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            parsed.issues.push(ParseIssue { index, reason: format!("incident is {}", kind_of(item)) });
            continue;
        };
        let Some(id) = text(obj, &["id"]) else {
            parsed.issues.push(ParseIssue { index, reason: "incident without id".into() });
            continue;
        };
        let status_raw = text(obj, &["status"]).unwrap_or_default();
        parsed.records.push(Incident {
            name: text(obj, &["name", "title"]).unwrap_or_else(|| id.clone()),
            status: IncidentStatus::parse(&status_raw),
            status_raw,
            created: text(obj, &["created", "createdAt", "started"]),
            resolved: text(obj, &["resolved", "resolvedAt"]),
            updates: parse_updates(obj),
            components: parse_affected(obj),
            id,
        });
    }
    parsed
}

pub fn parse_maintenances(items: &[Value]) -> Parsed<Maintenance> {
    let mut parsed = Parsed { records: Vec::new(), issues: Vec::new() };
    for (index, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            parsed.issues.push(ParseIssue { index, reason: format!("maintenance is {}", kind_of(item)) });
            continue;
        };
        let Some(id) = text(obj, &["id"]) else {
            parsed.issues.push(ParseIssue { index, reason: "maintenance without id".into() });
            continue;
        };
        parsed.records.push(Maintenance {
            name: text(obj, &["name", "title"]).unwrap_or_else(|| id.clone()),
            status: MaintenanceStatus::parse(&text(obj, &["status"]).unwrap_or_default()),
            start: text(obj, &["start", "startDate", "started"]),
            end: text(obj, &["end", "endDate", "ended"]),
            updates: parse_updates(obj),
            components: parse_affected(obj),
            id,
        });
    }
    parsed
}

/// HTTP side of the adapter.
#[derive(Clone)]
pub struct StatusSource {
    client: reqwest::Client,
    components_url: Option<String>,
    incidents_url: Option<String>,
    maintenances_url: Option<String>,
}

impl StatusSource {
    pub fn new(cfg: &crate::config::StatusConf) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            components_url: cfg.components_url.clone(),
            incidents_url: cfg.incidents_url.clone(),
            maintenances_url: cfg.maintenances_url.clone(),
        })
    }

    async fn fetch_items(&self, url: Option<&str>, what: &'static str) -> Result<Vec<Value>, SourceError> {
        let url = url.ok_or(SourceError::NotConfigured(what))?;
        debug!("fetching {} from {}", what, url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus(status.as_u16()));
        }
        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        unwrap_envelope(value)
    }

    pub async fn fetch_components(&self) -> Result<Vec<ComponentRecord>, SourceError> {
        let items = self.fetch_items(self.components_url.as_deref(), "components").await?;
        let parsed = parse_components(&items);
        parsed.log_issues("component");
        Ok(parsed.records)
    }

    pub async fn fetch_incidents(&self) -> Result<Vec<Incident>, SourceError> {
        let items = self.fetch_items(self.incidents_url.as_deref(), "incidents").await?;
        let parsed = parse_incidents(&items);
        parsed.log_issues("incident");
        Ok(parsed.records)
    }

    pub async fn fetch_maintenances(&self) -> Result<Vec<Maintenance>, SourceError> {
        let items = self.fetch_items(self.maintenances_url.as_deref(), "maintenances").await?;
        let parsed = parse_maintenances(&items);
        parsed.log_issues("maintenance");
        Ok(parsed.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusConf;
    use hostpulse_devkit::fixtures::{ComponentFixture, FeedFixture};
    use hostpulse_devkit::MockUpstream;
    use serde_json::json;

    #[test]
    fn envelope_and_bare_array() {
        let wrapped = json!({"success": true, "data": [{"id": "a"}]});
        assert_eq!(unwrap_envelope(wrapped).unwrap().len(), 1);
        let bare = json!([{"id": "a"}, {"id": "b"}]);
        assert_eq!(unwrap_envelope(bare).unwrap().len(), 2);
        assert!(matches!(
            unwrap_envelope(json!({"success": false, "data": []})),
            Err(SourceError::Unsuccessful)
        ));
        assert!(matches!(unwrap_envelope(json!("nope")), Err(SourceError::Shape(_))));
    }

    #[test]
    fn group_keys_are_unified() {
        let parsed = parse_components(&[
            json!({"id": "a", "name": "A", "status": "OPERATIONAL", "groupId": "g1"}),
            json!({"id": "b", "name": "B", "status": "MAJOROUTAGE", "parentId": "g2"}),
            json!({"id": 7, "status": "weird"}),
        ]);
        assert!(parsed.issues.is_empty());
        assert_eq!(parsed.records[0].group_id.as_deref(), Some("g1"));
        assert_eq!(parsed.records[1].group_id.as_deref(), Some("g2"));
        assert_eq!(parsed.records[1].status, Status::MajorOutage);
        assert_eq!(parsed.records[2].id, "7");
        assert_eq!(parsed.records[2].name, "7");
        assert_eq!(parsed.records[2].status, Status::Unknown);
    }

    #[test]
    fn invalid_records_become_issues() {
        let parsed = parse_components(&[json!({"name": "no id"}), json!(42), json!({"id": "ok"})]);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.issues[1].index, 1);
    }

    #[test]
    fn nested_children_are_flattened() {
        let parsed = parse_components(&[ComponentFixture::new("g", "Group")
            .collapsed(false)
            .child(ComponentFixture::new("c1", "C1"))
            .child(ComponentFixture::new("c2", "C2").status("PARTIALOUTAGE").group("other"))
            .build()]);
        let ids: Vec<&str> = parsed.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["g", "c1", "c2"]);
        assert_eq!(parsed.records[0].is_collapsed, Some(false));
        assert_eq!(parsed.records[1].group_id.as_deref(), Some("g"));
        assert_eq!(parsed.records[2].group_id.as_deref(), Some("other"));
    }

    #[test]
    fn incidents_and_maintenances() {
        let incidents = parse_incidents(&[
            json!({"id": "i1", "name": "Outage", "status": "Investigating", "created": "2024-05-01T10:00:00Z",
                   "updates": [{"id": "u1", "status": "INVESTIGATING", "body": "Looking"}],
                   "components": [{"id": "c1", "name": "Web"}]}),
        ]);
        let incident = &incidents.records[0];
        assert_eq!(incident.status, IncidentStatus::Investigating);
        assert_eq!(incident.status_raw, "Investigating");
        assert_eq!(incident.updates[0].body, "Looking");
        assert_eq!(incident.components[0].name, "Web");

        let maintenances = parse_maintenances(&[json!({"id": "m1", "name": "Kernel upgrade", "status": "NOTSTARTEDYET", "start": "x"})]);
        assert_eq!(maintenances.records[0].status, MaintenanceStatus::NotStartedYet);
        assert_eq!(maintenances.records[0].start.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn fetches_from_upstream() {
        let upstream = MockUpstream::start().await;
        upstream.set_components(json!({
            "success": true,
            "data": [ComponentFixture::new("web-1", "Web 1").status("DEGRADEDPERFORMANCE").group("grp-web").build()]
        }));
        upstream.set_incidents(json!([FeedFixture::incident("i1", "Slow panel", "IDENTIFIED")]));

        let source = StatusSource::new(&StatusConf {
            components_url: Some(upstream.url("/components")),
            incidents_url: Some(upstream.url("/incidents")),
            maintenances_url: None,
            ..StatusConf::default()
        })
        .unwrap();

        let components = source.fetch_components().await.unwrap();
        assert_eq!(components[0].status, Status::DegradedPerformance);
        let incidents = source.fetch_incidents().await.unwrap();
        assert_eq!(incidents[0].status, IncidentStatus::Identified);
        assert!(matches!(
            source.fetch_maintenances().await,
            Err(SourceError::NotConfigured("maintenances"))
        ));
    }

    #[tokio::test]
    async fn upstream_errors_surface() {
        let upstream = MockUpstream::start().await;
        upstream.fail_with(503);
        let source = StatusSource::new(&StatusConf {
            components_url: Some(upstream.url("/components")),
            ..StatusConf::default()
        })
        .unwrap();
        assert!(matches!(source.fetch_components().await, Err(SourceError::HttpStatus(503))));

        upstream.recover();
        upstream.set_raw_components("{not json");
        assert!(matches!(source.fetch_components().await, Err(SourceError::Json(_))));
    }
}
