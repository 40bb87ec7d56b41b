//! Incident and maintenance feed filters. Pure, order-preserving.
//!
//! The `*View` types are what `GET /status/incidents` and
//! `GET /status/maintenances` serve: raw dates plus a display form that reads
//! `Date unavailable` when upstream sent nothing usable.

use crate::models::{AffectedComponent, FeedUpdate, Incident, IncidentStatus, Maintenance, MaintenanceStatus};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

pub const DATE_UNAVAILABLE: &str = "Date unavailable";

/// Incidents whose raw status is not "resolved", compared case-insensitively.
pub fn filter_active(incidents: &[Incident]) -> Vec<Incident> {
    incidents
        .iter()
        .filter(|i| !i.status_raw.trim().eq_ignore_ascii_case("resolved"))
        .cloned()
        .collect()
}

pub fn filter_upcoming(maintenances: &[Maintenance]) -> Vec<Maintenance> {
    maintenances
        .iter()
        .filter(|m| matches!(m.status, MaintenanceStatus::NotStartedYet | MaintenanceStatus::InProgress))
        .cloned()
        .collect()
}

/// "May 1, 2024 10:00 UTC", or the unavailable marker for missing/bad input.
pub fn display_date(raw: Option<&str>) -> String {
    let format = format_description!(
        "[month repr:long] [day padding:none], [year] [hour]:[minute] UTC"
    );
    raw.and_then(|r| OffsetDateTime::parse(r.trim(), &Rfc3339).ok())
        .and_then(|dt| dt.to_offset(time::UtcOffset::UTC).format(&format).ok())
        .unwrap_or_else(|| DATE_UNAVAILABLE.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateView {
    pub id: String,
    pub status: String,
    pub body: String,
    pub created: Option<String>,
    pub created_display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentView {
    pub id: String,
    pub name: String,
    pub status: IncidentStatus,
    pub status_raw: String,
    pub created: Option<String>,
    pub created_display: String,
    pub resolved: Option<String>,
    /// Only present once upstream reports a resolution time.
    pub resolved_display: Option<String>,
    pub updates: Vec<UpdateView>,
    pub components: Vec<AffectedComponent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceView {
    pub id: String,
    pub name: String,
    pub status: MaintenanceStatus,
    pub start: Option<String>,
    pub start_display: String,
    pub end: Option<String>,
    pub end_display: String,
    pub updates: Vec<UpdateView>,
    pub components: Vec<AffectedComponent>,
}

impl From<&FeedUpdate> for UpdateView {
    fn from(u: &FeedUpdate) -> Self {
        Self {
            id: u.id.clone(),
            status: u.status.clone(),
            body: u.body.clone(),
            created: u.created.clone(),
            created_display: display_date(u.created.as_deref()),
        }
    }
}

impl From<&Incident> for IncidentView {
    fn from(i: &Incident) -> Self {
        Self {
            id: i.id.clone(),
            name: i.name.clone(),
            status: i.status,
            status_raw: i.status_raw.clone(),
            created: i.created.clone(),
            created_display: display_date(i.created.as_deref()),
            resolved: i.resolved.clone(),
            resolved_display: i.resolved.as_deref().map(|r| display_date(Some(r))),
            updates: i.updates.iter().map(UpdateView::from).collect(),
            components: i.components.clone(),
        }
    }
}

impl From<&Maintenance> for MaintenanceView {
    fn from(m: &Maintenance) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            status: m.status,
            start: m.start.clone(),
            start_display: display_date(m.start.as_deref()),
            end: m.end.clone(),
            end_display: display_date(m.end.as_deref()),
            updates: m.updates.iter().map(UpdateView::from).collect(),
            components: m.components.clone(),
        }
    }
}
