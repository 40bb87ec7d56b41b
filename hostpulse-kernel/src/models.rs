use serde::{Deserialize, Serialize};
use std::fmt;

/// Component status, ordered by severity (declaration order is the order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Unknown,
    Operational,
    UnderMaintenance,
    DegradedPerformance,
    PartialOutage,
    MajorOutage,
}

impl Status {
    /// Never fails: anything unrecognized becomes `Unknown`.
    /// Accepts "DEGRADEDPERFORMANCE", "degraded_performance", "Degraded Performance"...
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();
        match key.as_str() {
            "OPERATIONAL" => Status::Operational,
            "UNDERMAINTENANCE" => Status::UnderMaintenance,
            "DEGRADEDPERFORMANCE" => Status::DegradedPerformance,
            "PARTIALOUTAGE" => Status::PartialOutage,
            "MAJOROUTAGE" => Status::MajorOutage,
            _ => Status::Unknown,
        }
    }

    pub fn severity(self) -> u8 {
        match self {
            Status::Unknown => 0,
            Status::Operational => 1,
            Status::UnderMaintenance => 2,
            Status::DegradedPerformance => 3,
            Status::PartialOutage => 4,
            Status::MajorOutage => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Unknown => "Unknown",
            Status::Operational => "Operational",
            Status::UnderMaintenance => "Under Maintenance",
            Status::DegradedPerformance => "Degraded Performance",
            Status::PartialOutage => "Partial Outage",
            Status::MajorOutage => "Major Outage",
        }
    }

    /// CSS class used by the status page; `Unknown` gets the neutral one.
    pub fn tone(self) -> &'static str {
        match self {
            Status::Unknown => "neutral",
            Status::Operational => "ok",
            Status::UnderMaintenance => "maintenance",
            Status::DegradedPerformance => "warning",
            Status::PartialOutage => "partial",
            Status::MajorOutage => "critical",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Investigating,
    Identified,
    Monitoring,
    Resolved,
    Unknown,
}

impl IncidentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "investigating" => IncidentStatus::Investigating,
            "identified" => IncidentStatus::Identified,
            "monitoring" => IncidentStatus::Monitoring,
            "resolved" => IncidentStatus::Resolved,
            _ => IncidentStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceStatus {
    #[serde(rename = "NOTSTARTEDYET")]
    NotStartedYet,
    #[serde(rename = "INPROGRESS")]
    InProgress,
    Completed,
    Unknown,
}

impl MaintenanceStatus {
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();
        match key.as_str() {
            "NOTSTARTEDYET" => MaintenanceStatus::NotStartedYet,
            "INPROGRESS" => MaintenanceStatus::InProgress,
            "COMPLETED" => MaintenanceStatus::Completed,
            _ => MaintenanceStatus::Unknown,
        }
    }
}

/// A validated component record as read from upstream, before tree building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub group_id: Option<String>,
    pub is_collapsed: Option<bool>,
}

/// Component id/name pair attached to incidents and maintenances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedComponent {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedUpdate {
    pub id: String,
    /// Kept as received; incidents and maintenances use different vocabularies.
    pub status: String,
    pub body: String,
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub name: String,
    pub status: IncidentStatus,
    /// Raw upstream status, used for case-insensitive filtering.
    pub status_raw: String,
    pub created: Option<String>,
    pub resolved: Option<String>,
    pub updates: Vec<FeedUpdate>,
    pub components: Vec<AffectedComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maintenance {
    pub id: String,
    pub name: String,
    pub status: MaintenanceStatus,
    pub start: Option<String>,
    pub end: Option<String>,
    pub updates: Vec<FeedUpdate>,
    pub components: Vec<AffectedComponent>,
}
