/**
 * STATUS BOARD - the one place a snapshot changes
 *
 * ROLE:
 * Holds the current snapshot (tree + feeds), the expansion overrides and the
 * refresh tickets. HTTP handlers and the refresher only talk to the board,
 * always through `Shared<StatusBoard>` and never across an await.
 *
 * HOW IT WORKS:
 * - `begin_fetch` hands out increasing tickets before the network calls
 * - Components, incidents and maintenances each keep their own watermark: the
 *   ticket of the last successful fetch applied for that part
 * - A part is applied only when it succeeded and its ticket beats the
 *   watermark, so a failure never hides an older request's good data
 * - A failed components fetch keeps the last good tree. Before the first good
 *   fetch that is the configured fallback, all operational
 * - Expansion overrides are reconciled by id after each applied tree
 */

use crate::catalog::GroupCatalog;
use crate::events::{diff_snapshots, StatusChange};
use crate::models::{ComponentRecord, Incident, Maintenance};
use crate::status::expansion::ExpansionState;
use crate::status::feed::{filter_active, filter_upcoming};
use crate::status::normalize::normalize;
use crate::status::source::SourceError;
use crate::status::tree::ComponentTree;
use crate::status::view::{render, StatusView};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tree: ComponentTree,
    pub incidents: Vec<Incident>,
    pub maintenances: Vec<Maintenance>,
    /// True while the tree comes from the configured fallback list.
    pub fallback: bool,
    pub refreshed_at: Option<String>,
}

/// Results of the three upstream calls of one refresh.
#[derive(Debug)]
pub struct FetchOutcome {
    pub components: Result<Vec<ComponentRecord>, SourceError>,
    pub incidents: Result<Vec<Incident>, SourceError>,
    pub maintenances: Result<Vec<Maintenance>, SourceError>,
}

#[derive(Debug, PartialEq)]
pub enum ApplyResult {
    Applied { components_ok: bool, changes: Vec<StatusChange> },
    /// The components succeeded but a newer tree was already applied.
    Stale,
}

/// Ticket of the last successful fetch applied, per part.
#[derive(Debug, Default, Clone, Copy)]
struct Watermarks {
    components: u64,
    incidents: u64,
    maintenances: u64,
}

pub struct StatusBoard {
    catalog: GroupCatalog,
    snapshot: Snapshot,
    expansion: ExpansionState,
    issued: u64,
    applied: Watermarks,
}

impl StatusBoard {
    pub fn new(catalog: GroupCatalog, fallback: &[ComponentRecord]) -> Self {
        let tree = normalize(fallback, &catalog);
        Self {
            catalog,
            snapshot: Snapshot {
                tree,
                incidents: Vec::new(),
                maintenances: Vec::new(),
                fallback: true,
                refreshed_at: None,
            },
            expansion: ExpansionState::new(),
            issued: 0,
            applied: Watermarks::default(),
        }
    }

    pub fn begin_fetch(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    pub fn apply(&mut self, ticket: Ticket, outcome: FetchOutcome) -> ApplyResult {
        let mut changes = Vec::new();
        let mut stale = false;
        let components_ok = match outcome.components {
            Ok(_) if ticket.0 <= self.applied.components => {
                debug!("discarding components of refresh #{} (have #{})", ticket.0, self.applied.components);
                stale = true;
                false
            }
            Ok(records) => {
                self.applied.components = ticket.0;
                let tree = normalize(&records, &self.catalog);
                // Fallback statuses are made up, so transitions from them are not real.
                if !self.snapshot.fallback {
                    changes = diff_snapshots(&self.snapshot.tree, &tree);
                }
                self.snapshot.tree = tree;
                self.snapshot.fallback = false;
                self.snapshot.refreshed_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();
                self.expansion.reconcile(&self.snapshot.tree);
                info!("status refreshed: {} components, {} changed", self.snapshot.tree.len(), changes.len());
                true
            }
            Err(e) => {
                let kept = if self.snapshot.fallback { "fallback" } else { "last known" };
                warn!("components fetch failed: {}, keeping {} snapshot", e, kept);
                false
            }
        };

        match outcome.incidents {
            Ok(_) if ticket.0 <= self.applied.incidents => debug!("discarding incidents of refresh #{}", ticket.0),
            Ok(incidents) => {
                self.applied.incidents = ticket.0;
                self.snapshot.incidents = incidents;
            }
            Err(e) => warn!("incidents fetch failed: {}", e),
        }
        match outcome.maintenances {
            Ok(_) if ticket.0 <= self.applied.maintenances => {
                debug!("discarding maintenances of refresh #{}", ticket.0)
            }
            Ok(maintenances) => {
                self.applied.maintenances = ticket.0;
                self.snapshot.maintenances = maintenances;
            }
            Err(e) => warn!("maintenances fetch failed: {}", e),
        }

        if stale {
            ApplyResult::Stale
        } else {
            ApplyResult::Applied { components_ok, changes }
        }
    }

    pub fn view(&self) -> StatusView {
        let mut view = render(&self.snapshot.tree, &self.expansion);
        view.fallback = self.snapshot.fallback;
        view.refreshed_at = self.snapshot.refreshed_at.clone();
        view
    }

    /// Flips a group's expansion. `None` for unknown ids and leaves.
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let tree = &self.snapshot.tree;
        let node = tree.lookup(id)?;
        if !tree.node(node).is_group() {
            return None;
        }
        Some(self.expansion.toggle(tree, node))
    }

    pub fn incidents(&self, include_resolved: bool) -> Vec<Incident> {
        if include_resolved {
            self.snapshot.incidents.clone()
        } else {
            filter_active(&self.snapshot.incidents)
        }
    }

    pub fn maintenances(&self, include_completed: bool) -> Vec<Maintenance> {
        if include_completed {
            self.snapshot.maintenances.clone()
        } else {
            filter_upcoming(&self.snapshot.maintenances)
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn tree(&self) -> &ComponentTree {
        &self.snapshot.tree
    }
}
