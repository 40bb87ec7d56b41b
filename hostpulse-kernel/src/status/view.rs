//! Serializable rendering of a snapshot, as served on `GET /status`.

use crate::catalog::OTHER_SERVICES;
use crate::models::Status;
use crate::status::expansion::ExpansionState;
use crate::status::tree::{ComponentTree, NodeId};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub id: String,
    pub name: String,
    pub status: Status,
    /// 0 (unknown) to 5 (major outage), for clients sorting by badness.
    pub severity: u8,
    pub label: &'static str,
    pub tone: &'static str,
    pub group: bool,
    pub expanded: bool,
    pub children: Vec<NodeView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtherServices {
    pub title: &'static str,
    pub components: Vec<NodeView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub overall: Status,
    pub overall_label: &'static str,
    pub counts: BTreeMap<Status, usize>,
    pub groups: Vec<NodeView>,
    pub other_services: OtherServices,
    pub fallback: bool,
    pub refreshed_at: Option<String>,
}

pub fn render_node(tree: &ComponentTree, expansion: &ExpansionState, node: NodeId) -> NodeView {
    let n = tree.node(node);
    let status = tree.effective_status(node);
    NodeView {
        id: n.id.clone(),
        name: n.name.clone(),
        status,
        severity: status.severity(),
        label: status.label(),
        tone: status.tone(),
        group: n.is_group(),
        expanded: n.is_group() && expansion.is_expanded(tree, node),
        children: n
            .children
            .iter()
            .map(|child| render_node(tree, expansion, *child))
            .collect(),
    }
}

pub fn render(tree: &ComponentTree, expansion: &ExpansionState) -> StatusView {
    let overall = tree.overall_status();
    StatusView {
        overall,
        overall_label: overall.label(),
        counts: tree.status_counts(),
        groups: tree.roots.iter().map(|r| render_node(tree, expansion, *r)).collect(),
        other_services: OtherServices {
            title: OTHER_SERVICES,
            components: tree
                .ungrouped
                .iter()
                .map(|u| render_node(tree, expansion, *u))
                .collect(),
        },
        fallback: false,
        refreshed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_groups_and_other_services() {
        let mut tree = ComponentTree::new();
        let a = tree.insert("A", "A", Status::Operational, None);
        let b = tree.insert("B", "B", Status::DegradedPerformance, None);
        let dns = tree.insert("dns", "DNS", Status::parse("FOO"), None);
        tree.attach(a, b);
        tree.roots.push(a);
        tree.ungrouped.push(dns);

        let view = render(&tree, &ExpansionState::new());
        assert_eq!(view.groups[0].status, Status::DegradedPerformance);
        assert!(view.groups[0].expanded);
        assert!(!view.groups[0].children[0].group);
        assert_eq!(view.other_services.title, "Other Services");
        assert_eq!(view.other_services.components[0].tone, "neutral");
        assert_eq!(view.overall, Status::DegradedPerformance);
    }

    #[test]
    fn serializes_status_keys() {
        let mut tree = ComponentTree::new();
        let l = tree.insert("l", "L", Status::MajorOutage, None);
        tree.ungrouped.push(l);
        let json = serde_json::to_value(render(&tree, &ExpansionState::new())).unwrap();
        assert_eq!(json["overall"], "MAJOR_OUTAGE");
        assert_eq!(json["counts"]["MAJOR_OUTAGE"], 1);
        assert_eq!(json["other_services"]["components"][0]["severity"], 5);
    }
}
