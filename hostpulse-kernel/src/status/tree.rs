//! Arena-backed component forest and the status propagation engine.
//!
//! Nodes live in a flat `Vec` and reference their children by index, which
//! keeps traversal iterative and makes ancestor checks cheap when the
//! normalizer links nodes together.

use crate::models::Status;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub name: String,
    /// Own status from upstream. Ignored for groups when propagating.
    pub status: Status,
    pub is_collapsed: Option<bool>,
    /// Set for nodes other components point at, even before anything is attached.
    pub group: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn is_group(&self) -> bool {
        self.group || !self.children.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentTree {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
    /// Top-level groups, already in display order.
    pub roots: Vec<NodeId>,
    /// Leaves without a group ("Other Services").
    pub ungrouped: Vec<NodeId>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a detached node. Returns the existing node if `id` is already known.
    pub fn insert(&mut self, id: &str, name: &str, status: Status, is_collapsed: Option<bool>) -> NodeId {
        if let Some(existing) = self.index.get(id) {
            return *existing;
        }
        let node_id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id: id.to_string(),
            name: name.to_string(),
            status,
            is_collapsed,
            group: false,
            parent: None,
            children: Vec::new(),
        });
        self.index.insert(id.to_string(), node_id);
        node_id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn mark_group(&mut self, id: NodeId) {
        self.nodes[id.0].group = true;
    }

    pub fn lookup(&self, id: &str) -> Option<NodeId> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// True if `candidate` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == candidate {
                return true;
            }
            cursor = self.nodes[current.0].parent;
        }
        false
    }

    /// Links `child` under `parent`. Refuses links that would create a cycle
    /// or re-parent an attached node; returns whether the link was made.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.nodes[child.0].parent.is_some() || self.is_ancestor_or_self(child, parent) {
            return false;
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        true
    }

    /// Pre-order ids of `node` and every descendant, `node` first.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.nodes[current.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    pub fn leaves(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.subtree(node)
            .into_iter()
            .filter(move |n| !self.nodes[n.0].is_group())
    }

    /// Worst status among the leaves under `node`; a leaf's own status for a
    /// leaf. A subtree without leaves is `Operational`.
    pub fn effective_status(&self, node: NodeId) -> Status {
        if !self.nodes[node.0].is_group() {
            return self.nodes[node.0].status;
        }
        self.leaves(node)
            .map(|leaf| self.nodes[leaf.0].status)
            .max()
            .unwrap_or(Status::Operational)
    }

    /// Worst status over every leaf in the snapshot.
    pub fn overall_status(&self) -> Status {
        self.nodes
            .iter()
            .filter(|n| !n.is_group())
            .map(|n| n.status)
            .max()
            .unwrap_or(Status::Operational)
    }

    pub fn status_counts(&self) -> BTreeMap<Status, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.iter().filter(|n| !n.is_group()) {
            *counts.entry(node.status).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> (ComponentTree, NodeId) {
        let mut tree = ComponentTree::new();
        let a = tree.insert("A", "A", Status::Operational, None);
        let b = tree.insert("B", "B", Status::DegradedPerformance, None);
        let c = tree.insert("C", "C", Status::Operational, None);
        tree.attach(a, b);
        tree.attach(a, c);
        tree.roots.push(a);
        (tree, a)
    }

    #[test]
    fn group_takes_worst_child() {
        let (tree, a) = scenario();
        assert_eq!(tree.effective_status(a), Status::DegradedPerformance);
    }

    #[test]
    fn propagation_is_recursive() {
        let mut tree = ComponentTree::new();
        let top = tree.insert("top", "top", Status::Operational, None);
        let mid = tree.insert("mid", "mid", Status::Operational, None);
        let deep = tree.insert("deep", "deep", Status::Operational, None);
        let leaf = tree.insert("leaf", "leaf", Status::MajorOutage, None);
        let ok = tree.insert("ok", "ok", Status::Operational, None);
        tree.attach(top, mid);
        tree.attach(mid, deep);
        tree.attach(deep, leaf);
        tree.attach(top, ok);
        assert_eq!(tree.effective_status(top), Status::MajorOutage);
        assert_eq!(tree.effective_status(mid), Status::MajorOutage);
        assert_eq!(tree.effective_status(ok), Status::Operational);
    }

    #[test]
    fn group_own_status_is_ignored() {
        let mut tree = ComponentTree::new();
        let g = tree.insert("g", "g", Status::MajorOutage, None);
        let l = tree.insert("l", "l", Status::Operational, None);
        tree.attach(g, l);
        assert_eq!(tree.effective_status(g), Status::Operational);
    }

    #[test]
    fn group_dominates_every_child() {
        let mut tree = ComponentTree::new();
        let g = tree.insert("g", "g", Status::Operational, None);
        let sub = tree.insert("sub", "sub", Status::Operational, None);
        tree.attach(g, sub);
        for (i, status) in [Status::UnderMaintenance, Status::PartialOutage, Status::Unknown]
            .into_iter()
            .enumerate()
        {
            let leaf = tree.insert(&format!("l{i}"), "leaf", status, None);
            tree.attach(sub, leaf);
        }
        let direct = tree.insert("direct", "direct", Status::DegradedPerformance, None);
        tree.attach(g, direct);

        let group_status = tree.effective_status(g);
        for child in &tree.node(g).children {
            assert!(group_status >= tree.effective_status(*child));
        }
        assert_eq!(group_status, Status::PartialOutage);
    }

    #[test]
    fn empty_group_is_operational() {
        let mut tree = ComponentTree::new();
        let g = tree.insert("g", "g", Status::MajorOutage, None);
        tree.mark_group(g);
        assert_eq!(tree.effective_status(g), Status::Operational);
        assert_eq!(ComponentTree::new().overall_status(), Status::Operational);
    }

    #[test]
    fn only_unknown_leaves_stay_unknown() {
        let mut tree = ComponentTree::new();
        let g = tree.insert("g", "g", Status::Operational, None);
        let l = tree.insert("l", "l", Status::Unknown, None);
        tree.attach(g, l);
        assert_eq!(tree.effective_status(g), Status::Unknown);
    }

    #[test]
    fn attach_refuses_cycles() {
        let mut tree = ComponentTree::new();
        let a = tree.insert("a", "a", Status::Operational, None);
        let b = tree.insert("b", "b", Status::Operational, None);
        assert!(tree.attach(a, b));
        assert!(!tree.attach(b, a));
        assert!(!tree.attach(a, a));
        assert_eq!(tree.node(a).parent, None);
    }

    #[test]
    fn subtree_is_preorder() {
        let (tree, a) = scenario();
        let ids: Vec<&str> = tree.subtree(a).iter().map(|n| tree.node(*n).id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn overall_and_counts() {
        let (tree, _) = scenario();
        assert_eq!(tree.overall_status(), Status::DegradedPerformance);
        let counts = tree.status_counts();
        assert_eq!(counts.get(&Status::Operational), Some(&1));
        assert_eq!(counts.get(&Status::DegradedPerformance), Some(&1));
    }
}
