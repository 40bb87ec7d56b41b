//! Expand/collapse state of group nodes.
//!
//! Only user toggles are stored, keyed by component id; everything else is
//! derived from the tree. Reconciling after a refresh keeps toggles for ids
//! that still exist, so a periodic refresh never folds a group the user opened.

use crate::models::Status;
use crate::status::tree::{ComponentTree, NodeId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionState {
    overrides: HashMap<String, bool>,
}

/// Expanded when something below is not operational, or when upstream
/// explicitly marked the group as not collapsed.
pub fn default_expanded(tree: &ComponentTree, node: NodeId) -> bool {
    tree.effective_status(node) != Status::Operational || tree.node(node).is_collapsed == Some(false)
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self, tree: &ComponentTree, node: NodeId) -> bool {
        self.overrides
            .get(&tree.node(node).id)
            .copied()
            .unwrap_or_else(|| default_expanded(tree, node))
    }

    /// Flips one node and returns its new state. Other nodes are untouched.
    pub fn toggle(&mut self, tree: &ComponentTree, node: NodeId) -> bool {
        let expanded = !self.is_expanded(tree, node);
        self.overrides.insert(tree.node(node).id.clone(), expanded);
        expanded
    }

    /// Drops toggles for ids absent from `tree`.
    pub fn reconcile(&mut self, tree: &ComponentTree) {
        self.overrides.retain(|id, _| tree.contains_id(id));
    }

    pub fn overrides(&self) -> usize {
        self.overrides.len()
    }
}
