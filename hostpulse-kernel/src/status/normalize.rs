/**
 * COMPONENT TREE NORMALIZER
 *
 * ROLE:
 * Turns the flat, possibly duplicated record list coming out of the source
 * adapter into the display forest.
 *
 * HOW IT WORKS:
 * 1. Dedup by id, first occurrence wins
 * 2. Name-based reassignment rules from the catalog
 * 3. Group nodes for every referenced group id and its catalog ancestors
 * 4. Linking: nested groups (catalog order) first, then members (input order)
 * 5. Roots sorted by catalog priority, unlisted groups last
 */

use crate::catalog::GroupCatalog;
use crate::models::{ComponentRecord, Status};
use crate::status::tree::{ComponentTree, NodeId};
use std::collections::HashSet;
use tracing::{debug, warn};

pub fn normalize(records: &[ComponentRecord], catalog: &GroupCatalog) -> ComponentTree {
    let mut tree = ComponentTree::new();
    let mut seen = HashSet::new();
    let mut members: Vec<(NodeId, Option<String>)> = Vec::new();

    for record in records {
        if !seen.insert(record.id.as_str()) {
            debug!("dropping duplicate component {}", record.id);
            continue;
        }
        let group_id = catalog
            .reassignment_for(&record.name)
            .map(str::to_string)
            .or_else(|| record.group_id.clone())
            .filter(|g| !g.is_empty() && *g != record.id);
        let node = tree.insert(&record.id, &record.name, record.status, record.is_collapsed);
        members.push((node, group_id));
    }

    // Groups referenced by members, then their catalog ancestors.
    let parents = catalog.parent_map();
    let mut groups: Vec<String> = Vec::new();
    let mut known_groups: HashSet<String> = HashSet::new();
    for (_, group_id) in &members {
        let mut cursor = group_id.as_deref();
        while let Some(group) = cursor {
            if !known_groups.insert(group.to_string()) {
                break;
            }
            groups.push(group.to_string());
            cursor = parents.get(group).copied();
        }
    }

    for group in &groups {
        let display = catalog.display_name(group);
        let node = tree.insert(group, &display, Status::Operational, None);
        // A record reused as a group keeps its flags but shows the catalog name.
        tree.node_mut(node).name = display;
        tree.mark_group(node);
    }

    // Nested groups, in catalog order under each parent.
    for (parent, kids) in &catalog.children {
        let Some(parent_node) = tree.lookup(parent) else { continue };
        if !known_groups.contains(parent) {
            continue;
        }
        for kid in kids {
            let Some(kid_node) = tree.lookup(kid) else { continue };
            if !known_groups.contains(kid) {
                continue;
            }
            if !tree.attach(parent_node, kid_node) && tree.node(kid_node).parent != Some(parent_node) {
                warn!("group {} not nested under {}: would form a cycle or has a parent already", kid, parent);
            }
        }
    }

    for (node, group_id) in &members {
        let Some(group_id) = group_id else { continue };
        let Some(group_node) = tree.lookup(group_id) else { continue };
        if tree.node(*node).parent.is_some() {
            continue;
        }
        if !tree.attach(group_node, *node) {
            warn!(
                "component {} not attached to group {}: it is one of its ancestors",
                tree.node(*node).id,
                group_id
            );
        }
    }

    let mut roots = Vec::new();
    let mut ungrouped = Vec::new();
    for (node_id, node) in tree.iter() {
        if node.parent.is_some() {
            continue;
        }
        if node.is_group() {
            roots.push(node_id);
        } else {
            ungrouped.push(node_id);
        }
    }
    // Vec::sort_by_key is stable, so unlisted groups keep their first-seen order.
    roots.sort_by_key(|id| catalog.rank(&tree.node(*id).name).unwrap_or(usize::MAX));

    tree.roots = roots;
    tree.ungrouped = ungrouped;
    tree
}
