/**
 * GROUP CATALOG - Static group tables injected at startup
 *
 * ROLE:
 * Holds the per-deployment knowledge the upstream status provider does not
 * give us: display names for group ids, which groups nest under which, the
 * display priority of top-level groups and the name-based cleanup rules.
 *
 * Loaded from the `catalog` section of hostpulse.yaml so the normalizer stays
 * testable with any table.
 */

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const UNKNOWN_GROUP: &str = "Unknown Group";
pub const OTHER_SERVICES: &str = "Other Services";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupCatalog {
    /// group id -> display name
    pub names: BTreeMap<String, String>,
    /// parent group id -> nested group ids, in display order
    pub children: BTreeMap<String, Vec<String>>,
    /// top-level display names, highest priority first
    pub priority: Vec<String>,
    /// applied in order, first match wins
    pub reassign: Vec<ReassignRule>,
}

/// Forces components whose name matches into `group`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassignRule {
    /// Case-insensitive substring of the component name.
    pub contains: Option<String>,
    /// Match a standalone `AS<digits>` token, e.g. "Transit AS13335".
    pub asn_tag: bool,
    pub group: String,
}

impl ReassignRule {
    pub fn matches(&self, name: &str) -> bool {
        let by_substring = self
            .contains
            .as_deref()
            .is_some_and(|needle| name.to_lowercase().contains(&needle.to_lowercase()));
        let by_asn = self.asn_tag
            && name
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(is_asn_token);
        by_substring || by_asn
    }
}

fn is_asn_token(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() > 2
        && bytes[..2].eq_ignore_ascii_case(b"as")
        && bytes[2..].iter().all(u8::is_ascii_digit)
}

impl GroupCatalog {
    pub fn display_name(&self, group_id: &str) -> String {
        self.names
            .get(group_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_GROUP.to_string())
    }

    /// child group id -> parent group id, derived from `children`.
    /// A group listed under several parents keeps the first one (map order).
    pub fn parent_map(&self) -> HashMap<&str, &str> {
        let mut parents = HashMap::new();
        for (parent, kids) in &self.children {
            for kid in kids {
                parents.entry(kid.as_str()).or_insert(parent.as_str());
            }
        }
        parents
    }

    /// 1-based rank of a top-level display name, `None` when unlisted.
    pub fn rank(&self, display_name: &str) -> Option<usize> {
        self.priority
            .iter()
            .position(|n| n == display_name)
            .map(|i| i + 1)
    }

    pub fn reassignment_for(&self, component_name: &str) -> Option<&str> {
        self.reassign
            .iter()
            .find(|rule| rule.matches(component_name))
            .map(|rule| rule.group.as_str())
    }

    /// Tables shipped with the default configuration.
    pub fn builtin() -> Self {
        let names = [
            ("grp-network", "Network"),
            ("grp-transit", "Transit Providers"),
            ("grp-web", "Web Hosting"),
            ("grp-vps", "VPS"),
            ("grp-dedicated", "Dedicated Servers"),
            ("grp-billing", "Billing & Support"),
        ]
        .into_iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect();

        let children = [("grp-network".to_string(), vec!["grp-transit".to_string()])]
            .into_iter()
            .collect();

        Self {
            names,
            children,
            priority: vec![
                "Network".into(),
                "Web Hosting".into(),
                "VPS".into(),
                "Dedicated Servers".into(),
                "Billing & Support".into(),
            ],
            reassign: vec![ReassignRule {
                asn_tag: true,
                group: "grp-transit".into(),
                ..Default::default()
            }],
        }
    }
}
