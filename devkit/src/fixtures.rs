/*!
Builders for upstream status provider payloads, in the provider's own
camelCase shape.
*/

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

pub struct ComponentFixture {
    fields: Map<String, Value>,
    children: Vec<Value>,
}

impl ComponentFixture {
    pub fn new(id: &str, name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("id".into(), json!(id));
        fields.insert("name".into(), json!(name));
        fields.insert("status".into(), json!("OPERATIONAL"));
        Self { fields, children: Vec::new() }
    }

    pub fn status(mut self, status: &str) -> Self {
        self.fields.insert("status".into(), json!(status));
        self
    }

    pub fn group(mut self, group_id: &str) -> Self {
        self.fields.insert("groupId".into(), json!(group_id));
        self
    }

    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.fields.insert("isCollapsed".into(), json!(collapsed));
        self
    }

    /// Nested child, as some providers send groups inline.
    pub fn child(mut self, child: ComponentFixture) -> Self {
        self.children.push(child.build());
        self
    }

    pub fn build(mut self) -> Value {
        if !self.children.is_empty() {
            self.fields.insert("children".into(), Value::Array(self.children));
        }
        Value::Object(self.fields)
    }
}

pub struct FeedFixture;

impl FeedFixture {
    pub fn incident(id: &str, name: &str, status: &str) -> Value {
        let created = Utc::now() - Duration::hours(1);
        json!({
            "id": id,
            "name": name,
            "status": status,
            "created": created.to_rfc3339(),
            "updates": [{
                "id": format!("{id}-u1"),
                "status": status,
                "body": format!("{name}: {status}"),
                "created": created.to_rfc3339(),
            }],
            "components": [],
        })
    }

    pub fn maintenance(id: &str, name: &str, status: &str) -> Value {
        let start = Utc::now() + Duration::days(1);
        json!({
            "id": id,
            "name": name,
            "status": status,
            "start": start.to_rfc3339(),
            "end": (start + Duration::hours(2)).to_rfc3339(),
            "updates": [],
            "components": [],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_defaults_and_nesting() {
        let value = ComponentFixture::new("net", "Network")
            .child(ComponentFixture::new("r1", "Router 1").status("MAJOR_OUTAGE"))
            .build();
        assert_eq!(value["status"], "OPERATIONAL");
        assert!(value.get("groupId").is_none());
        assert_eq!(value["children"][0]["status"], "MAJOR_OUTAGE");
    }

    #[test]
    fn feeds_carry_parseable_dates() {
        let m = FeedFixture::maintenance("m1", "Upgrade", "NOTSTARTEDYET");
        let start = m["start"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(start).is_ok());
        assert_eq!(FeedFixture::incident("i1", "Down", "investigating")["updates"][0]["id"], "i1-u1");
    }
}
