use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// A purchasable group or channel.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CatalogGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema)]
pub struct Catalog {
    groups: Vec<CatalogGroup>,
}

impl Catalog {
    pub fn new(groups: Vec<CatalogGroup>) -> Self {
        Catalog { groups }
    }

    /// Parses the `GROUP_IDS_JSON` formats: `{id: name}`, a list of objects,
    /// or a list of bare ids. Anything unreadable yields an empty catalog.
    pub fn from_json_str(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Catalog::default();
        }
        let value = serde_json::from_str::<Value>(trimmed)
            .or_else(|_| serde_json::from_str::<Value>(&trimmed.replace('\'', "\"")));
        match value {
            Ok(value) => Catalog::from_value(&value),
            Err(e) => {
                tracing::warn!(error = %e, "GROUP_IDS_JSON is not valid JSON, catalog is empty");
                Catalog::default()
            }
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let mut groups = Vec::new();
        match value {
            Value::Object(map) => {
                for (id, name) in map {
                    groups.push(CatalogGroup {
                        id: id.clone(),
                        name: scalar_to_string(name),
                        initial: None,
                    });
                }
            }
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(obj) => {
                            let id = first_field(obj, &["id", "group_id", "value"]);
                            let name = first_field(obj, &["name", "label", "text"]);
                            let initial = first_field(obj, &["initial"]);
                            if !id.is_empty() && !name.is_empty() {
                                groups.push(CatalogGroup {
                                    id,
                                    name,
                                    initial: (!initial.is_empty()).then_some(initial),
                                });
                            }
                        }
                        other => {
                            let id = scalar_to_string(other);
                            if !id.is_empty() {
                                groups.push(CatalogGroup {
                                    name: id.clone(),
                                    id,
                                    initial: None,
                                });
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        Catalog { groups }
    }

    pub fn groups(&self) -> &[CatalogGroup] {
        &self.groups
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.groups.iter().any(|g| g.id == group_id)
    }

    pub fn get(&self, group_id: &str) -> Option<&CatalogGroup> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// Display name for a group, falling back to its id.
    pub fn display_name<'a>(&'a self, group_id: &'a str) -> &'a str {
        self.get(group_id).map(|g| g.name.as_str()).unwrap_or(group_id)
    }
}

fn first_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .map(scalar_to_string)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
