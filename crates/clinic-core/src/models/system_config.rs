//! Global key/value configuration, editable only by the super-administrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub key: String,
    pub value: String,
    /// `string`, `int`, `bool` or `json`.
    pub value_type: String,
    pub category: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertSystemConfig {
    pub value: String,
    #[serde(default = "default_value_type")]
    pub value_type: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub description: Option<String>,
}

fn default_value_type() -> String {
    "string".into()
}

fn default_category() -> String {
    "general".into()
}

pub const VALUE_TYPES: [&str; 4] = ["string", "int", "bool", "json"];

impl UpsertSystemConfig {
    /// Checks that `value` parses as `value_type`.
    pub fn value_matches_type(&self) -> bool {
        match self.value_type.as_str() {
            "string" => true,
            "int" => self.value.parse::<i64>().is_ok(),
            "bool" => self.value.parse::<bool>().is_ok(),
            "json" => serde_json::from_str::<serde_json::Value>(&self.value).is_ok(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(value: &str, value_type: &str) -> UpsertSystemConfig {
        UpsertSystemConfig {
            value: value.into(),
            value_type: value_type.into(),
            category: "general".into(),
            description: None,
        }
    }

    #[test]
    fn typed_values_are_checked() {
        assert!(upsert("42", "int").value_matches_type());
        assert!(!upsert("forty", "int").value_matches_type());
        assert!(upsert("true", "bool").value_matches_type());
        assert!(upsert("{\"a\":1}", "json").value_matches_type());
        assert!(!upsert("x", "float").value_matches_type());
    }
}
