//! Grain keys — the composite dimension map that identifies one measurement.
//!
//! Every stored measurement must be tenant-scoped: `org_id` is a required,
//! non-empty string dimension. Other dimensions (`entity_id`, time buckets,
//! payer, service line, …) are free-form and matched by equality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CanonError;

pub const ORG_ID: &str = "org_id";
pub const ENTITY_ID: &str = "entity_id";

/// One dimension descriptor in a metric version's grain specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrainDimension {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GrainDimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Dimension name → value map stored as JSONB.
///
/// BTreeMap keeps key order deterministic across serialization round-trips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrainKeys(pub BTreeMap<String, Value>);

impl GrainKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimal tenant-scoped grain.
    pub fn for_org(org_id: impl Into<String>) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(ORG_ID.to_string(), Value::String(org_id.into()));
        Self(keys)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn org_id(&self) -> Option<&str> {
        self.0.get(ORG_ID).and_then(Value::as_str)
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.0.get(ENTITY_ID).and_then(Value::as_str)
    }

    /// Write-time invariant: `org_id` present as a non-empty string.
    /// Absence is a validation failure, never a default-filled value.
    pub fn validate(&self) -> Result<(), CanonError> {
        match self.org_id() {
            Some(org) if !org.is_empty() => Ok(()),
            Some(_) => Err(CanonError::Validation(
                "grain_keys.org_id must be a non-empty string".into(),
            )),
            None => Err(CanonError::Validation(
                "grain_keys.org_id is required (string)".into(),
            )),
        }
    }

    /// Subset match: every filter entry must equal the stored entry.
    /// Extra stored dimensions not named by the filter are ignored.
    pub fn matches(&self, filter: &BTreeMap<String, Value>) -> bool {
        filter.iter().all(|(k, v)| self.0.get(k) == Some(v))
    }
}

impl From<BTreeMap<String, Value>> for GrainKeys {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_requires_org_id() {
        let grain = GrainKeys::new().with("entity_id", "E1");
        let err = grain.validate().unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn validate_rejects_empty_org_id() {
        let grain = GrainKeys::for_org("");
        assert!(grain.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_string_org_id() {
        let grain = GrainKeys::new().with(ORG_ID, 42);
        assert!(grain.validate().is_err());
    }

    #[test]
    fn validate_accepts_org_scoped_grain() {
        let grain = GrainKeys::for_org("HC001").with("entity_id", "E1");
        assert!(grain.validate().is_ok());
        assert_eq!(grain.org_id(), Some("HC001"));
        assert_eq!(grain.entity_id(), Some("E1"));
    }

    #[test]
    fn matches_is_equality_on_every_filter_key() {
        let grain = GrainKeys::for_org("A")
            .with("entity_id", "B")
            .with("month", "2026-07");

        let mut filter = BTreeMap::new();
        filter.insert(ORG_ID.to_string(), json!("A"));
        filter.insert(ENTITY_ID.to_string(), json!("B"));
        assert!(grain.matches(&filter));

        filter.insert(ENTITY_ID.to_string(), json!("C"));
        assert!(!grain.matches(&filter));
    }

    #[test]
    fn matches_ignores_extra_stored_dimensions() {
        let grain = GrainKeys::for_org("A").with("payer", "medicare");
        let mut filter = BTreeMap::new();
        filter.insert(ORG_ID.to_string(), json!("A"));
        assert!(grain.matches(&filter));
    }

    #[test]
    fn serde_is_transparent_object() {
        let grain = GrainKeys::for_org("HC001").with("month", "2026-07");
        let value = serde_json::to_value(&grain).unwrap();
        assert_eq!(value, json!({"month": "2026-07", "org_id": "HC001"}));
        let back: GrainKeys = serde_json::from_value(value).unwrap();
        assert_eq!(back, grain);
    }
}
