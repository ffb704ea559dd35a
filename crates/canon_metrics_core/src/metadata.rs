//! Result-metadata validation against a version's `metadata_schema`.
//!
//! The source system stored a schema per metric version but enforcement was
//! never observable, so enforcement is a configurable policy here: `Advisory`
//! (log and proceed) is the default, `Strict` turns the same checks into
//! write-rejecting validation errors.

use serde_json::Value;

use crate::error::CanonError;
use crate::types::CanonicalMetricVersion;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataPolicy {
    /// Schema or required-field violation rejects the write.
    Strict,
    /// Violations are logged at `warn`; the write proceeds.
    #[default]
    Advisory,
    /// No checking at all.
    Off,
}

/// Check `result_metadata` against the version's schema and required fields.
///
/// Returns the violations found; empty means conformant. Callers should not
/// use this directly — go through [`enforce`].
pub fn violations(version: &CanonicalMetricVersion, metadata: Option<&Value>) -> Vec<String> {
    let mut found = Vec::new();

    for field in &version.required_metadata_fields {
        let present = metadata
            .and_then(|m| m.as_object())
            .map(|obj| obj.contains_key(field))
            .unwrap_or(false);
        if !present {
            found.push(format!("required metadata field '{field}' is missing"));
        }
    }

    if let (Some(schema), Some(instance)) = (&version.metadata_schema, metadata) {
        match jsonschema::validator_for(schema) {
            Ok(validator) => {
                for err in validator.iter_errors(instance) {
                    found.push(format!("metadata schema violation: {err}"));
                }
            }
            Err(e) => {
                found.push(format!("metadata_schema does not compile: {e}"));
            }
        }
    }

    found
}

/// Apply the policy: `Strict` fails on the first violation, `Advisory` logs
/// each and proceeds, `Off` skips the check entirely.
pub fn enforce(
    policy: MetadataPolicy,
    version: &CanonicalMetricVersion,
    metadata: Option<&Value>,
) -> Result<(), CanonError> {
    if policy == MetadataPolicy::Off {
        return Ok(());
    }
    let found = violations(version, metadata);
    if found.is_empty() {
        return Ok(());
    }
    match policy {
        MetadataPolicy::Strict => Err(CanonError::Validation(format!(
            "result_metadata rejected for version '{}': {}",
            version.metric_version_key,
            found.join("; ")
        ))),
        MetadataPolicy::Advisory => {
            for violation in &found {
                tracing::warn!(
                    metric_version_key = %version.metric_version_key,
                    %violation,
                    "advisory metadata check failed"
                );
            }
            Ok(())
        }
        MetadataPolicy::Off => unreachable!(),
    }
}
