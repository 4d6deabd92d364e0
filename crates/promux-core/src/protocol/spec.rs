//! Declarative metric definitions.

use std::collections::BTreeMap;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{PromuxError, Result};

/// Collector family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricType {
    /// String representation, matching the wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
        }
    }
}

/// One collector definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSpec {
    /// Collector family.
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    /// Unique registry key; must match the identifier grammar.
    pub name: String,
    /// Free-text help string.
    pub help: String,
    /// Ordered label names; empty means a scalar collector.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Bucket thresholds (histogram only); empty falls back to the default
    /// ladder.
    #[serde(default)]
    pub buckets: Vec<f64>,
    /// Quantile-string to allowed-error mapping (summary only); empty falls
    /// back to the default set.
    #[serde(default)]
    pub objectives: BTreeMap<String, f64>,
}

impl MetricSpec {
    /// Content fingerprint over the semantic fields, excluding the name.
    ///
    /// Used to decide whether a re-submitted spec for an existing name is a
    /// no-op or a real reconfiguration.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.metric_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.help.as_bytes());
        hasher.update([0u8]);
        for label in &self.labels {
            hasher.update(label.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xff]);
        for bucket in &self.buckets {
            hasher.update(bucket.to_bits().to_le_bytes());
        }
        hasher.update([0xff]);
        for (quantile, error) in &self.objectives {
            hasher.update(quantile.as_bytes());
            hasher.update([0u8]);
            hasher.update(error.to_bits().to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Check `name` against the identifier grammar.
    pub fn validate_name(&self) -> Result<()> {
        validate_identifier(&self.name)
    }

    /// Check every label against the identifier grammar and reject
    /// duplicates within the spec.
    pub fn validate_labels(&self) -> Result<()> {
        for (idx, label) in self.labels.iter().enumerate() {
            validate_identifier(label)?;
            if self.labels[idx + 1..].contains(label) {
                return Err(PromuxError::Validation(format!(
                    "duplicate label '{label}' in metric '{}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Decode a JSON array of metric definitions.
///
/// A structurally invalid payload fails atomically; no partial list is
/// returned. Identifier grammar and objective keys are not checked here.
pub fn parse_specs(bytes: &[u8]) -> Result<Vec<MetricSpec>> {
    serde_json::from_slice(bytes)
        .map_err(|e| PromuxError::Parse(format!("invalid definition payload: {e}")))
}

// Grammar: lowercase letters, digits, underscore; must start with a letter.
fn validate_identifier(s: &str) -> Result<()> {
    let mut chars = s.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PromuxError::Validation(format!(
            "'{s}' is not a valid metric identifier"
        )))
    }
}
