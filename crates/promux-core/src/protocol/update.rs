//! Incoming metric update events.

use serde::Deserialize;

use crate::error::{PromuxError, Result};

/// One update event sent by a worker process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricUpdate {
    /// Target collector name.
    pub name: String,
    /// Ordered label values; must match the target's label count exactly.
    #[serde(default)]
    pub label_values: Vec<String>,
    /// Operation to apply; validated per family by the handler.
    pub method: String,
    /// Operand; semantics depend on `method`.
    #[serde(default)]
    pub value: f64,
}

/// Decode one connection payload: a JSON array of update events.
///
/// An invalid payload fails whole; no partial extraction.
pub fn parse_updates(bytes: &[u8]) -> Result<Vec<MetricUpdate>> {
    serde_json::from_slice(bytes)
        .map_err(|e| PromuxError::Parse(format!("invalid update payload: {e}")))
}
