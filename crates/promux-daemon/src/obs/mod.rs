//! Daemon self-telemetry.
//!
//! One outcome counter, threaded explicitly to every pipeline stage instead
//! of living in a process-wide static. Every processed update and every
//! ingestion fault lands in exactly one of the two status series.

use prometheus::{CounterVec, Opts};

use promux_core::error::{PromuxError, Result};

#[derive(Clone)]
pub struct Telemetry {
    updates_total: CounterVec,
}

impl Telemetry {
    /// Build the status counter and register it with the exposition
    /// registry.
    pub fn register(exposition: &prometheus::Registry) -> Result<Self> {
        let updates_total = CounterVec::new(
            Opts::new(
                "promux_updates_total",
                "Total count of metric updates processed by status",
            ),
            &["status"],
        )
        .map_err(|e| PromuxError::Registration(e.to_string()))?;
        exposition
            .register(Box::new(updates_total.clone()))
            .map_err(|e| PromuxError::Registration(e.to_string()))?;
        Ok(Self { updates_total })
    }

    pub fn ok(&self) {
        self.updates_total.with_label_values(&["ok"]).inc();
    }

    pub fn error(&self) {
        self.updates_total.with_label_values(&["error"]).inc();
    }
}
