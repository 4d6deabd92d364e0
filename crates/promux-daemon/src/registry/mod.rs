//! Name -> handler registry with reload diffing.

pub mod handler;
pub mod summary;

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{info, warn};

use promux_core::error::{PromuxError, Result};
use promux_core::protocol::spec::MetricSpec;
use promux_core::protocol::update::MetricUpdate;

pub use handler::MetricHandler;

/// What `register` did with a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new handler was created.
    Created,
    /// The fingerprint changed; the old collector was replaced.
    Replaced,
    /// Identical fingerprint; nothing to do.
    Unchanged,
}

/// Per-item tallies for one reload pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    pub registered: usize,
    pub unregistered: usize,
    pub failed: usize,
}

/// Owns the name -> handler map and its hook-up to the exposition surface.
///
/// Every operation takes the single internal lock. Reload and live dispatch
/// are additionally alternated by the engine, so handler identity never
/// changes mid-dispatch.
pub struct MetricRegistry {
    exposition: prometheus::Registry,
    handlers: Mutex<HashMap<String, MetricHandler>>,
}

impl MetricRegistry {
    pub fn new(exposition: prometheus::Registry) -> Self {
        Self {
            exposition,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the currently registered metric names.
    pub fn names(&self) -> Vec<String> {
        self.handlers.lock().keys().cloned().collect()
    }

    /// Register one spec.
    ///
    /// An existing handler with an identical fingerprint is a no-op. A
    /// changed fingerprint unregisters the old collector before the
    /// replacement is built and validated: if the new definition turns out
    /// to be invalid, the name stays absent until the next reload rather
    /// than rolling back.
    pub fn register(&self, spec: MetricSpec) -> Result<RegisterOutcome> {
        spec.validate_name()?;

        let mut handlers = self.handlers.lock();

        let mut outcome = RegisterOutcome::Created;
        if let Some(existing) = handlers.get(&spec.name) {
            if existing.spec().fingerprint() == spec.fingerprint() {
                return Ok(RegisterOutcome::Unchanged);
            }
            self.exposition
                .unregister(existing.collector())
                .map_err(|e| {
                    PromuxError::Registration(format!("re-register '{}': {e}", spec.name))
                })?;
            handlers.remove(&spec.name);
            outcome = RegisterOutcome::Replaced;
        }

        let handler = MetricHandler::build(spec)?;
        self.exposition
            .register(handler.collector())
            .map_err(|e| PromuxError::Registration(e.to_string()))?;
        handlers.insert(handler.spec().name.clone(), handler);
        Ok(outcome)
    }

    /// Unregister by name. If the exposition surface refuses, the handler
    /// stays in the map so the next reload can retry.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut handlers = self.handlers.lock();
        let handler = handlers.get(name).ok_or_else(|| {
            PromuxError::Lookup(format!("unregister: metric '{name}' does not exist"))
        })?;
        self.exposition
            .unregister(handler.collector())
            .map_err(|e| PromuxError::Registration(format!("unregister '{name}': {e}")))?;
        handlers.remove(name);
        Ok(())
    }

    /// Apply a full definition list: register every incoming spec, then
    /// unregister every previously-known name absent from the successfully
    /// processed set. Items that errored are excluded from that set, so
    /// their previous handler (if any) survives and keeps serving the old
    /// definition. Each item's outcome is reported individually; one bad
    /// spec never blocks the rest.
    pub fn reload(&self, specs: Vec<MetricSpec>) -> ReloadSummary {
        let previous = self.names();
        let mut survivors: HashSet<String> = HashSet::with_capacity(specs.len());
        let mut summary = ReloadSummary::default();

        for spec in specs {
            let name = spec.name.clone();
            match self.register(spec) {
                Ok(outcome) => {
                    info!(metric = %name, ?outcome, "registered");
                    survivors.insert(name);
                    summary.registered += 1;
                }
                Err(err) => {
                    warn!(metric = %name, %err, "register failed");
                    summary.failed += 1;
                }
            }
        }

        for name in previous {
            if survivors.contains(&name) {
                continue;
            }
            match self.unregister(&name) {
                Ok(()) => {
                    info!(metric = %name, "unregistered");
                    summary.unregistered += 1;
                }
                Err(err) => {
                    warn!(metric = %name, %err, "unregister failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Dispatch one update to its handler. An unknown name is an error and
    /// the update is dropped.
    pub fn handle(&self, update: &MetricUpdate) -> Result<()> {
        let handlers = self.handlers.lock();
        let handler = handlers.get(&update.name).ok_or_else(|| {
            PromuxError::Lookup(format!("metric '{}' does not exist", update.name))
        })?;
        handler.apply(update)
    }
}
