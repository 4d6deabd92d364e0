//! Shared daemon state constructed once at startup.
//!
//! No process-wide singletons: the exposition registry and telemetry are
//! owned here and threaded to the components that need them.

use std::sync::Arc;

use promux_core::error::Result;

use crate::config::DaemonConfig;
use crate::obs::Telemetry;
use crate::registry::MetricRegistry;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: DaemonConfig,
    exposition: prometheus::Registry,
    registry: Arc<MetricRegistry>,
    telemetry: Telemetry,
}

impl AppState {
    /// Build application state. Returns Result so main can handle errors
    /// gracefully.
    pub fn new(cfg: DaemonConfig) -> Result<Self> {
        let exposition = prometheus::Registry::new();
        let telemetry = Telemetry::register(&exposition)?;
        let registry = Arc::new(MetricRegistry::new(exposition.clone()));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                exposition,
                registry,
                telemetry,
            }),
        })
    }

    pub fn cfg(&self) -> &DaemonConfig {
        &self.inner.cfg
    }

    pub fn exposition(&self) -> &prometheus::Registry {
        &self.inner.exposition
    }

    pub fn registry(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn telemetry(&self) -> Telemetry {
        self.inner.telemetry.clone()
    }
}
