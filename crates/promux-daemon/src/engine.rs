//! Run-loop / reload state machine.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use promux_core::protocol::spec::parse_specs;
use promux_core::protocol::update::MetricUpdate;

use crate::obs::Telemetry;
use crate::registry::MetricRegistry;

/// Control messages racing the update stream in the processing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Leave the processing phase, re-read the definitions, re-enter.
    Reload,
    /// Leave the processing phase and shut the engine down.
    Shutdown,
}

/// Alternates between two phases: reloading (apply the definition file to
/// the registry) and processing (drain the update channel until a control
/// message wins the select race). Reload never overlaps live dispatch, so
/// handler identity is stable for the whole lifetime of an update.
pub struct Engine {
    registry: Arc<MetricRegistry>,
    telemetry: Telemetry,
    specs_path: String,
    update_rx: mpsc::Receiver<MetricUpdate>,
    control_rx: mpsc::Receiver<Control>,
}

impl Engine {
    pub fn new(
        registry: Arc<MetricRegistry>,
        telemetry: Telemetry,
        specs_path: String,
        update_rx: mpsc::Receiver<MetricUpdate>,
        control_rx: mpsc::Receiver<Control>,
    ) -> Self {
        Self {
            registry,
            telemetry,
            specs_path,
            update_rx,
            control_rx,
        }
    }

    pub async fn run(mut self) {
        loop {
            self.reload().await;
            match self.process().await {
                Control::Reload => continue,
                Control::Shutdown => {
                    info!("engine stopped");
                    return;
                }
            }
        }
    }

    /// Reloading phase: parse the definition file and diff it into the
    /// registry. A file or parse error keeps the current definitions.
    async fn reload(&self) {
        info!(path = %self.specs_path, "loading metric definitions");
        let bytes = match tokio::fs::read(&self.specs_path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %self.specs_path, %err, "definitions unreadable, keeping current set");
                return;
            }
        };
        let specs = match parse_specs(&bytes) {
            Ok(specs) => specs,
            Err(err) => {
                warn!(path = %self.specs_path, %err, "definitions invalid, keeping current set");
                return;
            }
        };
        let summary = self.registry.reload(specs);
        info!(
            registered = summary.registered,
            unregistered = summary.unregistered,
            failed = summary.failed,
            "definitions applied"
        );
    }

    /// Processing phase: sole consumer of the update channel until a
    /// control message arrives. Every processed update lands in the status
    /// counter; a bad update is dropped and never stops the loop.
    async fn process(&mut self) -> Control {
        loop {
            tokio::select! {
                ctrl = self.control_rx.recv() => {
                    return ctrl.unwrap_or(Control::Shutdown);
                }
                update = self.update_rx.recv() => {
                    let Some(update) = update else {
                        // every decoder dropped its sender
                        return Control::Shutdown;
                    };
                    match self.registry.handle(&update) {
                        Ok(()) => self.telemetry.ok(),
                        Err(err) => {
                            self.telemetry.error();
                            warn!(metric = %update.name, %err, "update dropped");
                        }
                    }
                }
            }
        }
    }
}
