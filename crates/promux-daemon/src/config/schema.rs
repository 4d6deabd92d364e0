use serde::Deserialize;

use promux_core::error::{PromuxError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    pub version: u32,

    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub exposition: ExpositionSection,
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PromuxError::Validation(
                "config version must be 1".into(),
            ));
        }
        self.daemon.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonSection {
    /// Unix socket to listen on for incoming metric updates.
    #[serde(default = "default_socket")]
    pub socket: String,

    /// Path to the JSON file holding the metric definitions; re-read on
    /// every reload.
    #[serde(default = "default_specs")]
    pub specs: String,

    /// Decoder pool size; 0 means available parallelism.
    #[serde(default)]
    pub decoders: usize,

    /// Per-connection read budget in milliseconds; 0 disables the timeout.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            specs: default_specs(),
            decoders: 0,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl DaemonSection {
    pub fn validate(&self) -> Result<()> {
        if self.socket.is_empty() {
            return Err(PromuxError::Validation(
                "daemon.socket must not be empty".into(),
            ));
        }
        if self.specs.is_empty() {
            return Err(PromuxError::Validation(
                "daemon.specs must not be empty".into(),
            ));
        }
        if self.decoders > 64 {
            return Err(PromuxError::Validation(
                "daemon.decoders must be at most 64".into(),
            ));
        }
        if self.read_timeout_ms > 600_000 {
            return Err(PromuxError::Validation(
                "daemon.read_timeout_ms must be at most 600000".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpositionSection {
    /// Address the scrape endpoint listens on.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ExpositionSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_socket() -> String {
    "/tmp/promux.sock".into()
}
fn default_specs() -> String {
    "promux-metrics.json".into()
}
fn default_read_timeout_ms() -> u64 {
    5000
}
fn default_listen() -> String {
    "0.0.0.0:9299".into()
}
