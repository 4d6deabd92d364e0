//! Daemon config loader (strict parsing).

pub mod schema;

use std::fs;

use promux_core::error::{PromuxError, Result};

pub use schema::{DaemonConfig, DaemonSection, ExpositionSection};

pub fn load_from_file(path: &str) -> Result<DaemonConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PromuxError::Io(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<DaemonConfig> {
    let cfg: DaemonConfig =
        serde_yaml::from_str(s).map_err(|e| PromuxError::Parse(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
