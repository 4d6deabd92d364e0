//! Top-level facade crate for promux.
//!
//! Re-exports the core model and the daemon library so users can depend on
//! a single crate.

pub mod core {
    pub use promux_core::*;
}

pub mod daemon {
    pub use promux_daemon::*;
}
