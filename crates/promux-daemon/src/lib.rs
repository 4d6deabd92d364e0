//! promux daemon library entry.
//!
//! This crate wires the config loader, ingestion pipeline, metric registry,
//! run-loop engine, and exposition surface into a cohesive daemon. It is
//! intended to be consumed by the binary (`main.rs`) and by integration
//! tests.

pub mod app_state;
pub mod config;
pub mod engine;
pub mod ingest;
pub mod obs;
pub mod registry;
pub mod router;
