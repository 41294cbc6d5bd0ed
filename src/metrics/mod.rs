//! Metrics export.
//!
//! Per-domain expiry gauges are pushed to a Prometheus Push Gateway after a
//! run when `[prometheus] enabled = true`.
//!
//! # Submodules
//!
//! - `prom` - Prometheus metrics integration

pub mod prom;
