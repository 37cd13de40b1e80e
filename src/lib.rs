//! GPU fleet management and telemetry service.
//!
//! Discovers GPUs through a pluggable hardware backend ([`hw`]), samples
//! per-device metrics on independent per-metric-type threads and derives
//! rates/utilizations/stats from them ([`pipeline`]), evaluates health
//! thresholds over the latest snapshot ([`health`]), and exposes a
//! validate-dispatch-format command surface for reading and mutating
//! device configuration ([`control`]). [`service::Service`] is the single
//! value an embedder constructs at startup and threads through all of it.

pub mod control;
pub mod device;
pub mod error;
pub mod exit_code;
pub mod firmware;
pub mod health;
pub mod hw;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod service;
pub mod settings;

pub use error::{GpumondError, Result};
pub use service::Service;
