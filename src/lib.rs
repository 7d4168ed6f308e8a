//! Controllable CPU load generation.
//!
//! A pool of worker threads duty-cycles between a computation kernel and
//! idle sleep to hold a per-thread target load, with runtime-adjustable
//! targets, a swappable kernel, and safe pool resizing under load. The REST
//! API, CPU telemetry, and MQTT bridge are thin glue over the
//! [`LoadController`] contract.

pub mod controller;
pub mod error;
pub mod kernels;
pub mod metrics;
pub mod mqtt;
pub mod server;
mod worker;

pub use controller::LoadController;
pub use error::LoadError;
pub use kernels::ComputeKernel;
