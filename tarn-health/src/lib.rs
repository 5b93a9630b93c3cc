#![allow(clippy::missing_docs_in_private_items)]

//! Health Monitor (C1) and Adaptive Scaler (C2): a composite host/DB health
//! score and the pure function mapping it to a worker pool's target
//! concurrency.

pub mod monitor;
pub mod scaler;
pub mod source;

pub use monitor::{HealthMonitor, HealthSample, HealthSource, HealthZone, Normalized};
pub use scaler::AdaptiveScaler;
pub use source::SystemHealthSource;
