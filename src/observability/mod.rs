//! Observability: tracing setup and metrics helpers.

pub mod logging;
pub mod metrics;
