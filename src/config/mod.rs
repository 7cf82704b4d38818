//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file → loader.rs (read + parse)
//!     → validation.rs (semantic checks, emitted as warnings)
//!     → schema.rs structs consumed by the load balancer
//! ```
//!
//! # Design Decisions
//! - Keys are camelCase on disk (`healthCheck.intervalSeconds`)
//! - Bad values degrade to defaults instead of failing startup
//! - Unknown strategy names fall back to health-score at pool build time

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{BackendConfig, BalancerConfig, HealthCheckConfig, ServerConfig};
