//! Health-aware load balancing for a Minecraft reverse proxy.
//!
//! This crate fronts a named logical server with a pool of backend endpoints.
//! On every player connection the host proxy asks the pool to dial, and a
//! pluggable strategy picks one backend from live measurements (latency
//! window, jitter, utilization, failure streaks) adjusted by a per-time-of-day
//! history. A background loop probes each backend with the Minecraft Server
//! List Ping and drives health transitions through hysteresis thresholds so a
//! flapping backend cannot thrash the pool.
//!
//! The crate does not implement the proxy itself. The host is modelled by the
//! [`proxy::HostProxy`] trait; at startup the [`LoadBalancer`] registers one
//! [`LogicalServer`] per configured pool with it, replacing any statically
//! configured server of the same name.
//!
//! Subsystems:
//! - `config` — TOML configuration (camelCase keys, degrade-don't-fail)
//! - `protocol` — Minecraft status probe (VarInt framing, hard deadline)
//! - `load_balancer` — windows, backend state, strategies, pools, orchestration
//! - `history` — per-15-minute-period EMA statistics, SQLite-backed
//! - `proxy` — interfaces to the host proxy
//! - `admin` — operator command surface
//! - `observability` — tracing setup and metrics helpers

pub mod admin;
pub mod config;
pub mod history;
pub mod load_balancer;
pub mod observability;
pub mod protocol;
pub mod proxy;

pub use config::BalancerConfig;
pub use history::HistoryManager;
pub use load_balancer::manager::LoadBalancer;
pub use load_balancer::server::LogicalServer;
