//! Interfaces to the host proxy.
//!
//! The crate does not implement a Minecraft proxy; it plugs pools into one.
//! These traits are the whole surface the core consumes: a way to register
//! logical servers and a view of the connecting player.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::load_balancer::server::{DialError, TrackedConn};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("server name already registered: {0}")]
    DuplicateName(String),

    #[error("host rejected registration: {0}")]
    Rejected(String),
}

/// A player connecting through the host proxy.
pub trait Player: Send + Sync {
    fn username(&self) -> &str;
}

/// Minimal [`Player`] carrying just a username, for hosts that resolve
/// players elsewhere.
#[derive(Debug, Clone)]
pub struct PlayerName(pub String);

impl Player for PlayerName {
    fn username(&self) -> &str {
        &self.0
    }
}

/// The surface a logical server presents to the host proxy.
#[async_trait]
pub trait ProxyServer: Send + Sync {
    fn name(&self) -> &str;

    /// Concrete address advertised to the host, for compatibility with
    /// hosts that expect every server to resolve to one endpoint.
    fn addr(&self) -> Option<SocketAddr>;

    /// Open a backend connection for `player`. Cancellation is the
    /// caller's: dropping the future abandons the dial.
    async fn dial(&self, player: &dyn Player) -> Result<TrackedConn, DialError>;
}

/// Registration surface the host proxy exposes to customization layers.
pub trait HostProxy: Send + Sync {
    /// Register a server under its name. Fails on duplicates; callers that
    /// want replacement semantics unregister first.
    fn register(&self, server: Arc<dyn ProxyServer>) -> Result<(), RegisterError>;

    /// Best-effort removal of a previously registered server. Returns
    /// whether one existed.
    fn unregister(&self, name: &str) -> bool;

    /// Look up a registered server by name.
    fn server(&self, name: &str) -> Option<Arc<dyn ProxyServer>>;
}
