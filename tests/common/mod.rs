//! Shared utilities for integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};

use mc_balancer::config::{BackendConfig, BalancerConfig, ServerConfig};
use mc_balancer::protocol::varint::{encode_varint, read_packet, write_packet};
use mc_balancer::protocol::ProtocolError;
use mc_balancer::proxy::{HostProxy, ProxyServer, RegisterError};

/// Start a mock Minecraft server that answers status pings while the
/// returned flag is true and drops connections otherwise.
pub async fn start_mock_server() -> (SocketAddr, Arc<AtomicBool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let flag = flag.clone();
                    tokio::spawn(async move {
                        if !flag.load(Ordering::SeqCst) {
                            // Dropping the socket makes the probe fail with
                            // an io error while plain dials still connect.
                            return;
                        }
                        let _ = serve_status(&mut socket).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, healthy)
}

async fn serve_status(socket: &mut TcpStream) -> Result<(), ProtocolError> {
    let _handshake = read_packet(socket).await?;
    let _request = read_packet(socket).await?;

    let json = br#"{"version":{"name":"1.21","protocol":767},"players":{"max":20,"online":0}}"#;
    let mut body = Vec::new();
    encode_varint(&mut body, 0x00);
    encode_varint(&mut body, json.len() as i32);
    body.extend_from_slice(json);
    write_packet(socket, &body).await
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Balancer configuration with one pool over the given backends.
pub fn pool_config(
    pool: &str,
    strategy: &str,
    backends: &[(SocketAddr, u32)],
    unhealthy_after: u32,
    healthy_after: u32,
) -> BalancerConfig {
    let mut cfg = BalancerConfig::default();
    // Tests drive sweeps by hand; park the internal ticker out of the way.
    cfg.health_check.interval_seconds = 3600;
    cfg.health_check.unhealthy_after_failures = unhealthy_after;
    cfg.health_check.healthy_after_successes = healthy_after;
    cfg.health_check.dial_timeout_seconds = 2;
    cfg.servers.insert(
        pool.to_string(),
        ServerConfig {
            strategy: strategy.to_string(),
            backends: backends
                .iter()
                .map(|(addr, max_connections)| BackendConfig {
                    addr: addr.to_string(),
                    max_connections: *max_connections,
                })
                .collect(),
        },
    );
    cfg
}

/// In-memory host proxy standing in for the real one.
#[derive(Default)]
pub struct TestHost {
    servers: Mutex<HashMap<String, Arc<dyn ProxyServer>>>,
}

impl HostProxy for TestHost {
    fn register(&self, server: Arc<dyn ProxyServer>) -> Result<(), RegisterError> {
        let mut servers = self.servers.lock().unwrap();
        let name = server.name().to_string();
        if servers.contains_key(&name) {
            return Err(RegisterError::DuplicateName(name));
        }
        servers.insert(name, server);
        Ok(())
    }

    fn unregister(&self, name: &str) -> bool {
        self.servers.lock().unwrap().remove(name).is_some()
    }

    fn server(&self, name: &str) -> Option<Arc<dyn ProxyServer>> {
        self.servers.lock().unwrap().get(name).cloned()
    }
}
