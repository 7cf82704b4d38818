//! Pool orchestration.
//!
//! # Responsibilities
//! - Build pools from configuration and register them with the host proxy
//! - Run the periodic health-check loop over every non-disabled backend
//! - Drive health transitions through the hysteresis thresholds
//! - Administer enable/disable and stats snapshots
//! - Flush history on each sweep and on shutdown
//!
//! # Design Decisions
//! - One ticker task per process; backends are probed sequentially
//! - Each sweep runs in its own task so a panic cannot kill the loop
//! - Disable/enable only toggle a flag; existing connections are kept

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{BalancerConfig, ServerConfig};
use crate::history::HistoryManager;
use crate::load_balancer::backend::{Backend, BackendStats};
use crate::load_balancer::server::LogicalServer;
use crate::load_balancer::strategy_for;
use crate::observability::metrics;
use crate::protocol;
use crate::proxy::{HostProxy, ProxyServer, RegisterError};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Owns every logical server, the history store and the health-check loop.
pub struct LoadBalancer {
    cfg: BalancerConfig,
    servers: RwLock<BTreeMap<String, Arc<LogicalServer>>>,
    history: Arc<HistoryManager>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LoadBalancer {
    pub fn new(cfg: BalancerConfig, history: HistoryManager) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            cfg,
            servers: RwLock::new(BTreeMap::new()),
            history: Arc::new(history),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Register every configured pool with the host and start the
    /// health-check loop. A no-op when the master switch is off; a pool
    /// that fails to register is logged and skipped.
    pub fn start(self: &Arc<Self>, host: &dyn HostProxy) {
        if !self.cfg.load_balancer.enabled {
            tracing::info!("Load balancer disabled");
            return;
        }

        for (name, server_cfg) in &self.cfg.servers {
            match self.register_server(host, name, server_cfg) {
                Ok(server) => tracing::info!(
                    server = %name,
                    backends = server.backends().len(),
                    strategy = server.strategy().name(),
                    "Registered load balanced server"
                ),
                Err(err) => tracing::error!(
                    server = %name,
                    error = %err,
                    "Failed to register load balanced server"
                ),
            }
        }

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.health_check_loop().await });
        self.tasks.lock().unwrap().push(handle);

        tracing::info!(
            servers = self.servers.read().unwrap().len(),
            "Load balancer started"
        );
    }

    fn register_server(
        &self,
        host: &dyn HostProxy,
        name: &str,
        cfg: &ServerConfig,
    ) -> Result<Arc<LogicalServer>, RegisterError> {
        let window_size = self.cfg.health_check.window_size;
        let backends: Vec<Arc<Backend>> = cfg
            .backends
            .iter()
            .filter(|backend| {
                if backend.addr.is_empty() {
                    tracing::warn!(server = %name, "Skipping backend with empty address");
                    false
                } else {
                    true
                }
            })
            .map(|backend| {
                Arc::new(Backend::new(
                    backend.addr.clone(),
                    backend.max_connections,
                    window_size,
                ))
            })
            .collect();

        let dial_timeout = match self.cfg.health_check.dial_timeout_seconds {
            0 => DEFAULT_DIAL_TIMEOUT,
            secs => Duration::from_secs(secs),
        };

        let server = Arc::new(LogicalServer::new(
            name.to_string(),
            backends,
            strategy_for(&cfg.strategy),
            self.cfg.health_check.jitter_threshold,
            dial_timeout,
            Arc::clone(&self.history),
        ));

        // Replace whatever the host had configured under this name.
        if host.unregister(name) {
            tracing::info!(server = %name, "Unregistered existing server for load balancing");
        }
        host.register(Arc::clone(&server) as Arc<dyn ProxyServer>)?;

        self.servers
            .write()
            .unwrap()
            .insert(name.to_string(), Arc::clone(&server));
        Ok(server)
    }

    async fn health_check_loop(self: Arc<Self>) {
        let interval = match self.cfg.health_check.interval_seconds {
            0 => DEFAULT_INTERVAL,
            secs => Duration::from_secs(secs),
        };
        // First sweep after one full interval, like a wall-clock ticker.
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tracing::info!(interval_secs = interval.as_secs(), "Health check loop started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    // The sweep runs in its own task so that a panic in it
                    // is contained and the loop keeps ticking.
                    let manager = Arc::clone(&self);
                    let sweep = tokio::spawn(async move { manager.run_health_sweep().await });
                    if let Err(err) = sweep.await {
                        if err.is_panic() {
                            tracing::error!(error = %err, "Health check sweep panicked, loop continues");
                        }
                    }

                    let history = Arc::clone(&self.history);
                    match tokio::task::spawn_blocking(move || history.flush()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => tracing::warn!(
                            error = %err,
                            "Failed to persist history, will retry on next sweep"
                        ),
                        Err(_) => {}
                    }
                }
            }
        }

        tracing::debug!("Health check loop stopped");
    }

    /// Probe every non-disabled backend of every pool once and apply the
    /// hysteresis transitions. The internal loop calls this each tick; it
    /// is public for hosts that drive checks from their own scheduler.
    pub async fn run_health_sweep(&self) {
        let servers: Vec<Arc<LogicalServer>> =
            self.servers.read().unwrap().values().cloned().collect();
        let timeout = match self.cfg.health_check.dial_timeout_seconds {
            0 => DEFAULT_PROBE_TIMEOUT,
            secs => Duration::from_secs(secs),
        };

        for server in servers {
            for backend in server.backends() {
                if backend.is_disabled() {
                    continue;
                }

                let result = protocol::probe(backend.addr(), timeout).await;
                backend.set_last_check(SystemTime::now());

                match result {
                    Err(err) => {
                        backend.record_check_failure();
                        let unhealthy_after = self.cfg.health_check.unhealthy_after_failures;
                        if backend.fail_count() >= unhealthy_after && backend.is_healthy() {
                            backend.set_healthy(false);
                            metrics::record_backend_health(server.name(), backend.addr(), false);
                            tracing::info!(
                                server = %server.name(),
                                backend = %backend.addr(),
                                fail_count = backend.fail_count(),
                                error = %err,
                                "Backend marked unhealthy"
                            );
                        } else {
                            tracing::debug!(
                                backend = %backend.addr(),
                                error = %err,
                                "Health check failed"
                            );
                        }
                    }
                    Ok(latency) => {
                        backend.record_latency(latency);
                        let jitter = backend.jitter();
                        self.history
                            .record(backend.addr(), latency.as_millis() as f64, jitter);
                        metrics::record_probe(server.name(), backend.addr(), latency);

                        let was_unhealthy = !backend.is_healthy();
                        backend.record_check_success();
                        if was_unhealthy {
                            if backend.success_count()
                                >= self.cfg.health_check.healthy_after_successes
                            {
                                backend.set_healthy(true);
                                backend.reset_trust();
                                backend.reset_success_count();
                                metrics::record_backend_health(server.name(), backend.addr(), true);
                                tracing::info!(
                                    server = %server.name(),
                                    backend = %backend.addr(),
                                    latency_ms = latency.as_millis() as u64,
                                    trust = backend.trust(),
                                    "Backend recovered"
                                );
                            }
                        } else {
                            backend.increase_trust();
                        }
                    }
                }
            }
        }
    }

    pub fn server(&self, name: &str) -> Option<Arc<LogicalServer>> {
        self.servers.read().unwrap().get(name).cloned()
    }

    /// Every registered server, ordered by name.
    pub fn servers(&self) -> Vec<Arc<LogicalServer>> {
        self.servers.read().unwrap().values().cloned().collect()
    }

    /// Take a backend out of rotation. Existing connections are untouched.
    pub fn disable_backend(&self, server_name: &str, backend_addr: &str) -> bool {
        self.set_backend_disabled(server_name, backend_addr, true)
    }

    /// Put a backend back into rotation.
    pub fn enable_backend(&self, server_name: &str, backend_addr: &str) -> bool {
        self.set_backend_disabled(server_name, backend_addr, false)
    }

    fn set_backend_disabled(&self, server_name: &str, backend_addr: &str, disabled: bool) -> bool {
        let Some(server) = self.server(server_name) else {
            return false;
        };
        for backend in server.backends() {
            if backend.addr() == backend_addr {
                backend.set_disabled(disabled);
                tracing::info!(
                    server = %server_name,
                    backend = %backend_addr,
                    disabled,
                    "Backend administration"
                );
                return true;
            }
        }
        false
    }

    pub fn server_stats(&self, server_name: &str) -> Option<Vec<BackendStats>> {
        let server = self.server(server_name)?;
        Some(server.backends().iter().map(|b| b.stats()).collect())
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Stop the health-check loop and flush pending history.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down load balancer");
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        let history = Arc::clone(&self.history);
        match tokio::task::spawn_blocking(move || history.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "Failed to flush history on shutdown"),
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingHost {
        servers: Mutex<HashMap<String, Arc<dyn ProxyServer>>>,
    }

    impl HostProxy for RecordingHost {
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

    fn config_with_pool(name: &str, enabled: bool) -> BalancerConfig {
        let mut cfg = BalancerConfig::default();
        cfg.load_balancer.enabled = enabled;
        cfg.servers.insert(
            name.to_string(),
            ServerConfig {
                strategy: "health-score".into(),
                backends: vec![BackendConfig {
                    addr: "127.0.0.1:25566".into(),
                    max_connections: 10,
                }],
            },
        );
        cfg
    }

    #[tokio::test]
    async fn start_registers_pools_with_host() {
        let host = RecordingHost::default();
        let balancer = LoadBalancer::new(config_with_pool("lobby", true), HistoryManager::in_memory());

        balancer.start(&host);
        assert!(host.server("lobby").is_some());
        assert!(balancer.server("lobby").is_some());
        assert_eq!(balancer.servers().len(), 1);

        balancer.shutdown().await;
    }

    #[tokio::test]
    async fn disabled_switch_registers_nothing() {
        let host = RecordingHost::default();
        let balancer =
            LoadBalancer::new(config_with_pool("lobby", false), HistoryManager::in_memory());

        balancer.start(&host);
        assert!(host.server("lobby").is_none());
        assert!(balancer.servers().is_empty());
    }

    #[tokio::test]
    async fn registration_replaces_existing_host_server() {
        let host = RecordingHost::default();

        let first =
            LoadBalancer::new(config_with_pool("lobby", true), HistoryManager::in_memory());
        first.start(&host);
        first.shutdown().await;

        let second =
            LoadBalancer::new(config_with_pool("lobby", true), HistoryManager::in_memory());
        second.start(&host);
        assert!(host.server("lobby").is_some());

        second.shutdown().await;
    }

    #[tokio::test]
    async fn disable_enable_toggle_rotation_only() {
        let host = RecordingHost::default();
        let balancer = LoadBalancer::new(config_with_pool("lobby", true), HistoryManager::in_memory());
        balancer.start(&host);

        let server = balancer.server("lobby").unwrap();
        let backend = server.backends()[0].clone();
        backend.attach_player("alice");

        assert!(balancer.disable_backend("lobby", "127.0.0.1:25566"));
        assert!(backend.is_disabled());
        assert!(!backend.is_available());
        // The attached player is not dropped.
        assert_eq!(backend.current_conns(), 1);

        assert!(balancer.enable_backend("lobby", "127.0.0.1:25566"));
        assert!(backend.is_available());

        assert!(!balancer.disable_backend("lobby", "127.0.0.1:1"));
        assert!(!balancer.disable_backend("nope", "127.0.0.1:25566"));

        balancer.shutdown().await;
    }

    #[tokio::test]
    async fn stats_for_unknown_pool_is_none() {
        let balancer =
            LoadBalancer::new(config_with_pool("lobby", false), HistoryManager::in_memory());
        assert!(balancer.server_stats("lobby").is_none());
    }
}
