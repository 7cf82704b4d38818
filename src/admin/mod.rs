//! Operator command surface.
//!
//! The host proxy wires these commands into whatever front end it has
//! (chat commands, a management socket, a CLI). This module only parses
//! the grammar and renders text:
//!
//! ```text
//! list pools
//! describe pool <name>
//! disable pool <name> backend <addr>
//! enable pool <name> backend <addr>
//! ```

use thiserror::Error;

use crate::load_balancer::manager::LoadBalancer;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListPools,
    DescribePool { pool: String },
    DisableBackend { pool: String, backend: String },
    EnableBackend { pool: String, backend: String },
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        match tokens.as_slice() {
            ["list", "pools"] => Ok(Command::ListPools),
            ["describe", "pool", name] => Ok(Command::DescribePool {
                pool: (*name).to_string(),
            }),
            ["describe", ..] => Err(CommandError::Usage("describe pool <name>")),
            ["disable", "pool", name, "backend", addr] => Ok(Command::DisableBackend {
                pool: (*name).to_string(),
                backend: (*addr).to_string(),
            }),
            ["disable", ..] => Err(CommandError::Usage("disable pool <name> backend <addr>")),
            ["enable", "pool", name, "backend", addr] => Ok(Command::EnableBackend {
                pool: (*name).to_string(),
                backend: (*addr).to_string(),
            }),
            ["enable", ..] => Err(CommandError::Usage("enable pool <name> backend <addr>")),
            _ => Err(CommandError::Unknown(input.trim().to_string())),
        }
    }

    /// Execute against the balancer, returning operator-facing text.
    pub fn execute(&self, balancer: &LoadBalancer) -> String {
        match self {
            Command::ListPools => list_pools(balancer),
            Command::DescribePool { pool } => describe_pool(balancer, pool),
            Command::DisableBackend { pool, backend } => {
                if balancer.disable_backend(pool, backend) {
                    format!("Backend '{}' disabled for pool '{}'", backend, pool)
                } else {
                    format!("Backend '{}' not found for pool '{}'", backend, pool)
                }
            }
            Command::EnableBackend { pool, backend } => {
                if balancer.enable_backend(pool, backend) {
                    format!("Backend '{}' enabled for pool '{}'", backend, pool)
                } else {
                    format!("Backend '{}' not found for pool '{}'", backend, pool)
                }
            }
        }
    }
}

fn list_pools(balancer: &LoadBalancer) -> String {
    let servers = balancer.servers();
    if servers.is_empty() {
        return "No load balanced pools configured".to_string();
    }

    let mut out = String::from("Load balanced pools:\n");
    for server in servers {
        out.push_str(&format!(
            "  {}: {}/{} backends available, strategy: {}\n",
            server.name(),
            server.available_count(),
            server.backends().len(),
            server.strategy().name()
        ));
    }
    out.trim_end().to_string()
}

fn describe_pool(balancer: &LoadBalancer, pool: &str) -> String {
    let Some(server) = balancer.server(pool) else {
        return format!("Pool '{}' not found", pool);
    };

    let mut out = format!("Pool '{}' (strategy: {}):\n", pool, server.strategy().name());
    for scored in server.scored_stats() {
        let stats = &scored.stats;
        let status = if stats.disabled {
            "DISABLED"
        } else if !stats.healthy {
            "UNHEALTHY"
        } else {
            "OK"
        };

        out.push_str(&format!(
            "  {} [{}] - {} player(s)\n",
            stats.addr, status, stats.current_conns
        ));
        out.push_str(&format!(
            "    Score: {} | Max: {} | Latency: {:.1}ms | Jitter: {:.1}ms | Fails: {}\n",
            scored.score, stats.max_connections, stats.avg_latency, stats.jitter, stats.fail_count
        ));
        if !stats.players.is_empty() {
            out.push_str(&format!("    Players: {}\n", stats.players.join(", ")));
        }
    }
    out.trim_end().to_string()
}
