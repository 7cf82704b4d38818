//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::BalancerConfig;
use crate::config::validation::validate_config;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load configuration from a TOML file.
///
/// Semantic problems (unknown strategy names, zero timeouts, empty backend
/// addresses) are logged as warnings here and degrade to defaults at pool
/// build time; only an unreadable or unparseable file is an error.
pub fn load_config(path: &Path) -> Result<BalancerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: BalancerConfig = toml::from_str(&content)?;

    for warning in validate_config(&config) {
        tracing::warn!(%warning, "Configuration degraded");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balancer.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[servers.lobby]\nbackends = [{{ addr = \"127.0.0.1:25566\" }}]"
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.servers.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/balancer.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn garbage_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balancer.toml");
        fs::write(&path, "not = [valid").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
