//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `DEVINIT_DEFAULT_NAMESPACE`
const ENV_PREFIX: &str = "DEVINIT";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Namespace used when `--namespace` is not given
    pub default_namespace: Option<String>,
    /// Default output format (`table` or `json`)
    pub default_format: Option<String>,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: Option<String>,
    /// Kubeconfig file used when `--kubeconfig` is not given
    pub kubeconfig: Option<String>,
}

impl CliConfig {
    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path` (if it exists), then the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("devinit").join("config.json"))
    }
}

/// Kubeconfig to load, if one was chosen explicitly
///
/// `None` leaves the lookup to the Kubernetes client, which honours
/// `KUBECONFIG` (including path lists) and then `~/.kube/config`.
pub fn kubeconfig_path(override_path: Option<&str>, config: &CliConfig) -> Option<PathBuf> {
    override_path
        .or(config.kubeconfig.as_deref())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CliConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.kubeconfig, None);
        assert_eq!(config.default_format, None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"default_namespace": "staging", "default_format": "json", "log_level": "debug"}"#,
        )
        .unwrap();

        let config = CliConfig::load_from(&path).unwrap();
        assert_eq!(config.default_namespace.as_deref(), Some("staging"));
        assert_eq!(config.default_format.as_deref(), Some("json"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(CliConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_kubeconfig_precedence() {
        let config = CliConfig {
            kubeconfig: Some("/etc/devinit/kubeconfig".to_string()),
            ..Default::default()
        };
        assert_eq!(
            kubeconfig_path(Some("/tmp/kc"), &config),
            Some(PathBuf::from("/tmp/kc"))
        );
        assert_eq!(
            kubeconfig_path(None, &config),
            Some(PathBuf::from("/etc/devinit/kubeconfig"))
        );
        assert_eq!(kubeconfig_path(None, &CliConfig::default()), None);
    }
}
