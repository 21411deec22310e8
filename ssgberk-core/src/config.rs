// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML harness configuration parser with strict validation.
//!
//! Validates `ssgberk.yaml` before any container is touched.
//! Any invalid field results in a HardValidationError that prevents the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, SsgError, SsgResult};

/// Name of the shared container network used when no network mode is set.
pub const DEFAULT_NETWORK: &str = "ssgberk";

/// Local engine socket used on single-machine setups.
pub const LOCAL_ENGINE_HOST: &str = "unix:///var/run/docker.sock";

/// Raw configuration as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawHarnessConfig {
    root: String,
    #[serde(default = "default_duration")]
    duration: u64,
    #[serde(default)]
    network_mode: Option<String>,
    #[serde(default = "default_server_host")]
    server_host: String,
    #[serde(default = "default_client_host")]
    client_host: String,
    #[serde(default = "default_results_name")]
    results_name: String,
    #[serde(default = "default_results_environment")]
    results_environment: String,
    #[serde(default = "default_image_namespace")]
    image_namespace: String,
    #[serde(default = "default_measurement_type")]
    measurement_type: String,
    #[serde(default = "default_build_timeout_secs")]
    build_timeout_secs: u64,
    #[serde(default = "default_run_test_timeout_secs")]
    run_test_timeout_secs: u64,
    #[serde(default = "default_stop_grace_ms")]
    stop_grace_ms: u64,
    #[serde(default = "default_commit_workers")]
    commit_workers: usize,
    #[serde(default = "default_sloc_command")]
    sloc_command: String,
    #[serde(default = "default_commit_command")]
    commit_command: String,
}

fn default_duration() -> u64 {
    15
}

fn default_server_host() -> String {
    "ssgberk-server".to_string()
}

fn default_client_host() -> String {
    "ssgberk-client".to_string()
}

fn default_results_name() -> String {
    "(unspecified, datetime = %Y-%m-%d %H:%M:%S)".to_string()
}

fn default_results_environment() -> String {
    "(unspecified)".to_string()
}

fn default_image_namespace() -> String {
    "matheusrv".to_string()
}

fn default_measurement_type() -> String {
    "all".to_string()
}

fn default_build_timeout_secs() -> u64 {
    3600 // one hour per image build
}

fn default_run_test_timeout_secs() -> u64 {
    7200
}

fn default_stop_grace_ms() -> u64 {
    2000
}

fn default_commit_workers() -> usize {
    4 // git contends on its own locks beyond this
}

fn default_sloc_command() -> String {
    "cloc --yaml --follow-links . | grep code | tail -1 | cut -d: -f 2".to_string()
}

fn default_commit_command() -> String {
    "git rev-list HEAD -- {dir} | sort -u | wc -l".to_string()
}

/// How containers reach each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    /// Single host: every container joins a shared named network.
    Shared { network: String },
    /// Tri-machine setup: host networking, engines reached over TCP.
    Host,
}

impl NetworkMode {
    /// Name of the shared network, if any.
    pub fn network(&self) -> Option<&str> {
        match self {
            Self::Shared { network } => Some(network),
            Self::Host => None,
        }
    }

    /// Value for the engine's `--network` flag.
    pub fn engine_network(&self) -> &str {
        match self {
            Self::Shared { network } => network,
            Self::Host => "host",
        }
    }
}

/// Subprocess templates used by the SLOC and commit-count passes.
///
/// `{dir}` is replaced with the shell-quoted generator directory.
#[derive(Debug, Clone)]
pub struct ToolCommands {
    pub sloc: String,
    pub commits: String,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            sloc: default_sloc_command(),
            commits: default_commit_command(),
        }
    }
}

/// Validated harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub root: PathBuf,
    pub duration: u64,
    pub network: NetworkMode,
    pub server_host: String,
    pub client_host: String,
    pub results_name: String,
    pub results_environment: String,
    pub image_namespace: String,
    /// `None` runs every registered measurement type.
    pub measurement_type: Option<String>,
    pub build_timeout: Duration,
    pub run_test_timeout: Duration,
    pub stop_grace: Duration,
    pub commit_workers: usize,
    pub tools: ToolCommands,
}

impl HarnessConfig {
    /// Directory holding `<language>/<generator>/benchmark_config.json`.
    pub fn lang_root(&self) -> PathBuf {
        self.root.join("generators")
    }

    /// Directory holding one sub-directory per run timestamp.
    pub fn results_root(&self) -> PathBuf {
        self.root.join("results")
    }

    /// Build context of the load-generation utility image.
    pub fn utility_root(&self) -> PathBuf {
        self.root.join("toolset").join("hyperfine")
    }

    /// Engine address for the machine running the tests.
    pub fn server_engine_host(&self) -> String {
        match self.network {
            NetworkMode::Shared { .. } => LOCAL_ENGINE_HOST.to_string(),
            NetworkMode::Host => format!("tcp://{}:2375", self.server_host),
        }
    }

    /// Engine address for the machine generating load.
    pub fn client_engine_host(&self) -> String {
        match self.network {
            NetworkMode::Shared { .. } => LOCAL_ENGINE_HOST.to_string(),
            NetworkMode::Host => format!("tcp://{}:2375", self.client_host),
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> SsgResult<HarnessConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SsgError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SsgError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> SsgResult<HarnessConfig> {
        let raw: RawHarnessConfig =
            serde_yaml::from_str(content).map_err(|e| SsgError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Ok(Self::validate(raw)?)
    }

    /// Validate raw configuration and convert to validated types.
    fn validate(raw: RawHarnessConfig) -> Result<HarnessConfig, HardValidationError> {
        if raw.root.trim().is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "root",
                context: "harness config".to_string(),
            });
        }

        if raw.duration == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "duration",
                value: "0".to_string(),
                reason: "Duration must be greater than 0".to_string(),
            });
        }

        let network = match raw.network_mode.as_deref() {
            None => NetworkMode::Shared {
                network: DEFAULT_NETWORK.to_string(),
            },
            Some("host") => NetworkMode::Host,
            Some(other) => {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "network_mode",
                    value: other.to_string(),
                    reason: "The only supported network mode is 'host'".to_string(),
                });
            }
        };

        for (field, value) in [
            ("server_host", &raw.server_host),
            ("client_host", &raw.client_host),
        ] {
            if value.trim().is_empty() {
                return Err(HardValidationError::MissingRequiredField {
                    field,
                    context: "harness config".to_string(),
                });
            }
        }

        Self::validate_namespace(&raw.image_namespace)?;

        let measurement_type = match raw.measurement_type.trim() {
            "" => {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "measurement_type",
                    value: raw.measurement_type.clone(),
                    reason: "Use 'all' or a registered measurement type".to_string(),
                });
            }
            "all" => None,
            other => Some(other.to_string()),
        };

        if raw.build_timeout_secs == 0 || raw.build_timeout_secs > 86_400 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "build_timeout_secs",
                value: raw.build_timeout_secs.to_string(),
                reason: "Must be between 1 and 86400 seconds".to_string(),
            });
        }

        if raw.run_test_timeout_secs == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "run_test_timeout_secs",
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if raw.stop_grace_ms > 60_000 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "stop_grace_ms",
                value: raw.stop_grace_ms.to_string(),
                reason: "Grace period must not exceed 60000ms".to_string(),
            });
        }

        if raw.commit_workers == 0 || raw.commit_workers > 64 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "commit_workers",
                value: raw.commit_workers.to_string(),
                reason: "Must be between 1 and 64".to_string(),
            });
        }

        for (field, value) in [
            ("sloc_command", &raw.sloc_command),
            ("commit_command", &raw.commit_command),
        ] {
            if value.trim().is_empty() {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: String::new(),
                    reason: "Command template cannot be empty".to_string(),
                });
            }
        }

        Ok(HarnessConfig {
            root: PathBuf::from(raw.root),
            duration: raw.duration,
            network,
            server_host: raw.server_host,
            client_host: raw.client_host,
            results_name: raw.results_name,
            results_environment: raw.results_environment,
            image_namespace: raw.image_namespace,
            measurement_type,
            build_timeout: Duration::from_secs(raw.build_timeout_secs),
            run_test_timeout: Duration::from_secs(raw.run_test_timeout_secs),
            stop_grace: Duration::from_millis(raw.stop_grace_ms),
            commit_workers: raw.commit_workers,
            tools: ToolCommands {
                sloc: raw.sloc_command,
                commits: raw.commit_command,
            },
        })
    }

    /// Image references must be lower-case.
    fn validate_namespace(namespace: &str) -> Result<(), HardValidationError> {
        if namespace.is_empty()
            || !namespace
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "image_namespace",
                value: namespace.to_string(),
                reason: "Namespace must be lower-case alphanumeric with hyphens or underscores"
                    .to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
root: /srv/ssgberk
duration: 30
server_host: 10.0.0.1
client_host: 10.0.0.2
image_namespace: matheusrv
measurement_type: build
commit_workers: 2
"#;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/ssgberk"));
        assert_eq!(config.duration, 30);
        assert_eq!(config.measurement_type.as_deref(), Some("build"));
        assert_eq!(config.commit_workers, 2);
        assert_eq!(config.lang_root(), PathBuf::from("/srv/ssgberk/generators"));
        assert_eq!(
            config.utility_root(),
            PathBuf::from("/srv/ssgberk/toolset/hyperfine")
        );
    }

    #[test]
    fn test_defaults_applied() {
        let config = ConfigLoader::load_string("root: /srv/ssgberk\n").unwrap();
        assert_eq!(config.duration, 15);
        assert_eq!(config.measurement_type, None);
        assert_eq!(config.build_timeout, Duration::from_secs(3600));
        assert_eq!(config.stop_grace, Duration::from_millis(2000));
        assert_eq!(config.commit_workers, 4);
        assert_eq!(
            config.network,
            NetworkMode::Shared {
                network: "ssgberk".to_string()
            }
        );
        assert_eq!(config.server_engine_host(), LOCAL_ENGINE_HOST);
    }

    #[test]
    fn test_host_network_uses_tcp_engines() {
        let yaml = r#"
root: /srv/ssgberk
network_mode: host
server_host: 10.0.0.1
client_host: 10.0.0.2
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.network, NetworkMode::Host);
        assert_eq!(config.network.network(), None);
        assert_eq!(config.server_engine_host(), "tcp://10.0.0.1:2375");
        assert_eq!(config.client_engine_host(), "tcp://10.0.0.2:2375");
    }

    #[test]
    fn test_unknown_network_mode_rejected() {
        let yaml = "root: /srv\nnetwork_mode: bridge\n";
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_missing_root_rejected() {
        assert!(ConfigLoader::load_string("duration: 10\n").is_err());
        assert!(ConfigLoader::load_string("root: \"\"\n").is_err());
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(ConfigLoader::load_string("root: /srv\nduration: 0\n").is_err());
    }

    #[test]
    fn test_commit_workers_bounds() {
        assert!(ConfigLoader::load_string("root: /srv\ncommit_workers: 0\n").is_err());
        assert!(ConfigLoader::load_string("root: /srv\ncommit_workers: 65\n").is_err());
    }

    #[test]
    fn test_uppercase_namespace_rejected() {
        assert!(ConfigLoader::load_string("root: /srv\nimage_namespace: Matheus\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::load_file("/nonexistent/ssgberk.yaml");
        assert!(matches!(result, Err(SsgError::ConfigNotFound { .. })));
    }
}
