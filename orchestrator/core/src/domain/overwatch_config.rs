// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Overwatch Configuration Types
//
// Defines the configuration schema for an Overwatch daemon, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Kill switch detection policy and per-run time budgets
// - Credentials and endpoints of each control plane
// - Storage backend selection
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::transition::DetectionPolicy;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "OverwatchConfig";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverwatchConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "OverwatchConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: OverwatchConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable deployment name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Manifest body (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OverwatchConfigSpec {
    #[serde(default)]
    pub kill_switch: KillSwitchConfig,

    /// Compute lifecycle control plane (deployment teardown)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute: Option<ComputeConfig>,

    /// Realtime session control plane (token revocation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,

    /// Operator notification channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationConfig>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchConfig {
    /// "edge" fires once per false -> true flip, "level" on every suspended write
    #[serde(default)]
    pub detection_policy: DetectionPolicy,

    /// Budget for a single deactivation action
    #[serde(default = "default_action_timeout", with = "humantime_serde")]
    pub action_timeout: Duration,

    /// Shared deadline for all actions of one run
    #[serde(default = "default_run_deadline", with = "humantime_serde")]
    pub run_deadline: Duration,

    /// Text delivered to the operator channel on termination
    #[serde(default = "default_termination_message")]
    pub termination_message: String,

    /// Re-drive suspended nodes lacking an audit entry at daemon startup
    #[serde(default = "default_true")]
    pub reconcile_on_startup: bool,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            detection_policy: DetectionPolicy::Edge,
            action_timeout: default_action_timeout(),
            run_deadline: default_run_deadline(),
            termination_message: default_termination_message(),
            reconcile_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// GraphQL endpoint of the deployment platform
    #[serde(default = "default_compute_endpoint")]
    pub endpoint: String,

    /// API token (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL of the realtime server API (e.g. "https://example.livekit.cloud")
    pub endpoint: String,

    /// API key (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API secret used to sign admin tokens (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,

    /// Participant identity = prefix + operator id
    #[serde(default = "default_identity_prefix")]
    pub identity_prefix: String,

    /// Lifetime of minted admin tokens
    #[serde(default = "default_token_ttl", with = "humantime_serde")]
    pub token_ttl: Duration,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook receiving termination notices
    pub endpoint: String,

    /// Optional bearer token (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// PostgreSQL connection string (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus listener port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_action_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_run_deadline() -> Duration {
    Duration::from_secs(15)
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(600)
}

fn default_termination_message() -> String {
    "NODE SUSPENDED: operator kill switch activated. All live capabilities have been revoked.".to_string()
}

fn default_compute_endpoint() -> String {
    "https://backboard.railway.app/graphql/v2".to_string()
}

fn default_identity_prefix() -> String {
    "agent_".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8000
}

impl Default for OverwatchConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "overwatch".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: OverwatchConfigSpec::default(),
        }
    }
}

/// Resolve a credential from config (supports "env:VAR_NAME" syntax)
pub fn resolve_secret(value: &Option<String>) -> anyhow::Result<Option<String>> {
    match value {
        Some(v) => match v.strip_prefix("env:") {
            Some(var_name) => std::env::var(var_name)
                .map(Some)
                .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
            None => Ok(Some(v.clone())),
        },
        None => Ok(None),
    }
}

impl OverwatchConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. OVERWATCH_CONFIG_PATH environment variable
    /// 2. ./overwatch-config.yaml (working directory)
    /// 3. ~/.overwatch/config.yaml (user home)
    /// 4. /etc/overwatch/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("OVERWATCH_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./overwatch-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".overwatch").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/overwatch/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("OVERWATCH_DETECTION_POLICY") {
            match val.parse::<DetectionPolicy>() {
                Ok(policy) => {
                    tracing::info!("Environment override: OVERWATCH_DETECTION_POLICY={:?}", policy);
                    self.spec.kill_switch.detection_policy = policy;
                }
                Err(e) => {
                    tracing::warn!("Invalid value for OVERWATCH_DETECTION_POLICY: {}. Ignoring.", e);
                }
            }
        }

        if let Some(url) = lookup("OVERWATCH_DATABASE_URL") {
            if !url.is_empty() {
                tracing::info!("Environment override: OVERWATCH_DATABASE_URL set, using postgres storage");
                self.spec.storage.backend = StorageBackendKind::Postgres;
                self.spec.storage.database_url = Some(url);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let kill_switch = &self.spec.kill_switch;
        if kill_switch.action_timeout.is_zero() {
            anyhow::bail!("kill_switch.action_timeout must be greater than zero");
        }
        if kill_switch.run_deadline < kill_switch.action_timeout {
            anyhow::bail!(
                "kill_switch.run_deadline ({:?}) must not be shorter than kill_switch.action_timeout ({:?})",
                kill_switch.run_deadline,
                kill_switch.action_timeout
            );
        }

        if let Some(compute) = &self.spec.compute {
            if compute.enabled && compute.endpoint.is_empty() {
                anyhow::bail!("compute.endpoint cannot be empty");
            }
        }

        if let Some(session) = &self.spec.session {
            if session.enabled {
                if session.endpoint.is_empty() {
                    anyhow::bail!("session.endpoint cannot be empty");
                }
                if session.api_key.is_none() || session.api_secret.is_none() {
                    anyhow::bail!("session.api_key and session.api_secret are required when session revocation is enabled");
                }
            }
        }

        if let Some(notification) = &self.spec.notification {
            if notification.enabled && notification.endpoint.is_empty() {
                anyhow::bail!("notification.endpoint cannot be empty");
            }
        }

        if self.spec.storage.backend == StorageBackendKind::Postgres
            && self.spec.storage.database_url.is_none()
        {
            anyhow::bail!("storage.database_url is required for the postgres backend");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = OverwatchConfigManifest::default();
        assert_eq!(manifest.api_version, "100monkeys.ai/v1");
        assert_eq!(manifest.kind, "OverwatchConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.kill_switch.detection_policy, DetectionPolicy::Edge);
        assert_eq!(manifest.spec.kill_switch.action_timeout, Duration::from_secs(8));
        assert_eq!(manifest.spec.storage.backend, StorageBackendKind::InMemory);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: OverwatchConfig
metadata:
  name: overwatch-prod
spec:
  kill_switch:
    detection_policy: level
    action_timeout: 5s
    run_deadline: 12s
  compute:
    api_token: env:RAILWAY_API_TOKEN
  session:
    endpoint: https://voice.example.com
    api_key: key
    api_secret: secret
  notification:
    endpoint: https://hooks.example.com/overwatch
  storage:
    backend: postgres
    database_url: postgres://localhost/overwatch
  network:
    port: 9100
"#;
        let manifest = OverwatchConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.kill_switch.detection_policy, DetectionPolicy::Level);
        assert_eq!(manifest.spec.kill_switch.action_timeout, Duration::from_secs(5));
        assert_eq!(manifest.spec.kill_switch.run_deadline, Duration::from_secs(12));
        let compute = manifest.spec.compute.as_ref().unwrap();
        assert_eq!(compute.endpoint, "https://backboard.railway.app/graphql/v2");
        assert!(compute.enabled);
        let session = manifest.spec.session.as_ref().unwrap();
        assert_eq!(session.identity_prefix, "agent_");
        assert_eq!(manifest.spec.storage.backend, StorageBackendKind::Postgres);
        assert_eq!(manifest.spec.network.port, 9100);
        assert_eq!(manifest.spec.network.bind_address, "127.0.0.1");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overwatch-config.yaml");

        let mut manifest = OverwatchConfigManifest::default();
        manifest.metadata.name = "roundtrip".to_string();
        manifest.spec.notification = Some(NotificationConfig {
            endpoint: "https://hooks.example.com".to_string(),
            auth_token: None,
            enabled: true,
        });
        manifest.to_yaml_file(&path).unwrap();

        let loaded = OverwatchConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "roundtrip");
        assert_eq!(loaded.spec.notification.unwrap().endpoint, "https://hooks.example.com");
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = OverwatchConfigManifest::load_or_default(Some(dir.path().join("missing.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut manifest = OverwatchConfigManifest::default();
        manifest.apply_overrides_from(|name| match name {
            "OVERWATCH_DETECTION_POLICY" => Some("level".to_string()),
            "OVERWATCH_DATABASE_URL" => Some("postgres://db/overwatch".to_string()),
            _ => None,
        });
        assert_eq!(manifest.spec.kill_switch.detection_policy, DetectionPolicy::Level);
        assert_eq!(manifest.spec.storage.backend, StorageBackendKind::Postgres);

        // Invalid policy is ignored
        manifest.apply_overrides_from(|name| {
            (name == "OVERWATCH_DETECTION_POLICY").then(|| "bogus".to_string())
        });
        assert_eq!(manifest.spec.kill_switch.detection_policy, DetectionPolicy::Level);
    }

    #[test]
    fn test_validation() {
        let mut manifest = OverwatchConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.kill_switch.run_deadline = Duration::from_secs(1);
        assert!(manifest.validate().is_err());
        manifest.spec.kill_switch.run_deadline = Duration::from_secs(15);

        manifest.spec.session = Some(SessionConfig {
            endpoint: "https://voice.example.com".to_string(),
            api_key: Some("key".to_string()),
            api_secret: None,
            identity_prefix: default_identity_prefix(),
            token_ttl: default_token_ttl(),
            enabled: true,
        });
        assert!(manifest.validate().is_err());

        manifest.spec.session = None;
        manifest.spec.storage.backend = StorageBackendKind::Postgres;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret(&None).unwrap(), None);
        assert_eq!(resolve_secret(&Some("plain".to_string())).unwrap(), Some("plain".to_string()));
        assert!(resolve_secret(&Some("env:OVERWATCH_TEST_SURELY_UNSET_VAR".to_string())).is_err());
    }
}
