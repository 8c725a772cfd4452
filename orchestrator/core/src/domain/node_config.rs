// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema shared by simfleet Agents and the
// Controller:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Node identity, tags and optional declared resources
// - Agent settings (listener, controller endpoint, port pool, launcher)
// - Controller settings (listener, RPC timeouts, node freshness, storage)
// - Observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::node::NodeCapacity;
use crate::domain::port_pool::PortRange;
use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "simfleet.io/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "simfleet.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: NodeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name, reported as the node's display name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Node configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    pub node: NodeIdentity,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Unique stable node identifier, sent on every registration
    pub id: String,

    /// Free-form tags reported to the Controller
    #[serde(default)]
    pub tags: Vec<String>,

    /// Declared compute resources. When absent the Agent probes the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<NodeResources>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResources {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
}

impl From<NodeResources> for NodeCapacity {
    fn from(r: NodeResources) -> Self {
        NodeCapacity {
            cpu_cores: r.cpu_cores,
            memory_gb: r.memory_gb,
            disk_gb: r.disk_gb,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_agent_port")]
    pub port: u16,

    /// Address the Controller uses to reach this Agent. Defaults to the
    /// host name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,

    /// Controller base URL (registration goes to `/api/v1/register`)
    #[serde(default = "default_controller_url")]
    pub controller_url: String,

    /// Shared registration credential (supports "env:VAR_NAME")
    #[serde(default = "default_credential")]
    pub credential: String,

    #[serde(default)]
    pub port_range: PortRangeConfig,

    /// Registration is repeated on this interval and doubles as heartbeat
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_seconds: u64,

    /// Upper bound for the shutdown sweep over all instances
    #[serde(default = "default_shutdown_deadline")]
    pub shutdown_deadline_seconds: u64,

    #[serde(default)]
    pub launcher: LauncherConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_agent_port(),
            public_address: None,
            controller_url: default_controller_url(),
            credential: default_credential(),
            port_range: PortRangeConfig::default(),
            heartbeat_interval_seconds: default_heartbeat(),
            shutdown_deadline_seconds: default_shutdown_deadline(),
            launcher: LauncherConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_seconds)
    }
}

/// Inclusive UDP port range handed out to instances on this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRangeConfig {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRangeConfig {
    fn default() -> Self {
        let range = PortRange::default();
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

impl PortRangeConfig {
    pub fn to_range(self) -> anyhow::Result<PortRange> {
        PortRange::new(self.start, self.end).map_err(|e| anyhow::anyhow!(e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Simulation image every instance runs
    #[serde(default = "default_image")]
    pub image: String,

    /// Path to Docker socket
    /// Default: platform default (`/var/run/docker.sock` on Linux/Mac)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket_path: Option<String>,

    /// Docker network mode. With anything other than "host" the instance
    /// UDP port is published explicitly.
    #[serde(default = "default_network_mode")]
    pub network_mode: String,

    /// Pull the image on launch when it is missing locally
    #[serde(default = "default_true")]
    pub autopull: bool,

    /// Mount the host X11 socket read-only into each container
    #[serde(default = "default_true")]
    pub mount_x11: bool,

    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            docker_socket_path: None,
            network_mode: default_network_mode(),
            autopull: true,
            mount_x11: true,
            stop_grace_seconds: default_stop_grace(),
        }
    }
}

impl LauncherConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_controller_port")]
    pub port: u16,

    /// Credential Agents must present on registration (supports "env:VAR_NAME")
    #[serde(default = "default_credential")]
    pub credential: String,

    /// Timeout for start/stop/status calls to an Agent
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: u64,

    /// Timeout for the Agent health probe
    #[serde(default = "default_health_timeout")]
    pub health_timeout_seconds: u64,

    /// Scheme used when a node address carries none
    #[serde(default = "default_agent_scheme")]
    pub agent_scheme: String,

    /// Port used when a node address carries none
    #[serde(default = "default_agent_port")]
    pub default_agent_port: u16,

    /// A node whose last contact is older than this is treated as offline
    #[serde(default = "default_freshness")]
    pub node_freshness_seconds: u64,

    #[serde(default = "default_sweep_interval")]
    pub stale_sweep_interval_seconds: u64,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_controller_port(),
            credential: default_credential(),
            agent_timeout_seconds: default_agent_timeout(),
            health_timeout_seconds: default_health_timeout(),
            agent_scheme: default_agent_scheme(),
            default_agent_port: default_agent_port(),
            node_freshness_seconds: default_freshness(),
            stale_sweep_interval_seconds: default_sweep_interval(),
            storage: StorageConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_seconds)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_seconds)
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.node_freshness_seconds as i64)
    }

    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stale_sweep_interval_seconds)
    }
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

impl StorageConfig {
    /// Resolve the configured backend, following `env:` indirection for the
    /// connection string.
    pub fn to_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.backend {
            StorageBackendKind::InMemory => Ok(StorageBackend::InMemory),
            StorageBackendKind::Postgres => {
                let url = self
                    .database_url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("postgres backend selected without a database_url"))?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: resolve_secret(url)?,
                }))
            }
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
    /// Enable Prometheus exposition
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_heartbeat() -> u64 {
    30
}

fn default_shutdown_deadline() -> u64 {
    60
}

fn default_stop_grace() -> u64 {
    10
}

fn default_agent_timeout() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

fn default_freshness() -> u64 {
    90
}

fn default_sweep_interval() -> u64 {
    30
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
    "0.0.0.0".to_string()
}

fn default_agent_port() -> u16 {
    8443
}

fn default_controller_port() -> u16 {
    8000
}

fn default_controller_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_credential() -> String {
    "agent-registration-key".to_string()
}

fn default_agent_scheme() -> String {
    "http".to_string()
}

fn default_image() -> String {
    "px4io/px4-dev-simulation:latest".to_string()
}

fn default_network_mode() -> String {
    "host".to_string()
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "simfleet-node".to_string())
}

impl Default for NodeConfigSpec {
    fn default() -> Self {
        Self {
            node: NodeIdentity {
                id: local_hostname(),
                tags: vec![],
                resources: None,
            },
            agent: AgentConfig::default(),
            controller: ControllerConfig::default(),
            observability: None,
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: local_hostname(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

/// Resolve `env:VAR_NAME` indirection; any other value is returned as-is.
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| anyhow::anyhow!("Environment variable '{}' referenced by config is not set", var)),
        None => Ok(value.to_string()),
    }
}

impl NodeConfigManifest {
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

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SIMFLEET_CONFIG_PATH environment variable
    /// 2. ./simfleet-config.yaml (working directory)
    /// 3. ~/.simfleet/config.yaml (user home)
    /// 4. /etc/simfleet/config.yaml (system, Unix) or C:\ProgramData\Simfleet\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SIMFLEET_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./simfleet-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".simfleet").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/simfleet/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Simfleet\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
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
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SIMFLEET_NODE_ID") {
            if !val.is_empty() {
                tracing::info!("Environment override: SIMFLEET_NODE_ID={}", val);
                self.spec.node.id = val;
            }
        }

        if let Ok(val) = std::env::var("SIMFLEET_CONTROLLER_URL") {
            if !val.is_empty() {
                tracing::info!("Environment override: SIMFLEET_CONTROLLER_URL={}", val);
                self.spec.agent.controller_url = val;
            }
        }

        // Shared secret, so both sides pick it up
        if let Ok(val) = std::env::var("SIMFLEET_CREDENTIAL") {
            if !val.is_empty() {
                tracing::info!("Environment override: SIMFLEET_CREDENTIAL=<redacted>");
                self.spec.agent.credential = val.clone();
                self.spec.controller.credential = val;
            }
        }

        if let Ok(val) = std::env::var("SIMFLEET_DATABASE_URL") {
            if !val.is_empty() {
                tracing::info!("Environment override: SIMFLEET_DATABASE_URL set, using postgres backend");
                self.spec.controller.storage.backend = StorageBackendKind::Postgres;
                self.spec.controller.storage.database_url = Some(val);
            }
        }
    }

    pub fn node_capacity(&self) -> Option<NodeCapacity> {
        self.spec.node.resources.map(NodeCapacity::from)
    }

    /// Address advertised to the Controller on registration.
    pub fn agent_public_address(&self) -> String {
        match &self.spec.agent.public_address {
            Some(addr) => addr.clone(),
            None => format!("{}:{}", local_hostname(), self.spec.agent.port),
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_else(|| LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            })
    }

    /// `None` when metrics exposition is disabled or not configured.
    pub fn metrics(&self) -> Option<MetricsConfig> {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.metrics.clone())
            .filter(|m| m.enabled)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.node.id.is_empty() {
            anyhow::bail!("spec.node.id cannot be empty");
        }

        let range = self.spec.agent.port_range;
        if range.start > range.end {
            anyhow::bail!(
                "spec.agent.port_range is inverted: start {} > end {}",
                range.start,
                range.end
            );
        }
        if range.start == 0 {
            anyhow::bail!("spec.agent.port_range cannot include port 0");
        }

        if self.spec.agent.controller_url.is_empty() {
            anyhow::bail!("spec.agent.controller_url cannot be empty");
        }

        if self.spec.agent.heartbeat_interval_seconds == 0 {
            anyhow::bail!("spec.agent.heartbeat_interval_seconds must be greater than zero");
        }

        if self.spec.agent.launcher.image.is_empty() {
            anyhow::bail!("spec.agent.launcher.image cannot be empty");
        }

        let controller = &self.spec.controller;
        if controller.agent_timeout_seconds == 0 || controller.health_timeout_seconds == 0 {
            anyhow::bail!("spec.controller timeouts must be greater than zero");
        }

        if controller.node_freshness_seconds == 0 || controller.stale_sweep_interval_seconds == 0 {
            anyhow::bail!("spec.controller freshness window and sweep interval must be greater than zero");
        }

        if !matches!(controller.agent_scheme.as_str(), "http" | "https") {
            anyhow::bail!(
                "Invalid spec.controller.agent_scheme: '{}'. Must be 'http' or 'https'",
                controller.agent_scheme
            );
        }

        if controller.storage.backend == StorageBackendKind::Postgres
            && controller.storage.database_url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.controller.storage.database_url is required for the postgres backend");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = NodeConfigManifest::default();
        assert_eq!(manifest.api_version, "simfleet.io/v1");
        assert_eq!(manifest.kind, "NodeConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.agent.port, 8443);
        assert_eq!(manifest.spec.controller.port, 8000);
        assert_eq!(manifest.spec.agent.port_range, PortRangeConfig { start: 14560, end: 14570 });
        assert_eq!(manifest.spec.agent.launcher.image, "px4io/px4-dev-simulation:latest");
        assert_eq!(manifest.spec.controller.storage.backend, StorageBackendKind::InMemory);
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: simfleet.io/v1
kind: NodeConfig
metadata:
  name: bench-01
spec:
  node:
    id: node-bench-01
    tags: [px4-agent, lab]
  agent:
    port_range:
      start: 15000
      end: 15003
"#;
        let manifest = NodeConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.spec.node.tags, vec!["px4-agent", "lab"]);
        assert_eq!(manifest.spec.agent.port_range.to_range().unwrap().len(), 4);
        assert_eq!(manifest.spec.agent.heartbeat_interval_seconds, 30);
        assert_eq!(manifest.spec.controller.agent_timeout_seconds, 30);
        assert_eq!(manifest.spec.controller.health_timeout_seconds, 5);
        assert_eq!(manifest.spec.controller.freshness_window(), chrono::Duration::seconds(90));
        assert!(manifest.node_capacity().is_none());
        assert!(manifest.metrics().is_none());
        assert_eq!(manifest.logging().format, "text");
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simfleet-config.yaml");

        let mut manifest = NodeConfigManifest::default();
        manifest.metadata.name = "test-node".to_string();
        manifest.spec.node.id = "550e8400-e29b-41d4-a716-446655440000".to_string();
        manifest.spec.node.resources = Some(NodeResources { cpu_cores: 4, memory_gb: 16, disk_gb: 100 });
        manifest.to_yaml_file(&path).unwrap();

        let parsed = NodeConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(parsed.metadata.name, "test-node");
        assert_eq!(parsed.spec.node.id, "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(
            parsed.node_capacity(),
            Some(NodeCapacity { cpu_cores: 4, memory_gb: 16, disk_gb: 100 })
        );
    }

    #[test]
    fn test_validation() {
        let mut manifest = NodeConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.node.id = "".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.node.id = "test-node-id".to_string();

        manifest.spec.agent.port_range = PortRangeConfig { start: 14570, end: 14560 };
        assert!(manifest.validate().is_err());
        manifest.spec.agent.port_range = PortRangeConfig::default();

        manifest.spec.controller.agent_timeout_seconds = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.controller.agent_timeout_seconds = 30;

        manifest.spec.controller.storage.backend = StorageBackendKind::Postgres;
        assert!(manifest.validate().is_err());
        manifest.spec.controller.storage.database_url = Some("postgres://localhost/simfleet".to_string());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret("plain").unwrap(), "plain");

        std::env::set_var("SIMFLEET_TEST_RESOLVE_SECRET", "s3cret");
        assert_eq!(resolve_secret("env:SIMFLEET_TEST_RESOLVE_SECRET").unwrap(), "s3cret");
        assert!(resolve_secret("env:SIMFLEET_TEST_UNSET_SECRET_VAR").is_err());
    }

    #[test]
    fn test_storage_backend_resolution() {
        let mut storage = StorageConfig::default();
        assert!(matches!(storage.to_backend().unwrap(), StorageBackend::InMemory));

        storage.backend = StorageBackendKind::Postgres;
        assert!(storage.to_backend().is_err());

        std::env::set_var("SIMFLEET_TEST_DB_URL", "postgres://db/simfleet");
        storage.database_url = Some("env:SIMFLEET_TEST_DB_URL".to_string());
        match storage.to_backend().unwrap() {
            StorageBackend::PostgreSQL(cfg) => assert_eq!(cfg.connection_string, "postgres://db/simfleet"),
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(NodeConfigManifest::load_or_default(Some(missing)).is_err());
    }
}
