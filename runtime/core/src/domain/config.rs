// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Runtime Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing one
// runtime session:
// - session name (selects the L3 store instance)
// - memory tiers: L2 cache and L3 backend
// - scheduler limits
// - event bus capacity
//
// Discovery: OSP_CONFIG_PATH -> ./osp-config.yaml -> ~/.osp/config.yaml -> /etc/osp/config.yaml

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_API_VERSION: &str = "osp.dev/v1";
pub const CONFIG_KIND: &str = "RuntimeConfig";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfigManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: RuntimeSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Session name. Different sessions use different L3 store instances.
    #[serde(default = "default_session")]
    pub session: String,

    #[serde(default)]
    pub memory: MemorySpec,

    #[serde(default)]
    pub scheduler: SchedulerSpec,

    #[serde(default)]
    pub events: EventSpec,

    /// Run a commit when the runtime is closed.
    #[serde(default = "default_true")]
    pub auto_commit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySpec {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub cache: CacheSpec,

    #[serde(default)]
    pub store: StoreSpec,
}

/// L2 shared cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// sled database, with the JSON file store as fallback.
    #[default]
    Sled,
    File,
    Memory,
}

/// L3 persistent store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSpec {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSpec {
    /// Upper bound on visits per spawn. `None` disables the guard.
    #[serde(default = "default_max_visits")]
    pub max_visits: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSpec {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_session() -> String {
    "default".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./.osp")
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_max_visits() -> Option<usize> {
    Some(1_000_000)
}

fn default_event_capacity() -> usize {
    1000
}

impl Default for RuntimeSpec {
    fn default() -> Self {
        Self {
            session: default_session(),
            memory: MemorySpec::default(),
            scheduler: SchedulerSpec::default(),
            events: EventSpec::default(),
            auto_commit: true,
        }
    }
}

impl Default for MemorySpec {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache: CacheSpec::default(),
            store: StoreSpec::default(),
        }
    }
}

impl Default for CacheSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_cache_capacity(),
            ttl: default_cache_ttl(),
        }
    }
}

impl Default for SchedulerSpec {
    fn default() -> Self {
        Self {
            max_visits: default_max_visits(),
        }
    }
}

impl Default for EventSpec {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl Default for RuntimeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: CONFIG_API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: "osp-runtime".to_string(),
                labels: None,
            },
            spec: RuntimeSpec::default(),
        }
    }
}

impl RuntimeConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

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
    /// 1. OSP_CONFIG_PATH environment variable
    /// 2. ./osp-config.yaml (working directory)
    /// 3. ~/.osp/config.yaml (user home)
    /// 4. /etc/osp/config.yaml (system, Unix) or C:\ProgramData\Osp\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("OSP_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./osp-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".osp").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/osp/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Osp\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply OSP_* environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(session) = lookup("OSP_SESSION") {
            tracing::info!("Environment override: OSP_SESSION={}", session);
            self.spec.session = session;
        }

        if let Some(dir) = lookup("OSP_DATA_DIR") {
            tracing::info!("Environment override: OSP_DATA_DIR={}", dir);
            self.spec.memory.data_dir = PathBuf::from(dir);
        }

        if let Some(val) = lookup("OSP_L2_ENABLED") {
            match parse_flag(&val) {
                Some(enabled) => {
                    tracing::info!("Environment override: OSP_L2_ENABLED={}", enabled);
                    self.spec.memory.cache.enabled = enabled;
                }
                None => {
                    tracing::warn!(
                        "Invalid value for OSP_L2_ENABLED: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(val) = lookup("OSP_STORE_BACKEND") {
            match val.to_lowercase().as_str() {
                "sled" => self.spec.memory.store.backend = StoreBackend::Sled,
                "file" => self.spec.memory.store.backend = StoreBackend::File,
                "memory" => self.spec.memory.store.backend = StoreBackend::Memory,
                _ => {
                    tracing::warn!(
                        "Invalid value for OSP_STORE_BACKEND: '{}'. Expected sled/file/memory. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != CONFIG_API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                CONFIG_API_VERSION
            );
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let session = &self.spec.session;
        if session.is_empty() {
            anyhow::bail!("spec.session cannot be empty");
        }
        if !session
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "spec.session '{}' may only contain ASCII letters, digits, '-' and '_'",
                session
            );
        }

        if self.spec.memory.cache.enabled && self.spec.memory.cache.capacity == 0 {
            anyhow::bail!("spec.memory.cache.capacity must be greater than zero when the cache is enabled");
        }

        if self.spec.scheduler.max_visits == Some(0) {
            anyhow::bail!("spec.scheduler.max_visits must be greater than zero");
        }

        if self.spec.events.capacity == 0 {
            anyhow::bail!("spec.events.capacity must be greater than zero");
        }

        Ok(())
    }

    /// Path of the sled database backing this session.
    pub fn sled_path(&self) -> PathBuf {
        self.spec
            .memory
            .data_dir
            .join(format!("{}.sled", self.spec.session))
    }

    /// Path of the JSON file store backing this session.
    pub fn file_store_path(&self) -> PathBuf {
        self.spec
            .memory
            .data_dir
            .join(format!("{}.anchors.json", self.spec.session))
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = RuntimeConfigManifest::default();
        assert_eq!(manifest.api_version, CONFIG_API_VERSION);
        assert_eq!(manifest.kind, CONFIG_KIND);
        assert_eq!(manifest.spec.session, "default");
        assert_eq!(manifest.spec.memory.store.backend, StoreBackend::Sled);
        assert!(!manifest.spec.memory.cache.enabled);
        assert!(manifest.spec.auto_commit);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: osp.dev/v1
kind: RuntimeConfig
metadata:
  name: test
spec:
  session: graph-a
  memory:
    data_dir: /tmp/osp
    cache:
      enabled: true
      ttl: 2m
    store:
      backend: file
"#;
        let manifest = RuntimeConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.session, "graph-a");
        assert!(manifest.spec.memory.cache.enabled);
        assert_eq!(manifest.spec.memory.cache.ttl, Duration::from_secs(120));
        assert_eq!(manifest.spec.memory.cache.capacity, 10_000);
        assert_eq!(manifest.spec.memory.store.backend, StoreBackend::File);
        assert_eq!(manifest.spec.scheduler.max_visits, Some(1_000_000));
        assert_eq!(manifest.file_store_path(), PathBuf::from("/tmp/osp/graph-a.anchors.json"));
        assert_eq!(manifest.sled_path(), PathBuf::from("/tmp/osp/graph-a.sled"));
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("osp-config.yaml");
        let mut manifest = RuntimeConfigManifest::default();
        manifest.spec.session = "roundtrip".to_string();
        manifest.spec.scheduler.max_visits = None;
        manifest.to_yaml_file(&path).unwrap();

        let parsed = RuntimeConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(parsed.spec.session, "roundtrip");
        assert_eq!(parsed.spec.scheduler.max_visits, None);

        let loaded = RuntimeConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "osp-runtime");
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = RuntimeConfigManifest::load_or_default(Some(dir.path().join("missing.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut manifest = RuntimeConfigManifest::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OSP_SESSION", "override"),
            ("OSP_DATA_DIR", "/var/lib/osp"),
            ("OSP_L2_ENABLED", "yes"),
            ("OSP_STORE_BACKEND", "memory"),
        ]);
        manifest.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(manifest.spec.session, "override");
        assert_eq!(manifest.spec.memory.data_dir, PathBuf::from("/var/lib/osp"));
        assert!(manifest.spec.memory.cache.enabled);
        assert_eq!(manifest.spec.memory.store.backend, StoreBackend::Memory);

        manifest.apply_overrides_from(|k| (k == "OSP_L2_ENABLED").then(|| "maybe".to_string()));
        assert!(manifest.spec.memory.cache.enabled);
    }

    #[test]
    fn test_validation() {
        let mut manifest = RuntimeConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = CONFIG_API_VERSION.to_string();

        manifest.spec.session = "../escape".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.session = "ok_session-1".to_string();
        assert!(manifest.validate().is_ok());

        manifest.spec.scheduler.max_visits = Some(0);
        assert!(manifest.validate().is_err());
        manifest.spec.scheduler.max_visits = Some(10);

        manifest.spec.memory.cache.enabled = true;
        manifest.spec.memory.cache.capacity = 0;
        assert!(manifest.validate().is_err());
    }
}
