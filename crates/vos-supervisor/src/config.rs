//! Environment configuration.
//!
//! Every field has a default, so a config document only names what it
//! changes:
//!
//! ```json
//! {
//!   "store": { "kind": "disk", "path": "/var/lib/vos" },
//!   "context": { "asset_dir": "./assets" },
//!   "features": ["terminal"]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EnvError, EnvResult};
use crate::features::FeatureId;

/// Entry store backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Non-persistent, in memory
    #[default]
    Memory,
    /// JSON snapshot on the host filesystem
    Disk,
}

/// Persistent store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Database name
    pub name: String,
    /// Schema version; a mismatch on open discards stored data
    pub version: u32,
    /// Host directory for `disk` stores
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            name: default_store_name(),
            version: 1,
            path: None,
        }
    }
}

fn default_store_name() -> String {
    "vos".to_string()
}

/// Execution context bootstrap settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Directory serving the module and payload; none means mock
    pub asset_dir: Option<PathBuf>,
    /// Logical module name
    pub module: String,
    /// Logical payload name
    pub payload: String,
    /// Skip the probe and use the mock bridge
    pub force_mock: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            asset_dir: None,
            module: vos_bridge::DEFAULT_MODULE.to_string(),
            payload: vos_bridge::DEFAULT_PAYLOAD.to_string(),
            force_mock: false,
        }
    }
}

/// Complete environment configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub store: StoreConfig,
    pub context: ContextConfig,
    /// Features loaded during init
    pub features: Vec<FeatureId>,
    /// Stdin queue depth per process
    pub stdin_queue: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            context: ContextConfig::default(),
            features: Vec::new(),
            stdin_queue: vos_ipc::DEFAULT_STDIN_QUEUE,
        }
    }
}

impl EnvConfig {
    /// Parse a (possibly partial) JSON document over the defaults.
    pub fn from_json_str(json: &str) -> EnvResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub async fn load_from(path: &Path) -> EnvResult<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EnvError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Overlay the fields that `overrides` sets.
    pub fn merge(&mut self, overrides: EnvOverrides) {
        if let Some(kind) = overrides.store_kind {
            self.store.kind = kind;
        }
        if let Some(path) = overrides.store_path {
            self.store.path = Some(path);
        }
        if let Some(dir) = overrides.asset_dir {
            self.context.asset_dir = Some(dir);
        }
        if let Some(force_mock) = overrides.force_mock {
            self.context.force_mock = force_mock;
        }
        if let Some(features) = overrides.features {
            self.features = features;
        }
        if let Some(depth) = overrides.stdin_queue {
            self.stdin_queue = depth;
        }
    }

    /// Reject values the environment cannot run with.
    pub fn validate(&self) -> EnvResult<()> {
        if self.stdin_queue == 0 {
            return Err(EnvError::Config(String::from("stdin_queue must be at least 1")));
        }
        if self.store.name.is_empty() {
            return Err(EnvError::Config(String::from("store name must not be empty")));
        }
        Ok(())
    }

    /// Directory a disk store lives in.
    pub fn store_dir(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".vos"))
    }
}

/// Explicitly set fields to overlay on a config (command line, tests).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub store_kind: Option<StoreKind>,
    pub store_path: Option<PathBuf>,
    pub asset_dir: Option<PathBuf>,
    pub force_mock: Option<bool>,
    pub features: Option<Vec<FeatureId>>,
    pub stdin_queue: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = EnvConfig::from_json_str(
            r#"{ "store": { "kind": "disk" }, "features": ["terminal"] }"#,
        )
        .unwrap();

        assert_eq!(config.store.kind, StoreKind::Disk);
        assert_eq!(config.store.name, "vos");
        assert_eq!(config.store.version, 1);
        assert_eq!(config.features, vec![FeatureId::Terminal]);
        assert_eq!(config.stdin_queue, vos_ipc::DEFAULT_STDIN_QUEUE);
        assert_eq!(config.context.module, vos_bridge::DEFAULT_MODULE);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EnvConfig::from_json_str("{}").unwrap(), EnvConfig::default());
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            EnvConfig::from_json_str(r#"{ "features": ["spreadsheet"] }"#),
            Err(EnvError::Config(_))
        ));
        assert!(matches!(
            EnvConfig::from_json_str(r#"{ "stdin_queue": 0 }"#),
            Err(EnvError::Config(_))
        ));
    }

    #[test]
    fn test_merge_only_overrides_set_fields() {
        let mut config = EnvConfig::default();
        config.features = vec![FeatureId::Editor];

        config.merge(EnvOverrides {
            force_mock: Some(true),
            store_path: Some(PathBuf::from("/tmp/vos")),
            ..Default::default()
        });

        assert!(config.context.force_mock);
        assert_eq!(config.store_dir(), PathBuf::from("/tmp/vos"));
        assert_eq!(config.features, vec![FeatureId::Editor]);
        assert_eq!(config.store.kind, StoreKind::Memory);
    }
}
