//! Execution context bootstrap.
//!
//! The context is started from two assets: a module (the code it runs) and a
//! payload (its initial data). The [`ContextLoader`] resolves their logical
//! names against an [`AssetSource`] and fetches the bytes, caching them by
//! URL so a second environment in the same process does not fetch again.
//!
//! [`select_bridge`] is the capability probe: if the loader yields a handle
//! the worker bridge is started from it, otherwise the mock bridge is used.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::bridge::ExecutionBridge;
use crate::error::{BridgeError, BridgeResult};
use crate::mock::MockBridge;
use crate::worker::WorkerBridge;

/// Default logical name of the context module.
pub const DEFAULT_MODULE: &str = "context.wasm";

/// Default logical name of the context payload.
pub const DEFAULT_PAYLOAD: &str = "context.data";

// =============================================================================
// Asset sources
// =============================================================================

/// Where context assets come from.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Map a logical asset name to a URL, or `None` if it does not exist.
    async fn resolve(&self, name: &str) -> Option<String>;

    /// Fetch the bytes behind a resolved URL.
    async fn fetch(&self, url: &str) -> BridgeResult<Vec<u8>>;
}

/// Assets served from a host directory as `file://` URLs.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Serve assets from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetSource for DirectorySource {
    async fn resolve(&self, name: &str) -> Option<String> {
        let path = self.root.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(format!("file://{}", path.display())),
            _ => None,
        }
    }

    async fn fetch(&self, url: &str) -> BridgeResult<Vec<u8>> {
        let path = url
            .strip_prefix("file://")
            .ok_or_else(|| BridgeError::Asset(format!("unsupported url: {}", url)))?;
        tokio::fs::read(path)
            .await
            .map_err(|e| BridgeError::Asset(format!("{}: {}", url, e)))
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Everything needed to start an isolated context.
#[derive(Clone, Debug)]
pub struct ContextHandle {
    /// Resolved module URL
    pub module_url: String,
    /// Module bytes
    pub module: Arc<Vec<u8>>,
    /// Payload bytes
    pub payload: Arc<Vec<u8>>,
}

/// Resolves and fetches context assets with a cache-or-fetch rule.
pub struct ContextLoader {
    source: Option<Arc<dyn AssetSource>>,
    module: String,
    payload: String,
    cache: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

impl ContextLoader {
    /// Loader with no asset source; [`ContextLoader::load`] always fails.
    pub fn unconfigured() -> Self {
        Self {
            source: None,
            module: DEFAULT_MODULE.to_string(),
            payload: DEFAULT_PAYLOAD.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Loader over `source` with the default asset names.
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source: Some(source),
            ..Self::unconfigured()
        }
    }

    /// Override the logical module and payload names.
    pub fn with_names(mut self, module: impl Into<String>, payload: impl Into<String>) -> Self {
        self.module = module.into();
        self.payload = payload.into();
        self
    }

    /// True if an asset source is configured.
    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// Number of cached URLs.
    pub fn cached(&self) -> usize {
        self.lock_cache().len()
    }

    /// Resolve and fetch the module and payload.
    pub async fn load(&self) -> BridgeResult<ContextHandle> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| BridgeError::Asset(String::from("no asset source configured")))?;

        let module_url = self.resolve(source.as_ref(), &self.module).await?;
        let payload_url = self.resolve(source.as_ref(), &self.payload).await?;
        let module = self.fetch_cached(source.as_ref(), &module_url).await?;
        let payload = self.fetch_cached(source.as_ref(), &payload_url).await?;

        debug!(
            target: "vos::bridge",
            module = %module_url,
            module_len = module.len(),
            payload_len = payload.len(),
            "context assets loaded"
        );
        Ok(ContextHandle {
            module_url,
            module,
            payload,
        })
    }

    async fn resolve(&self, source: &dyn AssetSource, name: &str) -> BridgeResult<String> {
        source
            .resolve(name)
            .await
            .ok_or_else(|| BridgeError::Asset(format!("asset not found: {}", name)))
    }

    async fn fetch_cached(
        &self,
        source: &dyn AssetSource,
        url: &str,
    ) -> BridgeResult<Arc<Vec<u8>>> {
        let cached = self.lock_cache().get(url).cloned();
        if let Some(bytes) = cached {
            return Ok(bytes);
        }
        let bytes = Arc::new(source.fetch(url).await?);
        self.lock_cache().insert(url.to_string(), bytes.clone());
        Ok(bytes)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Vec<u8>>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ContextLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLoader")
            .field("configured", &self.is_configured())
            .field("module", &self.module)
            .field("payload", &self.payload)
            .finish()
    }
}

// =============================================================================
// Probe
// =============================================================================

/// Pick a bridge: the worker if the loader yields a context, else the mock.
///
/// Must be called from within a tokio runtime.
pub async fn select_bridge(loader: &ContextLoader, force_mock: bool) -> Arc<dyn ExecutionBridge> {
    if force_mock {
        info!(target: "vos::bridge", "mock bridge forced by configuration");
        return Arc::new(MockBridge::new());
    }

    let handle = match loader.load().await {
        Ok(handle) => handle,
        Err(e) => {
            info!(target: "vos::bridge", reason = %e, "no loadable context, using mock bridge");
            return Arc::new(MockBridge::new());
        }
    };

    match WorkerBridge::start(handle) {
        Ok(worker) => Arc::new(worker),
        Err(e) => {
            warn!(target: "vos::bridge", error = %e, "worker failed to start, using mock bridge");
            Arc::new(MockBridge::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl AssetSource for CountingSource {
        async fn resolve(&self, name: &str) -> Option<String> {
            (name != "missing").then(|| format!("mem://{}", name))
        }

        async fn fetch(&self, url: &str) -> BridgeResult<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(url.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn test_fetches_are_cached_by_url() {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
        });
        let loader = ContextLoader::new(source.clone());

        let first = loader.load().await.unwrap();
        let second = loader.load().await.unwrap();

        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(loader.cached(), 2);
        assert!(Arc::ptr_eq(&first.module, &second.module));
        assert_eq!(first.module_url, "mem://context.wasm");
    }

    #[tokio::test]
    async fn test_unresolved_asset_fails() {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
        });
        let loader = ContextLoader::new(source).with_names("missing", "context.data");
        assert!(matches!(loader.load().await, Err(BridgeError::Asset(_))));
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_mock() {
        let bridge = select_bridge(&ContextLoader::unconfigured(), false).await;
        assert_eq!(bridge.kind(), BridgeKind::Mock);

        let dir = tempfile::tempdir().unwrap();
        let loader = ContextLoader::new(Arc::new(DirectorySource::new(dir.path())));
        let bridge = select_bridge(&loader, false).await;
        assert_eq!(bridge.kind(), BridgeKind::Mock);
    }

    #[tokio::test]
    async fn test_probe_starts_worker_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_MODULE), b"\0asm").unwrap();
        std::fs::write(dir.path().join(DEFAULT_PAYLOAD), b"{}").unwrap();
        let loader = ContextLoader::new(Arc::new(DirectorySource::new(dir.path())));

        let bridge = select_bridge(&loader, false).await;
        assert_eq!(bridge.kind(), BridgeKind::Worker);
        bridge.initialize().await.unwrap();
        bridge.terminate().await.unwrap();

        let forced = select_bridge(&loader, true).await;
        assert_eq!(forced.kind(), BridgeKind::Mock);
    }
}
