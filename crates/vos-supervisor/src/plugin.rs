//! Plugin registry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::EnvContext;
use crate::error::{EnvError, EnvResult};

/// An extension initialized with the environment's context.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    /// Called once, after every subsystem is up.
    async fn initialize(&self, ctx: &EnvContext) -> EnvResult<()>;

    /// Release resources on disposal.
    async fn destroy(&self) -> EnvResult<()> {
        Ok(())
    }
}

/// Registered plugins, in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. Names are unique.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> EnvResult<()> {
        if self.contains(plugin.name()) {
            return Err(EnvError::PluginAlreadyRegistered(plugin.name().to_string()));
        }
        debug!(target: "vos::supervisor", plugin = plugin.name(), "plugin registered");
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Snapshot of the registered plugins.
    pub(crate) fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins.clone()
    }

    /// Remove every plugin.
    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn Plugin>> {
        std::mem::take(&mut self.plugins)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Destroy plugins in reverse registration order, logging failures.
pub(crate) async fn destroy_all(plugins: Vec<Arc<dyn Plugin>>) {
    for plugin in plugins.into_iter().rev() {
        if let Err(e) = plugin.destroy().await {
            warn!(
                target: "vos::supervisor",
                plugin = plugin.name(),
                error = %e,
                "plugin destroy failed"
            );
        }
    }
}
