//! The environment orchestrator.
//!
//! Lifecycle:
//!
//! ```text
//!   Created ──init()──► Ready ──dispose()──► Disposed
//!      │                                        ▲
//!      └───────────────dispose()────────────────┘
//! ```
//!
//! A failed `init()` leaves the environment in `Created`; nothing that was
//! brought up before the failing step is torn down.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use vos_bridge::{
    select_bridge, AssetSource, BridgeKind, ContextLoader, DirectorySource, ExecutionBridge,
};
use vos_events::{Event, EventBus, SubscriptionId, Topic};
use vos_process::{Process, ProcessManager, SpawnOptions};
use vos_vfs::{DiskStore, EntryStore, MemoryStore, Vfs};

use crate::config::{EnvConfig, StoreKind};
use crate::context::EnvContext;
use crate::error::{EnvError, EnvResult, InitStep};
use crate::features::{EditorFeature, FeatureId, LoadedFeature, TerminalFeature};
use crate::mount::{mount_into, MountTree};
use crate::plugin::{destroy_all, Plugin, PluginRegistry};

/// Callback invoked with the error of a failed `init()`.
pub type ErrorCallback = Arc<dyn Fn(&EnvError) + Send + Sync>;

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Environment`].
#[derive(Default)]
pub struct EnvironmentBuilder {
    config: EnvConfig,
    on_error: Option<ErrorCallback>,
    plugins: Vec<Arc<dyn Plugin>>,
    asset_source: Option<Arc<dyn AssetSource>>,
    store: Option<Arc<dyn EntryStore>>,
    events: Option<EventBus>,
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EnvConfig) -> Self {
        self.config = config;
        self
    }

    /// Called when `init()` fails, after the `error` event is published.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&EnvError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Asset source for the execution context. Takes precedence over
    /// `context.asset_dir`.
    pub fn asset_source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.asset_source = Some(source);
        self
    }

    /// Use this store instead of opening one from the config.
    pub fn store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing event bus.
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate and create an uninitialized environment.
    pub fn build(self) -> EnvResult<Environment> {
        self.config.validate()?;

        let mut registry = PluginRegistry::new();
        for plugin in self.plugins {
            registry.register(plugin)?;
        }

        Ok(Environment {
            config: Arc::new(self.config),
            events: self.events.unwrap_or_default(),
            on_error: self.on_error,
            asset_source: self.asset_source,
            store: self.store,
            state: Mutex::new(EnvState {
                phase: Phase::Created,
                plugins: registry,
            }),
        })
    }

    /// Build and initialize.
    pub async fn start(self) -> EnvResult<Environment> {
        let env = self.build()?;
        env.init().await?;
        Ok(env)
    }
}

// =============================================================================
// Environment
// =============================================================================

struct Running {
    store: Arc<dyn EntryStore>,
    bridge: Arc<dyn ExecutionBridge>,
    ctx: EnvContext,
    features: BTreeMap<FeatureId, LoadedFeature>,
}

enum Phase {
    Created,
    Ready(Box<Running>),
    Disposed,
}

struct EnvState {
    phase: Phase,
    plugins: PluginRegistry,
}

/// A virtual OS environment: store, execution context, VFS and processes.
pub struct Environment {
    config: Arc<EnvConfig>,
    events: EventBus,
    on_error: Option<ErrorCallback>,
    asset_source: Option<Arc<dyn AssetSource>>,
    store: Option<Arc<dyn EntryStore>>,
    state: Mutex<EnvState>,
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    /// Build an environment from a config with no other customization.
    pub fn new(config: EnvConfig) -> EnvResult<Self> {
        EnvironmentBuilder::new().config(config).build()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Bring every subsystem up, in order, and publish `ready`.
    ///
    /// Calling `init()` on a ready environment does nothing.
    pub async fn init(&self) -> EnvResult<()> {
        let mut state = self.state.lock().await;
        match state.phase {
            Phase::Created => {}
            Phase::Ready(_) => return Ok(()),
            Phase::Disposed => return Err(EnvError::Disposed),
        }

        info!(target: "vos::supervisor", "initializing environment");
        match self.boot(&state.plugins).await {
            Ok(running) => {
                let kind = running.bridge.kind();
                state.phase = Phase::Ready(Box::new(running));
                drop(state);

                info!(target: "vos::supervisor", bridge = %kind, "environment ready");
                self.events.publish(Event::Ready);
                Ok(())
            }
            Err(e) => {
                drop(state);

                error!(target: "vos::supervisor", error = %e, "environment initialization failed");
                self.events.publish(Event::Error {
                    message: e.to_string(),
                });
                if let Some(callback) = &self.on_error {
                    callback(&e);
                }
                Err(e)
            }
        }
    }

    async fn boot(&self, plugins: &PluginRegistry) -> EnvResult<Running> {
        let store = self
            .open_store()
            .await
            .map_err(|e| EnvError::at(InitStep::Store, e))?;

        let bridge = self
            .start_bridge()
            .await
            .map_err(|e| EnvError::at(InitStep::Bridge, e))?;

        let vfs = Vfs::new(store.clone(), self.events.clone())
            .await
            .map_err(|e| EnvError::at(InitStep::Vfs, e.into()))?;
        let vfs = Arc::new(vfs);

        let processes = self.create_process_manager(bridge.clone(), vfs.clone());

        let ctx = EnvContext::new(vfs, processes, self.events.clone(), self.config.clone());

        let mut features = BTreeMap::new();
        for id in &self.config.features {
            features
                .entry(*id)
                .or_insert_with(|| id.load(&ctx));
            debug!(target: "vos::supervisor", feature = %id, "feature loaded");
        }

        for plugin in plugins.plugins() {
            plugin
                .initialize(&ctx)
                .await
                .map_err(|e| EnvError::at(InitStep::Plugins, e))?;
            debug!(target: "vos::supervisor", plugin = plugin.name(), "plugin initialized");
        }

        Ok(Running {
            store,
            bridge,
            ctx,
            features,
        })
    }

    async fn open_store(&self) -> EnvResult<Arc<dyn EntryStore>> {
        if let Some(store) = &self.store {
            return Ok(store.clone());
        }
        let config = &self.config.store;
        let store: Arc<dyn EntryStore> = match config.kind {
            StoreKind::Memory => Arc::new(MemoryStore::new(config.name.clone())),
            StoreKind::Disk => Arc::new(
                DiskStore::open(self.config.store_dir(), &config.name, config.version).await?,
            ),
        };
        Ok(store)
    }

    async fn start_bridge(&self) -> EnvResult<Arc<dyn ExecutionBridge>> {
        let config = &self.config.context;
        let source = self.asset_source.clone().or_else(|| {
            config
                .asset_dir
                .as_ref()
                .map(|dir| Arc::new(DirectorySource::new(dir.clone())) as Arc<dyn AssetSource>)
        });
        let loader = match source {
            Some(source) => ContextLoader::new(source),
            None => ContextLoader::unconfigured(),
        }
        .with_names(&config.module, &config.payload);

        let bridge = select_bridge(&loader, config.force_mock).await;
        bridge.initialize().await?;
        Ok(bridge)
    }

    fn create_process_manager(
        &self,
        bridge: Arc<dyn ExecutionBridge>,
        vfs: Arc<Vfs>,
    ) -> ProcessManager {
        ProcessManager::new(bridge, vfs, self.events.clone())
            .with_stdin_queue(self.config.stdin_queue)
    }

    /// Tear everything down. Safe to call more than once.
    ///
    /// Order: plugins, features, processes, execution context, store.
    /// Failures are logged and do not stop the remaining steps.
    pub async fn dispose(&self) {
        let mut state = self.state.lock().await;
        let phase = std::mem::replace(&mut state.phase, Phase::Disposed);
        let plugins = state.plugins.drain();

        let Phase::Ready(running) = phase else {
            return;
        };
        info!(target: "vos::supervisor", "disposing environment");

        destroy_all(plugins).await;

        for feature in running.features.values() {
            if let Err(e) = feature.destroy().await {
                warn!(
                    target: "vos::supervisor",
                    feature = %feature.id(),
                    error = %e,
                    "feature destroy failed"
                );
            }
        }

        if let Err(e) = running.ctx.processes().kill_all().await {
            warn!(target: "vos::supervisor", error = %e, "failed to kill every process");
        }

        if let Err(e) = running.bridge.terminate().await {
            warn!(target: "vos::supervisor", error = %e, "execution context did not terminate cleanly");
        }

        if let Err(e) = running.store.close().await {
            warn!(target: "vos::supervisor", error = %e, "store close failed");
        }

        info!(target: "vos::supervisor", "environment disposed");
    }

    pub async fn is_ready(&self) -> bool {
        matches!(self.state.lock().await.phase, Phase::Ready(_))
    }

    pub async fn is_disposed(&self) -> bool {
        matches!(self.state.lock().await.phase, Phase::Disposed)
    }

    // -------------------------------------------------------------------------
    // Subsystems
    // -------------------------------------------------------------------------

    /// The context handed to features and plugins.
    pub async fn context(&self) -> EnvResult<EnvContext> {
        let state = self.state.lock().await;
        Ok(running(&state.phase)?.ctx.clone())
    }

    pub async fn vfs(&self) -> EnvResult<Arc<Vfs>> {
        Ok(self.context().await?.vfs().clone())
    }

    pub async fn processes(&self) -> EnvResult<ProcessManager> {
        Ok(self.context().await?.processes().clone())
    }

    /// Which bridge variant the execution context runs on.
    pub async fn bridge_kind(&self) -> EnvResult<BridgeKind> {
        let state = self.state.lock().await;
        Ok(running(&state.phase)?.bridge.kind())
    }

    /// Mount a tree at the VFS root.
    pub async fn mount(&self, tree: &MountTree) -> EnvResult<usize> {
        self.mount_at("/", tree).await
    }

    /// Mount a tree under `base`. Returns the number of files written.
    pub async fn mount_at(&self, base: &str, tree: &MountTree) -> EnvResult<usize> {
        let vfs = self.vfs().await?;
        mount_into(&vfs, base, tree).await
    }

    /// Spawn a process.
    pub async fn spawn(
        &self,
        command: &str,
        args: &[&str],
        options: SpawnOptions,
    ) -> EnvResult<Process> {
        let processes = self.processes().await?;
        Ok(processes.spawn(command, args, options).await?)
    }

    // -------------------------------------------------------------------------
    // Features and plugins
    // -------------------------------------------------------------------------

    /// Load a feature, or return the already loaded instance.
    pub async fn load_feature(&self, id: FeatureId) -> EnvResult<LoadedFeature> {
        let mut state = self.state.lock().await;
        let running = running_mut(&mut state.phase)?;
        let ctx = running.ctx.clone();
        let feature = running
            .features
            .entry(id)
            .or_insert_with(|| {
                debug!(target: "vos::supervisor", feature = %id, "feature loaded");
                id.load(&ctx)
            })
            .clone();
        Ok(feature)
    }

    /// Load a feature by registry name.
    pub async fn load_feature_by_name(&self, name: &str) -> EnvResult<LoadedFeature> {
        self.load_feature(name.parse()?).await
    }

    /// Ids of the loaded features.
    pub async fn loaded_features(&self) -> Vec<FeatureId> {
        match &self.state.lock().await.phase {
            Phase::Ready(running) => running.features.keys().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// The terminal feature, loading it if needed.
    pub async fn terminal(&self) -> EnvResult<Arc<TerminalFeature>> {
        match self.load_feature(FeatureId::Terminal).await? {
            LoadedFeature::Terminal(terminal) => Ok(terminal),
            other => Err(EnvError::UnknownFeature(other.id().to_string())),
        }
    }

    /// The editor feature, loading it if needed.
    pub async fn editor(&self) -> EnvResult<Arc<EditorFeature>> {
        match self.load_feature(FeatureId::Editor).await? {
            LoadedFeature::Editor(editor) => Ok(editor),
            other => Err(EnvError::UnknownFeature(other.id().to_string())),
        }
    }

    /// Register a plugin. On a ready environment it is initialized at once.
    pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> EnvResult<()> {
        let mut state = self.state.lock().await;
        if matches!(state.phase, Phase::Disposed) {
            return Err(EnvError::Disposed);
        }
        state.plugins.register(plugin.clone())?;

        let ctx = match &state.phase {
            Phase::Ready(running) => Some(running.ctx.clone()),
            _ => None,
        };
        drop(state);
        if let Some(ctx) = ctx {
            plugin.initialize(&ctx).await?;
            debug!(target: "vos::supervisor", plugin = plugin.name(), "plugin initialized");
        }
        Ok(())
    }

    /// Names of registered plugins, in registration order.
    pub async fn plugins(&self) -> Vec<String> {
        self.state.lock().await.plugins.names()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Subscribe to a topic.
    pub fn on<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(topic, handler)
    }

    /// Remove a subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn running(phase: &Phase) -> EnvResult<&Running> {
    match phase {
        Phase::Ready(running) => Ok(&**running),
        Phase::Created => Err(EnvError::NotInitialized),
        Phase::Disposed => Err(EnvError::Disposed),
    }
}

fn running_mut(phase: &mut Phase) -> EnvResult<&mut Running> {
    match phase {
        Phase::Ready(running) => Ok(&mut **running),
        Phase::Created => Err(EnvError::NotInitialized),
        Phase::Disposed => Err(EnvError::Disposed),
    }
}
