//! Context object handed to features and plugins.

use std::sync::Arc;

use vos_events::EventBus;
use vos_process::ProcessManager;
use vos_vfs::Vfs;

use crate::config::EnvConfig;

/// The subsystems of a running environment.
///
/// Owned by the environment and cloned out to consumers; there is no
/// global registry to reach them through.
#[derive(Clone)]
pub struct EnvContext {
    vfs: Arc<Vfs>,
    processes: ProcessManager,
    events: EventBus,
    config: Arc<EnvConfig>,
}

impl EnvContext {
    pub(crate) fn new(
        vfs: Arc<Vfs>,
        processes: ProcessManager,
        events: EventBus,
        config: Arc<EnvConfig>,
    ) -> Self {
        Self {
            vfs,
            processes,
            events,
            config,
        }
    }

    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    pub fn processes(&self) -> &ProcessManager {
        &self.processes
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }
}

impl std::fmt::Debug for EnvContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvContext")
            .field("vfs", &self.vfs)
            .field("processes", &self.processes)
            .finish()
    }
}
