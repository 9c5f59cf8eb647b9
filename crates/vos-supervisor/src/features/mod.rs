//! Optional headless features.
//!
//! The registry is closed: [`FeatureId`] enumerates every feature and
//! [`FeatureId::load`] is the only factory. Adding a feature means adding a
//! variant, so an unknown name can only come from outside (config, CLI) and
//! is rejected at parse time.

mod editor;
mod terminal;

pub use editor::EditorFeature;
pub use terminal::{CommandOutput, TerminalFeature};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::EnvContext;
use crate::error::{EnvError, EnvResult};

/// Identifier of a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureId {
    /// Buffer editing over the VFS
    Editor,
    /// Command-line runner over the process manager
    Terminal,
}

impl FeatureId {
    /// Every registered feature.
    pub const ALL: [FeatureId; 2] = [FeatureId::Editor, FeatureId::Terminal];

    /// Registry name.
    pub fn name(self) -> &'static str {
        match self {
            FeatureId::Editor => "editor",
            FeatureId::Terminal => "terminal",
        }
    }

    /// Construct the feature over `ctx`.
    pub(crate) fn load(self, ctx: &EnvContext) -> LoadedFeature {
        match self {
            FeatureId::Editor => LoadedFeature::Editor(Arc::new(EditorFeature::new(ctx.clone()))),
            FeatureId::Terminal => {
                LoadedFeature::Terminal(Arc::new(TerminalFeature::new(ctx.clone())))
            }
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureId {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| EnvError::UnknownFeature(s.to_string()))
    }
}

/// A loaded feature instance.
#[derive(Clone, Debug)]
pub enum LoadedFeature {
    Editor(Arc<EditorFeature>),
    Terminal(Arc<TerminalFeature>),
}

impl LoadedFeature {
    pub fn id(&self) -> FeatureId {
        match self {
            LoadedFeature::Editor(_) => FeatureId::Editor,
            LoadedFeature::Terminal(_) => FeatureId::Terminal,
        }
    }

    /// Release the feature's resources.
    pub(crate) async fn destroy(&self) -> EnvResult<()> {
        match self {
            LoadedFeature::Editor(editor) => {
                editor.close_all();
                Ok(())
            }
            LoadedFeature::Terminal(terminal) => terminal.destroy().await,
        }
    }
}
