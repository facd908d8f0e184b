//! Run configuration (`terraspec.yaml`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use tspec_provider::{ProcessLauncher, ProviderCommand};

use crate::error::CoreResult;

/// Name of the run configuration file.
pub const CONFIG_FILE: &str = "terraspec.yaml";

fn default_spec_dir() -> PathBuf {
    PathBuf::from("spec")
}

/// Settings for a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Spec root, relative to the configuration directory.
    #[serde(default = "default_spec_dir")]
    pub spec_dir: PathBuf,

    /// Provider executables by provider type.
    #[serde(default)]
    pub providers: HashMap<String, ProviderCommand>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            spec_dir: default_spec_dir(),
            providers: HashMap::new(),
        }
    }
}

impl RunnerConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: RunnerConfig = serde_yaml::from_str(&content)?;
        debug!(file = ?path, providers = config.providers.len(), "Loaded run configuration");
        Ok(config)
    }

    /// Load `terraspec.yaml` from `dir`, or defaults when there is none.
    pub fn load_or_default(dir: &Path) -> CoreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn with_spec_dir(mut self, spec_dir: impl Into<PathBuf>) -> Self {
        self.spec_dir = spec_dir.into();
        self
    }

    pub fn with_provider(mut self, provider_type: impl Into<String>, command: ProviderCommand) -> Self {
        self.providers.insert(provider_type.into(), command);
        self
    }

    /// Launcher for the configured provider executables.
    pub fn launcher(&self) -> ProcessLauncher {
        ProcessLauncher::new(self.providers.clone())
    }
}
