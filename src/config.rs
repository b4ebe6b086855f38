//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/treecompose/treecompose.toml`
//! 3. Local config: an explicit TOML file passed by the caller
//! 4. Environment variables: `TREECOMPOSE_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::ComposeError;

/// Composition engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of simultaneously open scopes per invocation (0 = unlimited)
    pub max_depth: usize,
    /// Report producers that finish with scopes still open instead of closing them
    pub strict_completion: bool,
    /// Initial capacity of the invocation registry
    pub registry_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_depth: 0,
            strict_completion: false,
            registry_capacity: 16,
        }
    }
}

/// Raw settings for intermediate parsing (`None` → not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub max_depth: Option<usize>,
    pub strict_completion: Option<bool>,
    pub registry_capacity: Option<usize>,
}

/// Get the XDG config directory for treecompose.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "treecompose").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("treecompose.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ComposeError> {
    let content = std::fs::read_to_string(path).map_err(|e| ComposeError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ComposeError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn config_err(e: ConfigError) -> ComposeError {
    ComposeError::Config {
        message: e.to_string(),
    }
}

impl Settings {
    /// Depth limit as an option, `None` when unlimited.
    pub fn depth_limit(&self) -> Option<usize> {
        (self.max_depth > 0).then_some(self.max_depth)
    }

    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            max_depth: overlay.max_depth.unwrap_or(self.max_depth),
            strict_completion: overlay.strict_completion.unwrap_or(self.strict_completion),
            registry_capacity: overlay.registry_capacity.unwrap_or(self.registry_capacity),
        }
    }

    /// Load settings with layered precedence, using the XDG global config.
    ///
    /// # Arguments
    /// * `local` - Optional local config file; must exist if given
    pub fn load(local: Option<&Path>) -> Result<Self, ComposeError> {
        Self::load_from(global_config_path().as_deref(), local)
    }

    /// Load settings from explicit global and local files.
    ///
    /// A missing global file is skipped; a missing local file is an error
    /// since the caller asked for it.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ComposeError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config
        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("load: global config {}", global_path.display());
                current = current.merge_with(&load_raw_settings(global_path)?);
            }
        }

        // 3. Local config
        if let Some(local_path) = local {
            debug!("load: local config {}", local_path.display());
            current = current.merge_with(&load_raw_settings(local_path)?);
        }

        // 4. Environment variables (explicit override)
        Self::apply_env_overrides(current)
    }

    /// Apply TREECOMPOSE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ComposeError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("TREECOMPOSE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get::<usize>("max_depth") {
            settings.max_depth = val;
        }
        if let Ok(val) = config.get_bool("strict_completion") {
            settings.strict_completion = val;
        }
        if let Ok(val) = config.get::<usize>("registry_capacity") {
            settings.registry_capacity = val;
        }

        Ok(settings)
    }
}
