//! Layered configuration for the sandbox host.
//!
//! `HostConfig` groups engine tuning, default policy values, and session
//! housekeeping settings. Loading is layered, built-in defaults first, then
//! an optional TOML file, then `SANDBOX_`-prefixed environment variables,
//! via the `config` crate. It is purely additive: it never changes the
//! semantics of a validated `ExecutionPolicy`, only provides one way to
//! build the defaults such a policy is constructed from.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration file structure, loadable from TOML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HostConfig {
    /// Wasmtime engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Default execution limits; overridden per-call by an explicit `ExecutionPolicy`.
    #[serde(default)]
    pub execution: ExecutionDefaults,
    /// Session workspace housekeeping.
    #[serde(default)]
    pub session: SessionConfig,
}

impl HostConfig {
    /// Load configuration layered from a TOML file and `SANDBOX_`-prefixed
    /// environment variable overrides (e.g. `SANDBOX_EXECUTION__FUEL_BUDGET`
    /// overrides `execution.fuel_budget`), via the `config` crate. Built-in
    /// defaults fill any field neither layer sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment variable override cannot be coerced into its field's type.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        Self::load(Some(path.as_ref()))
    }

    /// Layered load with an optional file source. `None` loads from
    /// defaults and environment overrides alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment variable override cannot be coerced into its field's type.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigFileError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        let built = builder
            .add_source(
                config::Environment::with_prefix("SANDBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Parse configuration from a TOML string, with no environment layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Wasmtime engine tuning. Deliberately omits epoch interruption: wall-clock
/// cutoffs are left to whatever process supervises the host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable the pooling allocator for fast instance creation.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,
    /// Maximum concurrent instances in the pool.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,
    /// Enable caching of compiled modules to disk.
    #[serde(default = "defaults::cache_compiled_modules")]
    pub cache_compiled_modules: bool,
    /// Directory for the compiled-module cache.
    #[serde(default)]
    pub cache_dir: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            cache_compiled_modules: defaults::cache_compiled_modules(),
            cache_dir: Some("./cache".into()),
        }
    }
}

/// Default `ExecutionPolicy` values. A caller constructs an actual
/// `ExecutionPolicy` from these plus a workspace path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionDefaults {
    #[serde(default = "defaults::fuel_budget")]
    pub fuel_budget: u64,
    #[serde(default = "defaults::memory_bytes")]
    pub memory_bytes: usize,
    #[serde(default = "defaults::stdout_max_bytes")]
    pub stdout_max_bytes: usize,
    #[serde(default = "defaults::stderr_max_bytes")]
    pub stderr_max_bytes: usize,
    #[serde(default)]
    pub preserve_logs: bool,
}

impl Default for ExecutionDefaults {
    fn default() -> Self {
        Self {
            fuel_budget: defaults::fuel_budget(),
            memory_bytes: defaults::memory_bytes(),
            stdout_max_bytes: defaults::stdout_max_bytes(),
            stderr_max_bytes: defaults::stderr_max_bytes(),
            preserve_logs: false,
        }
    }
}

/// Session workspace housekeeping settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Root directory under which every session workspace is created.
    #[serde(default = "defaults::workspace_root")]
    pub workspace_root: String,
    /// Default age threshold, in hours, for `prune`.
    #[serde(default = "defaults::prune_after_hours")]
    pub prune_after_hours: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_root: defaults::workspace_root(),
            prune_after_hours: defaults::prune_after_hours(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("failed to load layered configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        true
    }

    pub const fn max_instances() -> u32 {
        1000
    }

    pub const fn cache_compiled_modules() -> bool {
        true
    }

    pub const fn fuel_budget() -> u64 {
        crate::policy::defaults::fuel_budget()
    }

    pub const fn memory_bytes() -> usize {
        crate::policy::defaults::memory_bytes()
    }

    pub const fn stdout_max_bytes() -> usize {
        crate::policy::defaults::stdout_max_bytes()
    }

    pub const fn stderr_max_bytes() -> usize {
        crate::policy::defaults::stderr_max_bytes()
    }

    pub fn workspace_root() -> String {
        "./sandbox-workspaces".to_string()
    }

    pub const fn prune_after_hours() -> u64 {
        24
    }
}
