//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is shared across every execution. It is configured
//! with the pooling allocator for fast instantiation and fuel metering for
//! deterministic CPU limiting.
//!
//! Unlike a server-oriented embedding, this engine does not enable
//! `async_support` or epoch interruption: an execution is a single
//! synchronous call (no coroutines, no host-side await points), and
//! wall-clock cutoffs are left to whatever process supervises the host
//! rather than built into the engine itself.

use std::sync::Arc;

use tracing::{debug, info};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, PoolingAllocationConfig};

use sandbox_common::EngineConfig;

use crate::error::RuntimeError;

/// Thread-safe WebAssembly engine wrapper.
///
/// Contains no per-request state and can be shared across every session.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
    max_instance_memory_bytes: usize,
}

impl WasmEngine {
    /// Create a new engine. `max_instance_memory_bytes` bounds the pooling
    /// allocator's per-instance memory reservation; it must be at least as
    /// large as the largest `ExecutionPolicy::memory_bytes` this engine will
    /// ever be asked to run.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid or the
    /// engine cannot be initialized.
    pub fn new(config: &EngineConfig, max_instance_memory_bytes: usize) -> Result<Self, RuntimeError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.consume_fuel(true);
        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        if config.pooling_allocator {
            let pooling_config = Self::create_pooling_config(config, max_instance_memory_bytes);

            wasmtime_config
                .allocation_strategy(InstanceAllocationStrategy::Pooling(pooling_config));

            info!(
                max_instances = config.max_instances,
                max_instance_memory_bytes, "Pooling allocator enabled"
            );
        }

        if config.cache_compiled_modules {
            if let Some(ref cache_dir) = config.cache_dir {
                debug!(cache_dir = %cache_dir, "Module caching configured");
            }
        }

        let engine = Engine::new(&wasmtime_config)
            .map_err(|e| RuntimeError::EngineInit(e.to_string()))?;

        info!("Wasmtime engine initialized");

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
            max_instance_memory_bytes,
        })
    }

    /// Create pooling allocation configuration.
    fn create_pooling_config(
        config: &EngineConfig,
        max_instance_memory_bytes: usize,
    ) -> PoolingAllocationConfig {
        let mut pooling = PoolingAllocationConfig::default();

        pooling.total_core_instances(config.max_instances);
        pooling.total_memories(config.max_instances);
        pooling.total_tables(config.max_instances);
        pooling.max_memory_size(max_instance_memory_bytes);

        pooling
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check if the pooling allocator is enabled.
    pub fn is_pooling_enabled(&self) -> bool {
        self.config.pooling_allocator
    }

    /// The hard per-instance memory reservation this engine was built with.
    ///
    /// When the pooling allocator is enabled, a policy's `memory_bytes` above
    /// this bound can never be enforced by the store's soft limiter: the
    /// pool's own hard cap would abort the instance first.
    pub fn max_instance_memory_bytes(&self) -> usize {
        self.max_instance_memory_bytes
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("pooling_allocator", &self.config.pooling_allocator)
            .field("max_instances", &self.config.max_instances)
            .finish_non_exhaustive()
    }
}
