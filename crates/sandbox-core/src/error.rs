//! Errors raised while preparing or running a single execution.
//!
//! This is a host-execution error: a module failed to compile, the engine
//! could not be configured, or the instance trapped before the runtime
//! adapter had a chance to classify it. [`sandbox_common::PolicyError`]
//! covers invalid configuration before a run ever starts.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to initialize the Wasmtime engine: {0}")]
    EngineInit(String),

    #[error("module compilation failed: {0}")]
    CompilationFailed(String),

    #[error("instantiation failed: {0}")]
    Instantiation(String),

    #[error("entry point '{0}' not found")]
    EntryPointNotFound(String),

    #[error("required export '{0}' not found")]
    MissingMemoryExport(String),

    #[error("memory limiting is not available: {0}")]
    MemoryLimiterUnavailable(String),

    #[error("failed to configure the store: {0}")]
    StoreConfig(String),

    #[error("log file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn compilation_failed(message: impl Into<String>) -> Self {
        Self::CompilationFailed(message.into())
    }
}
