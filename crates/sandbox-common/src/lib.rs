//! Shared types for the sandbox host: validated execution policy, typed
//! result model, error taxonomy, layered configuration, and structured
//! logging event names.

pub mod config_file;
pub mod error;
pub mod logging;
pub mod policy;
pub mod result;

pub use config_file::{EngineConfig, ExecutionDefaults, HostConfig, SessionConfig};
pub use error::PolicyError;
pub use policy::ExecutionPolicy;
pub use result::{
    ErrorGuidance, ErrorKind, FuelAnalysis, FuelBucket, ResultMetadata, RuntimeType, SandboxResult,
    TrapReason,
};
