//! Host executor: a configured Wasmtime engine, a per-execution store, and
//! the synchronous instance lifecycle that runs one guest module to
//! completion.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  WasmEngine                  │
//! │   shared across every execution, stateless   │
//! └─────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │               CompiledModule                 │
//! └─────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │         Store<HostState> + Instance          │
//! │   fuel metering, memory cap, captured stdio   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod instance;
pub mod module;
pub mod store;

pub use engine::WasmEngine;
pub use error::RuntimeError;
pub use instance::{RunOutcome, run};
pub use module::CompiledModule;
pub use store::HostState;
