//! Runtime adapters that translate the generic execute contract into the
//! conventions of a specific interpreter WASI binary.
//!
//! # Modules
//!
//! - [`adapter`]: the `RuntimeAdapter` trait and the common `execute` algorithm
//! - [`python`]: CPython-on-WASI conventions, file-backed persistence
//! - [`javascript`]: QuickJS-on-WASI conventions, stdout-marker persistence
//! - [`classifier`]: post-execution error classification and fuel analysis
//! - [`vendor`]: read-only vendor/data mount path resolution

pub mod adapter;
pub mod classifier;
pub mod error;
pub mod javascript;
pub mod python;
pub mod vendor;

pub use adapter::{execute, ExecuteOptions, RuntimeAdapter};
pub use error::AdapterError;
pub use javascript::JavaScriptAdapter;
pub use python::PythonAdapter;
