//! Errors raised by the runtime adapters, distinct from a guest trap (which
//! is a normal, successfully-reported outcome, not an error).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("interpreter binary not found: {0}")]
    WasmBinaryNotFound(String),

    #[error(transparent)]
    Core(#[from] sandbox_core::RuntimeError),

    #[error(transparent)]
    Session(#[from] sandbox_session::SessionError),

    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
}
