//! WebAssembly module compilation.
//!
//! [`CompiledModule`] wraps a Wasmtime [`Module`]. Only core WASI modules are
//! supported: SPEC_FULL.md's guest contract is `_start` plus an exported
//! `memory`, with no Component Model story, so this module carries neither a
//! component variant nor the AOT-cache bookkeeping the teacher built for its
//! own server-side hot path.

use std::path::Path;
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, Module};

use crate::error::RuntimeError;

/// A compiled WebAssembly module, ready to instantiate.
#[derive(Clone)]
pub struct CompiledModule {
    inner: Module,
    compiled_at: Instant,
}

impl CompiledModule {
    /// Compile a core module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Wasm module or
    /// compilation fails.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        Self::validate_wasm_header(bytes)?;

        let start = Instant::now();
        let module = Module::new(engine, bytes)
            .map_err(|e| RuntimeError::compilation_failed(format!("module compilation failed: {e}")))?;

        info!(duration_ms = start.elapsed().as_millis(), "module compiled");

        Ok(Self {
            inner: module,
            compiled_at: Instant::now(),
        })
    }

    /// Load a module from a `.wasm` file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not compile.
    pub fn from_file(engine: &Engine, path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(engine, &bytes)
    }

    /// Compile a core module from WAT. Used by tests and by runtimes that
    /// embed their interpreter as inline WAT fixtures.
    ///
    /// # Errors
    ///
    /// Returns an error if the WAT does not parse or compile.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        let start = Instant::now();
        let module = Module::new(engine, wat)
            .map_err(|e| RuntimeError::compilation_failed(format!("WAT compilation failed: {e}")))?;

        info!(duration_ms = start.elapsed().as_millis(), "WAT module compiled");

        Ok(Self {
            inner: module,
            compiled_at: Instant::now(),
        })
    }

    /// The underlying Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// When this module was compiled, for cache-age diagnostics.
    pub fn compiled_at(&self) -> Instant {
        self.compiled_at
    }

    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compilation_failed("invalid Wasm: file too small"));
        }
        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compilation_failed("invalid Wasm: bad magic number"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WasmEngine;
    use sandbox_common::EngineConfig;

    const MINIMAL_WASM: &[u8] = &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    fn test_engine() -> WasmEngine {
        let config = EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        };
        WasmEngine::new(&config, 16 * 1024 * 1024).unwrap()
    }

    #[test]
    fn test_validate_wasm_header_valid() {
        assert!(CompiledModule::validate_wasm_header(MINIMAL_WASM).is_ok());
    }

    #[test]
    fn test_validate_wasm_header_too_small() {
        assert!(CompiledModule::validate_wasm_header(&[0x00, 0x61]).is_err());
    }

    #[test]
    fn test_validate_wasm_header_bad_magic() {
        let bad = &[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        assert!(CompiledModule::validate_wasm_header(bad).is_err());
    }

    #[test]
    fn test_module_compilation() {
        let engine = test_engine();
        let module = CompiledModule::from_bytes(engine.inner(), MINIMAL_WASM);
        assert!(module.is_ok());
    }

    #[test]
    fn test_module_debug() {
        let engine = test_engine();
        let module = CompiledModule::from_bytes(engine.inner(), MINIMAL_WASM).unwrap();
        assert!(format!("{module:?}").contains("CompiledModule"));
    }

    #[test]
    fn test_wat_module_with_start_and_memory() {
        let engine = test_engine();
        let wat = r#"
            (module
                (memory (export "memory") 1)
                (func (export "_start"))
            )
        "#;
        assert!(CompiledModule::from_wat(engine.inner(), wat).is_ok());
    }
}
