//! Synchronous instance lifecycle: link WASI, instantiate, call `_start`,
//! classify the outcome.
//!
//! This is the single blocking call SPEC_FULL.md §4.1 describes as `run`:
//! there is no host-side await point, so the linker and the call itself are
//! both synchronous Wasmtime APIs.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use wasmtime::{Linker, Trap};

use sandbox_common::{ExecutionPolicy, TrapReason};

use crate::engine::WasmEngine;
use crate::error::RuntimeError;
use crate::module::CompiledModule;
use crate::store::{HostState, calculate_fuel_consumed, create_store, get_remaining_fuel};

/// Outcome of one `run` call, before the runtime adapter wraps it into a
/// [`sandbox_common::SandboxResult`].
#[derive(Debug)]
pub struct RunOutcome {
    pub trapped: bool,
    pub trap_reason: Option<TrapReason>,
    pub trap_message: Option<String>,
    pub exit_code: i32,
    pub fuel_consumed: u64,
    pub memory_used_bytes: usize,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

/// Run one compiled module to completion under `policy`.
///
/// Captured stdout/stderr are flushed to `stdout.log`/`stderr.log` under
/// `logs_dir`; the directory is removed again unless `policy.preserve_logs`
/// is set.
///
/// # Errors
///
/// Returns an error if linking, instantiation, or entry-point lookup fails.
/// A guest trap is not an error: it is reported in the returned
/// [`RunOutcome`].
#[instrument(skip(engine, module, policy, argv), fields(entry_point = "_start"))]
pub fn run(
    engine: &WasmEngine,
    module: &CompiledModule,
    policy: &ExecutionPolicy,
    argv: &[String],
    logs_dir: &Path,
) -> Result<RunOutcome, RuntimeError> {
    let mut linker: Linker<HostState> = Linker::new(engine.inner());
    wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, HostState::wasi_mut)
        .map_err(|e| RuntimeError::Instantiation(format!("failed to link WASI: {e}")))?;

    let prepared = create_store(engine, policy, argv)?;
    let mut store = prepared.store;
    let initial_fuel = get_remaining_fuel(&store).unwrap_or(policy.fuel_budget);

    debug!("instantiating module");
    let instance = linker
        .instantiate(&mut store, module.inner())
        .map_err(|e| RuntimeError::Instantiation(e.to_string()))?;

    let start_func = instance
        .get_typed_func::<(), ()>(&mut store, "_start")
        .map_err(|_| RuntimeError::EntryPointNotFound("_start".into()))?;
    let memory = instance
        .get_memory(&mut store, "memory")
        .ok_or_else(|| RuntimeError::MissingMemoryExport("memory".into()))?;

    debug!("calling entry point");
    let start = Instant::now();
    let call_result = start_func.call(&mut store, ());
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let fuel_consumed = calculate_fuel_consumed(initial_fuel, &store);
    let memory_used_bytes = memory.data_size(&store);

    let (trapped, trap_reason, trap_message, exit_code) = match call_result {
        Ok(()) => {
            info!(duration_ms, fuel_consumed, "execution completed successfully");
            (false, None, None, 0)
        }
        Err(err) => {
            let (reason, message, code) = classify_failure(&err);
            if reason == TrapReason::OutOfFuel {
                warn!(duration_ms, fuel_consumed, "execution terminated: fuel exhausted");
            } else {
                error!(duration_ms, fuel_consumed, trap_message = %message, "execution trapped");
            }
            (true, Some(reason), Some(message), code)
        }
    };

    let mut stdout_bytes = prepared.stdout.contents().to_vec();
    let mut stderr_bytes = prepared.stderr.contents().to_vec();
    let stdout_truncated = stdout_bytes.len() > policy.stdout_max_bytes;
    let stderr_truncated = stderr_bytes.len() > policy.stderr_max_bytes;
    stdout_bytes.truncate(policy.stdout_max_bytes);
    stderr_bytes.truncate(policy.stderr_max_bytes);

    if let Some(message) = &trap_message {
        stderr_bytes.extend_from_slice(format!("\n[sandbox] trapped: {message}\n").as_bytes());
    }

    flush_logs(logs_dir, &stdout_bytes, &stderr_bytes, policy.preserve_logs)?;

    Ok(RunOutcome {
        trapped,
        trap_reason,
        trap_message,
        exit_code,
        fuel_consumed,
        memory_used_bytes,
        duration_ms,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        stdout_truncated,
        stderr_truncated,
    })
}

fn flush_logs(logs_dir: &Path, stdout: &[u8], stderr: &[u8], preserve: bool) -> Result<(), RuntimeError> {
    std::fs::create_dir_all(logs_dir)?;
    std::fs::write(logs_dir.join("stdout.log"), stdout)?;
    std::fs::write(logs_dir.join("stderr.log"), stderr)?;
    if !preserve {
        let _ = std::fs::remove_dir_all(logs_dir);
    }
    Ok(())
}

/// Classify a failed call into a trap reason, message, and exit code.
/// Mirrors the trap/exit substring-matching idiom used by sandboxed
/// Wasm-Python embeddings: check the strongly typed downcasts first, then
/// fall back to matching the error's display text.
fn classify_failure(err: &wasmtime::Error) -> (TrapReason, String, i32) {
    if let Some(exit) = err.downcast_ref::<wasmtime_wasi::I32Exit>() {
        return (TrapReason::ProcExit, format!("process exited with code {}", exit.0), exit.0);
    }
    if let Some(trap) = err.downcast_ref::<Trap>() {
        let reason = if *trap == Trap::OutOfFuel {
            TrapReason::OutOfFuel
        } else {
            TrapReason::Other
        };
        return (reason, format!("{trap:?}"), 1);
    }

    let message = err.to_string();
    if is_out_of_fuel_message(&message) {
        return (TrapReason::OutOfFuel, message, 1);
    }
    if message.contains("memory") && (message.contains("limit") || message.contains("exceeds")) {
        return (TrapReason::MemoryLimit, message, 1);
    }
    (TrapReason::HostError, message, 1)
}

fn is_out_of_fuel_message(message: &str) -> bool {
    message.contains("all fuel consumed") || message.contains("out of fuel")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_common::EngineConfig;

    fn test_engine() -> WasmEngine {
        let config = EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        };
        WasmEngine::new(&config, 16 * 1024 * 1024).unwrap()
    }

    fn test_policy(dir: &tempfile::TempDir, fuel: u64) -> ExecutionPolicy {
        ExecutionPolicy::new(fuel, 16 * 1024 * 1024, 4096, 4096, dir.path(), "/app").unwrap()
    }

    const SUCCESS_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (func (export "_start"))
        )
    "#;

    const UNREACHABLE_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (func (export "_start") unreachable)
        )
    "#;

    const BURN_FUEL_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (func (export "_start")
                (loop $loop
                    br $loop)))
    "#;

    #[test]
    fn test_basic_execution() {
        let dir = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let engine = test_engine();
        let module = CompiledModule::from_wat(engine.inner(), SUCCESS_WAT).unwrap();
        let policy = test_policy(&dir, 1_000_000);

        let outcome = run(&engine, &module, &policy, &[], logs.path()).unwrap();
        assert!(!outcome.trapped);
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.fuel_consumed > 0);
    }

    #[test]
    fn test_trap_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let engine = test_engine();
        let module = CompiledModule::from_wat(engine.inner(), UNREACHABLE_WAT).unwrap();
        let policy = test_policy(&dir, 1_000_000);

        let outcome = run(&engine, &module, &policy, &[], logs.path()).unwrap();
        assert!(outcome.trapped);
        assert_eq!(outcome.trap_reason, Some(TrapReason::Other));
        assert!(outcome.stderr.contains("trapped"));
    }

    #[test]
    fn test_fuel_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let engine = test_engine();
        let module = CompiledModule::from_wat(engine.inner(), BURN_FUEL_WAT).unwrap();
        let policy = test_policy(&dir, 1000);

        let outcome = run(&engine, &module, &policy, &[], logs.path()).unwrap();
        assert!(outcome.trapped);
        assert_eq!(outcome.trap_reason, Some(TrapReason::OutOfFuel));
        assert_eq!(outcome.fuel_consumed, 1000);
    }

    #[test]
    fn test_logs_removed_unless_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let logs_dir = logs.path().join("run-1");
        let engine = test_engine();
        let module = CompiledModule::from_wat(engine.inner(), SUCCESS_WAT).unwrap();
        let policy = test_policy(&dir, 1_000_000);

        run(&engine, &module, &policy, &[], &logs_dir).unwrap();
        assert!(!logs_dir.exists());

        let preserved_dir = logs.path().join("run-2");
        let policy = policy.with_preserve_logs(true);
        run(&engine, &module, &policy, &[], &preserved_dir).unwrap();
        assert!(preserved_dir.join("stdout.log").exists());
    }
}
