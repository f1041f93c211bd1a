//! Per-execution store: WASI preview-1 context, mounts, memory limiter, and
//! captured stdio.
//!
//! Stdout and stderr are captured in memory via [`MemoryOutputPipe`], sized
//! one byte past the policy's `stdout_max_bytes`/`stderr_max_bytes` so the
//! caller can tell "exactly at the limit" from "overflowed" before it
//! truncates back down, rather than piped straight to a file descriptor. The
//! caller drains the pipes after the call completes and flushes them to the
//! per-run log files itself, which keeps this module free of filesystem
//! concerns beyond the WASI mounts.

use wasmtime::Store;
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, StoreLimits, StoreLimitsBuilder, WasiCtxBuilder};

use sandbox_common::ExecutionPolicy;

use crate::engine::WasmEngine;
use crate::error::RuntimeError;

/// Host-side state reachable from WASI host functions.
pub struct HostState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

impl HostState {
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }
}

/// A store ready to run one execution, plus handles to drain its captured
/// stdio once the call returns.
pub struct PreparedStore {
    pub store: Store<HostState>,
    pub stdout: MemoryOutputPipe,
    pub stderr: MemoryOutputPipe,
}

/// Build a store for one execution: mounts the workspace (and optional
/// vendor/data directory), caps linear memory, and sets the initial fuel
/// budget, all from a single validated [`ExecutionPolicy`].
///
/// # Errors
///
/// Returns an error if a mount cannot be attached or fuel cannot be set.
pub fn create_store(
    engine: &WasmEngine,
    policy: &ExecutionPolicy,
    argv: &[String],
) -> Result<PreparedStore, RuntimeError> {
    if engine.is_pooling_enabled() && policy.memory_bytes > engine.max_instance_memory_bytes() {
        return Err(RuntimeError::MemoryLimiterUnavailable(format!(
            "policy requests {} bytes but the engine's pooling allocator caps instances at {} bytes",
            policy.memory_bytes,
            engine.max_instance_memory_bytes()
        )));
    }

    // Capped at max_bytes + 1 so the caller can detect overflow: stdout/stderr
    // exactly at the limit must not be flagged as truncated.
    let stdout = MemoryOutputPipe::new(policy.stdout_max_bytes + 1);
    let stderr = MemoryOutputPipe::new(policy.stderr_max_bytes + 1);

    let mut builder = WasiCtxBuilder::new();
    builder
        .args(argv)
        .stdout(stdout.clone())
        .stderr(stderr.clone())
        .stdin(MemoryInputPipe::new(Vec::new()));

    for (key, value) in &policy.env {
        builder.env(key, value);
    }

    builder
        .preopened_dir(
            &policy.mount_host_dir,
            &policy.guest_mount_path,
            DirPerms::all(),
            FilePerms::all(),
        )
        .map_err(|e| RuntimeError::StoreConfig(format!("failed to mount workspace: {e}")))?;

    if let (Some(host_dir), Some(guest_path)) = (&policy.mount_data_dir, &policy.guest_data_path) {
        if host_dir.try_exists().unwrap_or(false) {
            builder
                .preopened_dir(host_dir, guest_path, DirPerms::READ, FilePerms::READ)
                .map_err(|e| RuntimeError::StoreConfig(format!("failed to mount data dir: {e}")))?;
        }
    }

    let wasi = builder.build_p1();
    let limits = StoreLimitsBuilder::new()
        .memory_size(policy.memory_bytes)
        .build();

    let mut store = Store::new(engine.inner(), HostState { wasi, limits });
    store.limiter(|state| &mut state.limits);
    store
        .set_fuel(policy.fuel_budget)
        .map_err(|e| RuntimeError::StoreConfig(format!("failed to set fuel: {e}")))?;

    Ok(PreparedStore { store, stdout, stderr })
}

/// Remaining fuel, or `None` if fuel metering was not enabled on this engine.
pub fn get_remaining_fuel(store: &Store<HostState>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Fuel spent since the budget was set, saturating at zero.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<HostState>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
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
        WasmEngine::new(&config, 32 * 1024 * 1024).unwrap()
    }

    fn test_policy(dir: &tempfile::TempDir) -> ExecutionPolicy {
        ExecutionPolicy::new(1_000_000, 16 * 1024 * 1024, 4096, 4096, dir.path(), "/app").unwrap()
    }

    #[test]
    fn test_store_creation() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine();
        let policy = test_policy(&dir);

        let prepared = create_store(&engine, &policy, &[]);
        assert!(prepared.is_ok());
    }

    #[test]
    fn test_store_fuel_matches_policy_budget() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine();
        let policy = test_policy(&dir);

        let prepared = create_store(&engine, &policy, &[]).unwrap();
        assert_eq!(get_remaining_fuel(&prepared.store), Some(1_000_000));
    }

    #[test]
    fn test_store_silently_drops_nonexistent_data_mount() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine();
        let policy = test_policy(&dir).with_data_mount("/nonexistent/xyz/abc", "/data");

        assert!(create_store(&engine, &policy, &[]).is_ok());
    }

    #[test]
    fn test_fuel_consumed_saturates() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine();
        let policy = test_policy(&dir);
        let store = create_store(&engine, &policy, &[]).unwrap().store;

        assert_eq!(calculate_fuel_consumed(100, &store), 0);
    }
}
