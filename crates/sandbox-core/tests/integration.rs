//! Integration tests for the host executor: compile a WAT module, run it end
//! to end through the engine, store, and instance lifecycle, and check the
//! observable outcome. Execution is synchronous, so these are plain `#[test]`
//! functions rather than the teacher's `#[tokio::test]`.

use sandbox_common::{EngineConfig, ExecutionPolicy};
use sandbox_core::{CompiledModule, WasmEngine, run};

fn engine() -> WasmEngine {
    let config = EngineConfig {
        pooling_allocator: false,
        ..Default::default()
    };
    WasmEngine::new(&config, 16 * 1024 * 1024).unwrap()
}

fn policy(dir: &tempfile::TempDir, fuel: u64, memory_bytes: usize) -> ExecutionPolicy {
    ExecutionPolicy::new(fuel, memory_bytes, 4096, 4096, dir.path(), "/app").unwrap()
}

#[test]
fn test_basic_execution() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "_start"))
        )
    "#;

    let engine = engine();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();

    let outcome = run(&engine, &module, &policy(&dir, 1_000_000, 1024 * 1024), &[], logs.path()).unwrap();

    assert!(!outcome.trapped);
    assert_eq!(outcome.exit_code, 0);
}

#[test]
fn test_fuel_consumption_is_nonzero_for_a_loop() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "_start")
                (local $i i32)
                (local.set $i (i32.const 0))
                (block $break
                    (loop $continue
                        (local.set $i (i32.add (local.get $i) (i32.const 1)))
                        (br_if $continue (i32.lt_u (local.get $i) (i32.const 100)))
                    )
                )
            )
        )
    "#;

    let engine = engine();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();

    let outcome = run(&engine, &module, &policy(&dir, 1_000_000, 1024 * 1024), &[], logs.path()).unwrap();

    assert!(!outcome.trapped);
    assert!(outcome.fuel_consumed > 0);
}

#[test]
fn test_fuel_exhaustion_reports_out_of_fuel() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "_start")
                (loop $forever
                    (br $forever)))
        )
    "#;

    let engine = engine();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();

    let outcome = run(&engine, &module, &policy(&dir, 1000, 1024 * 1024), &[], logs.path()).unwrap();

    assert!(outcome.trapped);
    assert_eq!(outcome.trap_reason, Some(sandbox_common::TrapReason::OutOfFuel));
    assert_eq!(outcome.fuel_consumed, 1000);
}

#[test]
fn test_trap_unreachable_is_reported_not_errored() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "_start") unreachable)
        )
    "#;

    let engine = engine();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();

    let outcome = run(&engine, &module, &policy(&dir, 1_000_000, 1024 * 1024), &[], logs.path()).unwrap();

    assert!(outcome.trapped);
    assert!(outcome.stderr.contains("trapped"));
}

#[test]
fn test_stdout_capture_via_wasi_fd_write() {
    let wat = r#"
        (module
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (memory (export "memory") 1)
            (data (i32.const 8) "hello\n")
            (func (export "_start")
                (i32.store (i32.const 0) (i32.const 8))
                (i32.store (i32.const 4) (i32.const 6))
                (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 20)))
            )
        )
    "#;

    let engine = engine();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();

    let outcome = run(&engine, &module, &policy(&dir, 1_000_000, 1024 * 1024), &[], logs.path()).unwrap();

    assert!(!outcome.trapped);
    assert_eq!(outcome.stdout, "hello\n");
}

#[test]
fn test_memory_limiter_refuses_growth_past_policy_budget() {
    let wat = r#"
        (module
            (memory (export "memory") 1 1000)
            (func (export "_start")
                (if (i32.lt_s (memory.grow (i32.const 900)) (i32.const 0))
                    (then unreachable)))
        )
    "#;

    let engine = engine();
    let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();

    // One page (64KiB) budget: growing by 900 pages must be refused.
    let outcome = run(&engine, &module, &policy(&dir, 1_000_000, 64 * 1024), &[], logs.path()).unwrap();

    assert!(outcome.trapped);
}
