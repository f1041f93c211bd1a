//! The `RuntimeAdapter` trait and the common `execute` algorithm shared by
//! every language variant (SPEC_FULL.md §4.2).

use std::collections::HashMap;
use std::path::Path;
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use sandbox_common::logging::event;
use sandbox_common::{
    ErrorGuidance, ExecutionPolicy, FuelAnalysis, ResultMetadata, RuntimeType, SandboxResult, TrapReason,
};
use sandbox_core::{CompiledModule, WasmEngine};
use sandbox_session::metadata::SessionMetadata;

use crate::classifier::classify_error;
use crate::error::AdapterError;
use crate::vendor::guest_vendor_path;

/// Per-call switches on top of an adapter's default behavior.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Wrap the source with load/persist state machinery (§4.5).
    pub persist_state: bool,
    /// Inject the setup prologue (vendor path, helper functions) even when
    /// `persist_state` is `false`. Only meaningful when `persist_state` is
    /// `false`; persistence always implies prologue injection.
    pub inject_prologue: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            persist_state: true,
            inject_prologue: true,
        }
    }
}

/// Per-language conventions a runtime adapter must supply. The `execute`
/// algorithm below is identical across languages; only these decisions vary
/// (SPEC_FULL.md §4.2 table).
pub trait RuntimeAdapter {
    fn runtime_type(&self) -> RuntimeType;

    /// Filename the source is written under in the workspace, e.g. `user_code.py`.
    fn source_filename(&self) -> &'static str;

    /// Path to the compiled interpreter `.wasm` binary.
    fn wasm_binary_path(&self) -> &Path;

    /// WASI argv for invoking the interpreter against the written source.
    fn build_argv(&self, guest_mount_path: &str, source_filename: &str) -> Vec<String>;

    /// Wrap user code with the prologue/epilogue appropriate for this
    /// language and the requested options. `existing_state_json` is `Some`
    /// only for adapters that need the state embedded textually (§4.5.b);
    /// file-backed adapters (§4.5.a) read their own state from the guest
    /// filesystem and ignore it.
    #[allow(clippy::too_many_arguments)]
    fn wrap_source(
        &self,
        code: &str,
        guest_mount_path: &str,
        vendor_guest_path: Option<&str>,
        inject_prologue: bool,
        persist_state: bool,
        existing_state_json: Option<&str>,
    ) -> String;

    /// Best-effort syntax check without execution. May be a no-op.
    fn validate_code(&self, _code: &str) -> bool {
        true
    }

    /// Read the raw `.session_state.json` contents this adapter needs
    /// embedded in the wrapper before running, or `None` if this adapter's
    /// persistence strategy reads state from the guest filesystem itself.
    fn existing_state_for_prologue(&self, _workspace: &Path, _persist: bool) -> Option<String> {
        None
    }

    /// Post-process captured stdout for this adapter's persistence strategy:
    /// extract and write new state, strip any in-band markers. Returns the
    /// stdout to expose to the caller and whether a state write failed.
    fn persist_state(&self, stdout: &str, workspace: &Path, persist: bool) -> (String, bool) {
        let _ = (workspace, persist);
        (stdout.to_string(), false)
    }

    /// Substrings whose presence in stderr marks an otherwise-clean exit as
    /// a failure (SPEC_FULL.md §4.2 table).
    fn failure_tokens(&self) -> &'static [&'static str];
}

fn snapshot(workspace: &Path, source_filename: &str) -> HashMap<String, SystemTime> {
    let mut out = HashMap::new();
    visit(workspace, workspace, source_filename, &mut out);
    out
}

fn visit(root: &Path, dir: &Path, source_filename: &str, out: &mut HashMap<String, SystemTime>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if path.is_dir() {
            visit(root, &path, source_filename, out);
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
        if rel == source_filename {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                out.insert(rel, modified);
            }
        }
    }
}

fn diff_snapshots(
    before: &HashMap<String, SystemTime>,
    after: &HashMap<String, SystemTime>,
) -> (Vec<String>, Vec<String>) {
    let mut created: Vec<String> = after.keys().filter(|p| !before.contains_key(*p)).cloned().collect();
    let mut modified: Vec<String> = after
        .iter()
        .filter(|(p, mtime)| before.get(*p).is_some_and(|prev| prev != *mtime))
        .map(|(p, _)| p.clone())
        .collect();
    created.sort();
    modified.sort();
    (created, modified)
}

/// Run the common execute algorithm (SPEC_FULL.md §4.2 steps 1-15) for any
/// language adapter.
///
/// `session_id` binds the result to a session and, on success, refreshes
/// that session's `.metadata.json` sidecar. `policy.mount_host_dir` must
/// already be the correct workspace (an ephemeral temp dir, or a session's
/// workspace).
pub fn execute<A: RuntimeAdapter>(
    adapter: &A,
    engine: &WasmEngine,
    policy: &ExecutionPolicy,
    code: &str,
    options: ExecuteOptions,
    session_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SandboxResult, AdapterError> {
    let runtime = adapter.runtime_type();
    let wasm_path = adapter.wasm_binary_path();
    if !wasm_path.exists() {
        return Err(AdapterError::WasmBinaryNotFound(wasm_path.display().to_string()));
    }

    tracing::info!(
        event = event::EXECUTION_START,
        runtime = %runtime,
        session_id = session_id.unwrap_or("none")
    );

    let workspace = policy.mount_host_dir.clone();
    let source_filename = adapter.source_filename();
    let vendor_path = guest_vendor_path(policy);
    let inject_prologue = options.persist_state || options.inject_prologue;
    let existing_state = adapter.existing_state_for_prologue(&workspace, options.persist_state);

    let wrapped = adapter.wrap_source(
        code,
        &policy.guest_mount_path,
        vendor_path,
        inject_prologue,
        options.persist_state,
        existing_state.as_deref(),
    );
    std::fs::write(workspace.join(source_filename), &wrapped)?;

    let before = snapshot(&workspace, source_filename);
    let argv = adapter.build_argv(&policy.guest_mount_path, source_filename);

    let start = Instant::now();
    let module = CompiledModule::from_file(engine.inner(), wasm_path)?;
    let logs_dir = std::env::temp_dir().join(format!("sandbox-logs-{}", Uuid::new_v4()));

    let outcome = match sandbox_core::run(engine, &module, policy, &argv, &logs_dir) {
        Ok(outcome) => outcome,
        Err(e) => sandbox_core::RunOutcome {
            trapped: true,
            trap_reason: Some(TrapReason::HostError),
            trap_message: Some(e.to_string()),
            exit_code: 1,
            fuel_consumed: 0,
            memory_used_bytes: 0,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            stdout: String::new(),
            stderr: e.to_string(),
            stdout_truncated: false,
            stderr_truncated: false,
        },
    };

    let after = snapshot(&workspace, source_filename);
    let (files_created, files_modified) = diff_snapshots(&before, &after);

    let (stdout, state_write_failed) = adapter.persist_state(&outcome.stdout, &workspace, options.persist_state);

    let success = !outcome.trapped
        && outcome.exit_code == 0
        && !contains_failure_token(&outcome.stderr, adapter.failure_tokens());

    let fuel_analysis = FuelAnalysis::compute(
        outcome.fuel_consumed,
        policy.fuel_budget,
        outcome.trapped && outcome.trap_reason == Some(TrapReason::OutOfFuel),
    );

    let error_guidance: Option<ErrorGuidance> = if success {
        None
    } else {
        classify_error(
            outcome.trap_reason,
            &outcome.stderr,
            runtime,
            &policy.guest_mount_path,
            outcome.fuel_consumed,
            policy.fuel_budget,
            state_write_failed,
        )
    };

    let metadata = ResultMetadata {
        runtime: Some(runtime),
        fuel_budget: Some(policy.fuel_budget),
        memory_limit_bytes: Some(policy.memory_bytes),
        memory_pages: Some((outcome.memory_used_bytes as u64).div_ceil(64 * 1024)),
        stdout_truncated: outcome.stdout_truncated,
        stderr_truncated: outcome.stderr_truncated,
        exit_code: outcome.exit_code,
        trapped: outcome.trapped,
        trap_reason: outcome.trap_reason,
        trap_message: outcome.trap_message,
        session_id: session_id.map(String::from),
        logs_dir: policy.preserve_logs.then(|| logs_dir.clone()),
        error_guidance,
        fuel_analysis: Some(fuel_analysis),
    };

    if let Some(session_id) = session_id {
        if let Ok(mut session_metadata) = SessionMetadata::read(&workspace) {
            if let Err(e) = session_metadata.touch(&workspace, now) {
                tracing::warn!(
                    event = event::SECURITY,
                    kind = "session_metadata_touch_failed",
                    session_id,
                    error = %e
                );
            }
        }
    }

    let result = SandboxResult {
        success,
        stdout,
        stderr: outcome.stderr,
        exit_code: outcome.exit_code,
        duration_ms: outcome.duration_ms,
        fuel_consumed: Some(outcome.fuel_consumed),
        memory_used_bytes: outcome.memory_used_bytes,
        files_created,
        files_modified,
        workspace_path: workspace,
        metadata,
    };

    tracing::info!(
        event = event::EXECUTION_COMPLETE,
        runtime = %runtime,
        success,
        duration_ms = result.duration_ms
    );

    Ok(result)
}

fn contains_failure_token(stderr: &str, tokens: &[&str]) -> bool {
    let lower = stderr.to_lowercase();
    tokens.iter().any(|token| lower.contains(token))
}

pub(crate) fn guest_join(guest_mount_path: &str, filename: &str) -> String {
    let trimmed = guest_mount_path.trim_end_matches('/');
    format!("{trimmed}/{filename}")
}
