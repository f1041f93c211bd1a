//! Sandbox host CLI: a thin demonstration harness over the
//! `sandbox-session` and `sandbox-runtime` crates.
//!
//! This binary is not the deliverable of SPEC_FULL.md; it exists so the
//! host executor, session subsystem, and runtime adapters can be exercised
//! end to end from a terminal. Embedders are expected to call into the
//! library crates directly.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sandbox_common::{EngineConfig, ExecutionPolicy, HostConfig};
use sandbox_core::WasmEngine;
use sandbox_runtime::{execute, ExecuteOptions, JavaScriptAdapter, PythonAdapter, RuntimeAdapter};
use sandbox_session::{create_session, get_session, prune, SessionRegistry};

#[derive(Parser)]
#[command(name = "sandbox-cli", about = "Secure execution host for untrusted language code")]
struct Cli {
    /// Path to a TOML config file (defaults for engine tuning and policy limits).
    #[arg(long, env = "SANDBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliRuntime {
    Python,
    Javascript,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new session workspace and print its id.
    SessionCreate {
        #[arg(long, default_value = "./sandbox-workspaces")]
        workspace_root: PathBuf,
    },
    /// Delete a session workspace.
    SessionDelete {
        #[arg(long, default_value = "./sandbox-workspaces")]
        workspace_root: PathBuf,
        session_id: String,
    },
    /// Delete session workspaces older than a threshold.
    Prune {
        #[arg(long, default_value = "./sandbox-workspaces")]
        workspace_root: PathBuf,
        #[arg(long, default_value_t = 24.0)]
        older_than_hours: f64,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a source file inside the sandbox and print the result as JSON.
    Run {
        /// Which interpreter convention to use.
        #[arg(long, value_enum)]
        runtime: CliRuntime,
        /// Path to the compiled WASI interpreter binary (python.wasm / qjs.wasm).
        #[arg(long)]
        interpreter: PathBuf,
        /// Path to the user source file to execute.
        #[arg(long)]
        code_file: PathBuf,
        /// Existing session to run in; a fresh ad-hoc workspace is used if omitted.
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value = "./sandbox-workspaces")]
        workspace_root: PathBuf,
        /// Read-only vendor/data directory mounted alongside the workspace.
        #[arg(long)]
        vendor_dir: Option<PathBuf>,
        #[arg(long, default_value = "/vendor")]
        vendor_guest_path: String,
        #[arg(long)]
        preserve_logs: bool,
        /// Skip persisting interpreter globals across calls.
        #[arg(long)]
        no_persist_state: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sandbox_host=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let host_config = match &cli.config {
        Some(path) => HostConfig::from_file(path).context("failed to load sandbox host config")?,
        None => HostConfig::default(),
    };

    info!("Starting sandbox host CLI");

    match cli.command {
        Command::SessionCreate { workspace_root } => session_create(&workspace_root),
        Command::SessionDelete {
            workspace_root,
            session_id,
        } => session_delete(&workspace_root, &session_id),
        Command::Prune {
            workspace_root,
            older_than_hours,
            dry_run,
        } => run_prune(&workspace_root, older_than_hours, dry_run),
        Command::Run {
            runtime,
            interpreter,
            code_file,
            session_id,
            workspace_root,
            vendor_dir,
            vendor_guest_path,
            preserve_logs,
            no_persist_state,
        } => run_code(
            &host_config,
            runtime,
            &interpreter,
            &code_file,
            session_id.as_deref(),
            &workspace_root,
            vendor_dir.as_deref(),
            &vendor_guest_path,
            preserve_logs,
            !no_persist_state,
        ),
    }
}

fn session_create(workspace_root: &std::path::Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(workspace_root).context("failed to create workspace root")?;
    let registry = SessionRegistry::new();
    let handle = create_session(&registry, workspace_root, chrono::Utc::now())
        .context("failed to create session")?;
    println!("{}", handle.session_id);
    Ok(())
}

fn session_delete(workspace_root: &std::path::Path, session_id: &str) -> anyhow::Result<()> {
    let registry = SessionRegistry::new();
    sandbox_session::delete_session(&registry, workspace_root, session_id)
        .context("failed to delete session")?;
    info!(session_id, "session deleted");
    Ok(())
}

fn run_prune(workspace_root: &std::path::Path, older_than_hours: f64, dry_run: bool) -> anyhow::Result<()> {
    let registry = SessionRegistry::new();
    let result = prune(&registry, workspace_root, older_than_hours, chrono::Utc::now(), dry_run);
    let json = serde_json::to_string_pretty(&result).context("failed to serialize prune result")?;
    println!("{json}");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_code(
    host_config: &HostConfig,
    runtime: CliRuntime,
    interpreter: &std::path::Path,
    code_file: &std::path::Path,
    session_id: Option<&str>,
    workspace_root: &std::path::Path,
    vendor_dir: Option<&std::path::Path>,
    vendor_guest_path: &str,
    preserve_logs: bool,
    persist_state: bool,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(workspace_root).context("failed to create workspace root")?;
    let registry = SessionRegistry::new();

    let handle = match session_id {
        Some(id) => get_session(&registry, workspace_root, id).context("failed to resolve session")?,
        None => create_session(&registry, workspace_root, chrono::Utc::now())
            .context("failed to create ad-hoc session")?,
    };
    let _exec_lock = handle.lock_for_execute();

    let code = std::fs::read_to_string(code_file)
        .with_context(|| format!("failed to read source file {}", code_file.display()))?;

    let mut policy = ExecutionPolicy::new(
        host_config.execution.fuel_budget,
        host_config.execution.memory_bytes,
        host_config.execution.stdout_max_bytes,
        host_config.execution.stderr_max_bytes,
        &handle.workspace,
        "/app",
    )
    .context("failed to build execution policy")?;
    policy = policy.with_preserve_logs(preserve_logs);
    if let Some(vendor) = vendor_dir {
        policy = policy.with_data_mount(vendor, vendor_guest_path);
    }

    let engine_config = EngineConfig {
        pooling_allocator: host_config.engine.pooling_allocator,
        ..Default::default()
    };
    let engine = WasmEngine::new(&engine_config, policy.memory_bytes)
        .context("failed to initialize wasm engine")?;

    let options = ExecuteOptions {
        persist_state,
        inject_prologue: true,
    };

    let result = match runtime {
        CliRuntime::Python => {
            let adapter = PythonAdapter::new(interpreter);
            run_adapter(&adapter, &engine, &policy, &code, options, session_id)?
        }
        CliRuntime::Javascript => {
            let adapter = JavaScriptAdapter::new(interpreter);
            run_adapter(&adapter, &engine, &policy, &code, options, session_id)?
        }
    };

    let json = serde_json::to_string_pretty(&result).context("failed to serialize sandbox result")?;
    println!("{json}");

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn run_adapter<A: RuntimeAdapter>(
    adapter: &A,
    engine: &WasmEngine,
    policy: &ExecutionPolicy,
    code: &str,
    options: ExecuteOptions,
    session_id: Option<&str>,
) -> anyhow::Result<sandbox_common::SandboxResult> {
    execute(adapter, engine, policy, code, options, session_id, chrono::Utc::now())
        .context("execution failed")
}
