//! Session identity and the in-process registry of live workspaces
//! (SPEC_FULL.md §4.3).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use sandbox_common::logging::event;

use crate::error::SessionError;
use crate::metadata::SessionMetadata;
use crate::path_validation::{session_workspace, validate_session_id};

/// A live, process-local handle to one session's workspace.
///
/// `exec_lock` enforces the single-concurrent-executor rule from §5: a
/// caller holds it for the duration of one `execute` call, which totally
/// orders executions against this session without any cross-process lock
/// file.
pub struct SessionHandle {
    pub session_id: String,
    pub workspace: PathBuf,
    exec_lock: Mutex<()>,
}

impl SessionHandle {
    /// Acquire the per-session execution lock. Block until any in-flight
    /// `execute` on this session completes.
    pub fn lock_for_execute(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.exec_lock.lock()
    }
}

/// Process-local cache of live sandboxes. A performance convenience over the
/// authoritative on-disk state; safe to drop and rebuild at any time.
#[derive(Default)]
pub struct SessionRegistry(DashMap<String, Arc<SessionHandle>>);

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a cached handle, if any. Used by `prune` after it deletes a
    /// session's workspace on disk, so a stale handle can't be reused.
    pub fn remove(&self, session_id: &str) {
        self.0.remove(session_id);
    }
}

/// Generate a fresh session, create its workspace, and write the metadata
/// sidecar. A sidecar write failure is logged and swallowed: the session is
/// still usable, it will simply be skipped by `prune`.
///
/// # Errors
///
/// Returns an error only if the workspace directory cannot be created.
pub fn create_session(
    registry: &SessionRegistry,
    workspace_root: &std::path::Path,
    now: DateTime<Utc>,
) -> Result<Arc<SessionHandle>, SessionError> {
    let session_id = Uuid::new_v4().to_string();
    let workspace = workspace_root.join(&session_id);
    std::fs::create_dir_all(&workspace)?;

    let metadata = SessionMetadata::new(&session_id, now);
    if let Err(e) = metadata.write(&workspace) {
        tracing::warn!(
            event = event::SECURITY,
            kind = "metadata_write_failed",
            session_id = %session_id,
            error = %e,
            "failed to write session metadata sidecar; session remains usable"
        );
    }

    let handle = Arc::new(SessionHandle {
        session_id: session_id.clone(),
        workspace,
        exec_lock: Mutex::new(()),
    });
    registry.0.insert(session_id.clone(), handle.clone());

    tracing::info!(event = event::SESSION_CREATED, session_id = %session_id);
    Ok(handle)
}

/// Resolve a session's workspace, creating it if absent. Workspace contents
/// are authoritative; the registry is only a cache.
///
/// # Errors
///
/// Returns [`SessionError::InvalidSessionId`] or an I/O error.
pub fn get_session(
    registry: &SessionRegistry,
    workspace_root: &std::path::Path,
    session_id: &str,
) -> Result<Arc<SessionHandle>, SessionError> {
    validate_session_id(session_id)?;

    if let Some(handle) = registry.0.get(session_id) {
        tracing::info!(event = event::SESSION_RETRIEVED, session_id = %session_id);
        return Ok(handle.clone());
    }

    let workspace = session_workspace(workspace_root, session_id)?;
    std::fs::create_dir_all(&workspace)?;

    let handle = Arc::new(SessionHandle {
        session_id: session_id.to_string(),
        workspace,
        exec_lock: Mutex::new(()),
    });
    registry.0.insert(session_id.to_string(), handle.clone());

    tracing::info!(event = event::SESSION_RETRIEVED, session_id = %session_id);
    Ok(handle)
}

/// Delete a session's workspace tree and drop it from the registry.
/// Idempotent: deleting an absent workspace is not an error.
///
/// # Errors
///
/// Returns [`SessionError::InvalidSessionId`] or an I/O error other than
/// "not found".
pub fn delete_session(
    registry: &SessionRegistry,
    workspace_root: &std::path::Path,
    session_id: &str,
) -> Result<(), SessionError> {
    let workspace = session_workspace(workspace_root, session_id)?;
    registry.0.remove(session_id);

    if workspace.exists() {
        std::fs::remove_dir_all(&workspace)?;
    }

    tracing::info!(event = event::SESSION_DELETED, session_id = %session_id);
    Ok(())
}
