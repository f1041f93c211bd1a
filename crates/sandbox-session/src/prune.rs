//! Age-based session cleanup (SPEC_FULL.md §4.3).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sandbox_common::logging::event;

use crate::metadata::SessionMetadata;
use crate::path_validation::parse_session_uuid;
use crate::session::SessionRegistry;

/// Outcome of one `prune` pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneResult {
    pub deleted_sessions: Vec<String>,
    pub skipped_sessions: Vec<String>,
    pub reclaimed_bytes: u64,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

/// Delete session workspaces whose `updated_at` is at least `older_than_hours`
/// old. Directories that are not UUID-v4-named, or whose `.metadata.json` is
/// missing or unparseable, are skipped (never deleted) rather than treated
/// as an error.
///
/// Not concurrency-safe with a simultaneous `execute` on the same
/// `workspace_root` (§5): run this during a maintenance window. A delete
/// failure (e.g. permission denied, or a workspace busy mid-execution) is
/// recorded under `errors` and does not stop the pass.
pub fn prune(
    registry: &SessionRegistry,
    workspace_root: &Path,
    older_than_hours: f64,
    now: DateTime<Utc>,
    dry_run: bool,
) -> PruneResult {
    let mut result = PruneResult {
        dry_run,
        ..Default::default()
    };

    tracing::info!(event = event::SESSION_PRUNE_STARTED, older_than_hours, dry_run);

    let entries = match std::fs::read_dir(workspace_root) {
        Ok(entries) => entries,
        Err(_) => {
            tracing::info!(event = event::SESSION_PRUNE_COMPLETED, deleted = 0, skipped = 0);
            return result;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if parse_session_uuid(&name).is_none() {
            continue;
        }

        let metadata = match SessionMetadata::read(&path) {
            Ok(metadata) => metadata,
            Err(_) => {
                tracing::info!(
                    event = event::SESSION_PRUNE_SKIPPED,
                    session_id = %name,
                    reason = "missing_or_unparseable_metadata"
                );
                result.skipped_sessions.push(name);
                continue;
            }
        };

        let age_hours = metadata.age_hours(now);
        if age_hours < older_than_hours {
            result.skipped_sessions.push(name);
            continue;
        }

        tracing::info!(event = event::SESSION_PRUNE_CANDIDATE, session_id = %name, age_hours);
        let size = directory_size(&path).unwrap_or(0);

        if dry_run {
            result.deleted_sessions.push(name);
            result.reclaimed_bytes += size;
            continue;
        }

        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                registry.remove(&name);
                tracing::info!(event = event::SESSION_PRUNE_DELETED, session_id = %name, reclaimed_bytes = size);
                result.deleted_sessions.push(name);
                result.reclaimed_bytes += size;
            }
            Err(e) => {
                tracing::warn!(
                    event = event::SECURITY,
                    kind = "prune_delete_failed",
                    session_id = %name,
                    error = %e
                );
                result.errors.push(format!("{name}: {e}"));
            }
        }
    }

    tracing::info!(
        event = event::SESSION_PRUNE_COMPLETED,
        deleted = result.deleted_sessions.len(),
        skipped = result.skipped_sessions.len()
    );

    result
}

fn directory_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += directory_size(&entry.path())?;
        } else {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
