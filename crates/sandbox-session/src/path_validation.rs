//! Path validation for session file operations (SPEC_FULL.md §4.3).
//!
//! Every file operation and session deletion routes through
//! [`resolve_in_session`]: canonicalize the nearest existing ancestor of the
//! requested path, reattach any remaining (not-yet-created) components, and
//! check the result is still a descendant of the session's own workspace
//! root. The same canonicalize-then-`starts_with` shape as a host/address
//! allowlist check, just applied to the filesystem instead of the network.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::SessionError;

/// Reject a session id containing a path separator or `..` segment.
pub fn validate_session_id(session_id: &str) -> Result<(), SessionError> {
    if session_id.is_empty()
        || session_id.contains('/')
        || session_id.contains('\\')
        || session_id.contains("..")
    {
        return Err(SessionError::InvalidSessionId);
    }
    Ok(())
}

/// Parse a session id as a UUID v4, used by `prune` to recognize session
/// directories among arbitrary subdirectories of `workspace_root`.
pub fn parse_session_uuid(session_id: &str) -> Option<Uuid> {
    Uuid::parse_str(session_id)
        .ok()
        .filter(|uuid| uuid.get_version_num() == 4)
}

/// The session's own workspace directory, `workspace_root/<session_id>`.
pub fn session_workspace(workspace_root: &Path, session_id: &str) -> Result<PathBuf, SessionError> {
    validate_session_id(session_id)?;
    Ok(workspace_root.join(session_id))
}

/// Resolve `relative_path` against the session workspace, rejecting absolute
/// paths and anything that would escape the workspace via `..` or a symlink.
///
/// # Errors
///
/// Returns [`SessionError::InvalidSessionId`], [`SessionError::AbsolutePath`],
/// [`SessionError::PathEscape`], or an I/O error if the workspace itself
/// cannot be canonicalized.
pub fn resolve_in_session(
    workspace_root: &Path,
    session_id: &str,
    relative_path: &Path,
) -> Result<PathBuf, SessionError> {
    validate_session_id(session_id)?;
    if relative_path.is_absolute() {
        return Err(SessionError::AbsolutePath);
    }

    let session_root = session_workspace(workspace_root, session_id)?;
    let canonical_root = session_root.canonicalize()?;
    let candidate = session_root.join(relative_path);
    let canonical_target = canonicalize_best_effort(&candidate)?;

    if !canonical_target.starts_with(&canonical_root) {
        return Err(SessionError::PathEscape);
    }

    Ok(canonical_target)
}

/// Canonicalize `path`, falling back to canonicalizing its nearest existing
/// ancestor and re-appending the remaining, not-yet-created components.
fn canonicalize_best_effort(path: &Path) -> Result<PathBuf, SessionError> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let mut existing = path.to_path_buf();
    let mut remainder = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                remainder.push(name.to_os_string());
                if !existing.pop() {
                    return Err(SessionError::PathEscape);
                }
            }
            None => return Err(SessionError::PathEscape),
        }
    }

    let mut canonical = existing.canonicalize()?;
    for part in remainder.into_iter().rev() {
        canonical.push(part);
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_session_id_with_slash() {
        assert!(validate_session_id("../etc").is_err());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id("a\\b").is_err());
    }

    #[test]
    fn accepts_uuid_session_id() {
        assert!(validate_session_id("11111111-1111-4111-8111-111111111111").is_ok());
    }

    #[test]
    fn rejects_absolute_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        std::fs::create_dir_all(dir.path().join(session_id)).unwrap();

        let err = resolve_in_session(dir.path(), session_id, Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, SessionError::AbsolutePath));
    }

    #[test]
    fn rejects_traversal_out_of_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        std::fs::create_dir_all(dir.path().join(session_id)).unwrap();

        let err =
            resolve_in_session(dir.path(), session_id, Path::new("../../outside.txt")).unwrap_err();
        assert!(matches!(err, SessionError::PathEscape));
    }

    #[test]
    fn resolves_new_file_within_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        std::fs::create_dir_all(dir.path().join(session_id)).unwrap();

        let resolved = resolve_in_session(dir.path(), session_id, Path::new("notes/out.txt")).unwrap();
        assert!(resolved.ends_with("notes/out.txt"));
    }

    #[test]
    fn parses_uuid_v4_only() {
        assert!(parse_session_uuid("11111111-1111-4111-8111-111111111111").is_some());
        assert!(parse_session_uuid("not-a-uuid").is_none());
    }
}
