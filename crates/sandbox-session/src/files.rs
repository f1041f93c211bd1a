//! Host-side file operations on a session workspace (SPEC_FULL.md §4.3).
//!
//! Every operation routes through [`crate::path_validation::resolve_in_session`].
//! `.metadata.json` and `.session_state.json` are host-managed sidecars:
//! listing never surfaces them and direct reads/writes/deletes of either are
//! rejected.

use std::path::Path;

use sandbox_common::logging::event;

use crate::error::SessionError;
use crate::metadata::METADATA_FILENAME;
use crate::path_validation::{resolve_in_session, session_workspace, validate_session_id};

const STATE_FILENAME: &str = ".session_state.json";

fn reject_reserved(rel_path: &Path) -> Result<(), SessionError> {
    let is_reserved = rel_path
        .file_name()
        .is_some_and(|name| name == METADATA_FILENAME || name == STATE_FILENAME);
    if is_reserved {
        return Err(SessionError::ReservedPath(rel_path.display().to_string()));
    }
    Ok(())
}

/// List every file under a session workspace, excluding host-managed
/// sidecars and any other dotfile, optionally filtered by a `*`-wildcard
/// glob pattern matched against the relative path.
///
/// # Errors
///
/// Returns [`SessionError::InvalidSessionId`] or an I/O error.
pub fn list_session_files(
    workspace_root: &Path,
    session_id: &str,
    pattern: Option<&str>,
) -> Result<Vec<String>, SessionError> {
    validate_session_id(session_id)?;
    let root = session_workspace(workspace_root, session_id)?;
    let mut out = Vec::new();
    if root.exists() {
        visit(&root, &root, pattern, &mut out)?;
    }
    out.sort();

    tracing::info!(event = event::FILE_LISTED, session_id = %session_id, count = out.len());
    Ok(out)
}

fn visit(root: &Path, dir: &Path, pattern: Option<&str>, out: &mut Vec<String>) -> Result<(), SessionError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        if path.is_dir() {
            visit(root, &path, pattern, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if pattern.is_none_or(|p| glob_match(p, &rel)) {
                out.push(rel);
            }
        }
    }
    Ok(())
}

/// Minimal `*`-wildcard glob matcher; no other wildcard syntax is supported.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text[pos..].starts_with(part) {
                return false;
            }
            pos += part.len();
        } else if i == parts.len() - 1 {
            return text[pos..].ends_with(part);
        } else {
            match text[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }
    true
}

/// Read a file's contents from within a session workspace.
///
/// # Errors
///
/// Returns [`SessionError::ReservedPath`], a path-validation error, or
/// [`SessionError::FileNotFound`].
pub fn read_session_file(
    workspace_root: &Path,
    session_id: &str,
    rel_path: &Path,
) -> Result<Vec<u8>, SessionError> {
    reject_reserved(rel_path)?;
    let target = resolve_in_session(workspace_root, session_id, rel_path)?;
    if !target.exists() {
        return Err(SessionError::FileNotFound(rel_path.display().to_string()));
    }

    let bytes = std::fs::read(&target)?;
    tracing::info!(event = event::FILE_READ, session_id = %session_id, path = %rel_path.display());
    Ok(bytes)
}

/// Write `bytes` to a file within a session workspace, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns [`SessionError::AlreadyExists`] if the target exists and
/// `overwrite` is `false`.
pub fn write_session_file(
    workspace_root: &Path,
    session_id: &str,
    rel_path: &Path,
    bytes: &[u8],
    overwrite: bool,
) -> Result<(), SessionError> {
    reject_reserved(rel_path)?;
    let target = resolve_in_session(workspace_root, session_id, rel_path)?;

    if target.exists() && !overwrite {
        return Err(SessionError::AlreadyExists(rel_path.display().to_string()));
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, bytes)?;

    tracing::info!(event = event::FILE_WRITTEN, session_id = %session_id, path = %rel_path.display());
    Ok(())
}

/// Delete a file or, with `recursive = true`, a directory tree within a
/// session workspace.
///
/// # Errors
///
/// Returns [`SessionError::NotRecursive`] for a directory without
/// `recursive`, or [`SessionError::FileNotFound`] for a missing path.
pub fn delete_session_path(
    workspace_root: &Path,
    session_id: &str,
    rel_path: &Path,
    recursive: bool,
) -> Result<(), SessionError> {
    reject_reserved(rel_path)?;
    let target = resolve_in_session(workspace_root, session_id, rel_path)?;

    if !target.exists() {
        return Err(SessionError::FileNotFound(rel_path.display().to_string()));
    }

    if target.is_dir() {
        if !recursive {
            return Err(SessionError::NotRecursive(rel_path.display().to_string()));
        }
        std::fs::remove_dir_all(&target)?;
    } else {
        std::fs::remove_file(&target)?;
    }

    tracing::info!(event = event::FILE_DELETED, session_id = %session_id, path = %rel_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with_session(dir: &tempfile::TempDir, session_id: &str) -> std::path::PathBuf {
        let root = dir.path().join(session_id);
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn list_excludes_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        let root = workspace_with_session(&dir, session_id);
        std::fs::write(root.join("user_code.py"), b"print(1)").unwrap();
        std::fs::write(root.join(".metadata.json"), b"{}").unwrap();
        std::fs::write(root.join(".session_state.json"), b"{}").unwrap();

        let files = list_session_files(dir.path(), session_id, None).unwrap();
        assert_eq!(files, vec!["user_code.py".to_string()]);
    }

    #[test]
    fn list_applies_glob_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        let root = workspace_with_session(&dir, session_id);
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join("b.json"), b"{}").unwrap();

        let files = list_session_files(dir.path(), session_id, Some("*.txt")).unwrap();
        assert_eq!(files, vec!["a.txt".to_string()]);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        workspace_with_session(&dir, session_id);

        write_session_file(dir.path(), session_id, Path::new("out.txt"), b"hello", false).unwrap();
        let bytes = read_session_file(dir.path(), session_id, Path::new("out.txt")).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn write_refuses_overwrite_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        workspace_with_session(&dir, session_id);

        write_session_file(dir.path(), session_id, Path::new("out.txt"), b"hello", false).unwrap();
        let err = write_session_file(dir.path(), session_id, Path::new("out.txt"), b"bye", false).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(_)));

        write_session_file(dir.path(), session_id, Path::new("out.txt"), b"bye", true).unwrap();
        assert_eq!(
            read_session_file(dir.path(), session_id, Path::new("out.txt")).unwrap(),
            b"bye"
        );
    }

    #[test]
    fn rejects_direct_access_to_reserved_files() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        workspace_with_session(&dir, session_id);

        let err = read_session_file(dir.path(), session_id, Path::new(".metadata.json")).unwrap_err();
        assert!(matches!(err, SessionError::ReservedPath(_)));
    }

    #[test]
    fn delete_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        workspace_with_session(&dir, session_id);

        let err = delete_session_path(dir.path(), session_id, Path::new("ghost.txt"), false).unwrap_err();
        assert!(matches!(err, SessionError::FileNotFound(_)));
    }

    #[test]
    fn delete_directory_requires_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = "11111111-1111-4111-8111-111111111111";
        let root = workspace_with_session(&dir, session_id);
        std::fs::create_dir(root.join("subdir")).unwrap();

        let err = delete_session_path(dir.path(), session_id, Path::new("subdir"), false).unwrap_err();
        assert!(matches!(err, SessionError::NotRecursive(_)));

        delete_session_path(dir.path(), session_id, Path::new("subdir"), true).unwrap();
        assert!(!root.join("subdir").exists());
    }
}
