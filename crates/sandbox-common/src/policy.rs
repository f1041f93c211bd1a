//! [`ExecutionPolicy`]: validated configuration consumed by every execution.
//!
//! Constructed once by the caller and immutable thereafter (SPEC_FULL.md §3.3).
//! All numeric limits are checked at construction time; a policy that exists
//! has already passed validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Resource limits, mounts, and environment for one execution.
///
/// Every numeric limit is strictly positive and `mount_host_dir` is checked
/// to exist at construction time (SPEC_FULL.md §3.1 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// WASM instruction count limit.
    pub fuel_budget: u64,
    /// Hard cap on WASM linear memory, in bytes.
    pub memory_bytes: usize,
    /// Truncation cap for captured stdout, in bytes.
    pub stdout_max_bytes: usize,
    /// Truncation cap for captured stderr, in bytes.
    pub stderr_max_bytes: usize,
    /// Host path used as the session workspace mount.
    pub mount_host_dir: PathBuf,
    /// Guest path at which the workspace appears.
    pub guest_mount_path: String,
    /// Optional read-only secondary mount for language libraries (host side).
    pub mount_data_dir: Option<PathBuf>,
    /// Guest path for the secondary mount. Required iff `mount_data_dir` is set.
    pub guest_data_path: Option<String>,
    /// Environment exposed verbatim to the guest WASI environment.
    pub env: BTreeMap<String, String>,
    /// Retain the per-run temporary log directory after execution.
    pub preserve_logs: bool,
}

impl ExecutionPolicy {
    /// Build a policy from explicit fields, validating every invariant named
    /// in SPEC_FULL.md §3.1.
    pub fn new(
        fuel_budget: u64,
        memory_bytes: usize,
        stdout_max_bytes: usize,
        stderr_max_bytes: usize,
        mount_host_dir: impl Into<PathBuf>,
        guest_mount_path: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        let policy = Self {
            fuel_budget,
            memory_bytes,
            stdout_max_bytes,
            stderr_max_bytes,
            mount_host_dir: mount_host_dir.into(),
            guest_mount_path: guest_mount_path.into(),
            mount_data_dir: None,
            guest_data_path: None,
            env: BTreeMap::new(),
            preserve_logs: false,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Attach a read-only vendor/data mount. Does not re-validate immediately;
    /// call [`ExecutionPolicy::validate`] (or go through [`ExecutionPolicy::new`]) before use.
    #[must_use]
    pub fn with_data_mount(mut self, host_dir: impl Into<PathBuf>, guest_path: impl Into<String>) -> Self {
        self.mount_data_dir = Some(host_dir.into());
        self.guest_data_path = Some(guest_path.into());
        self
    }

    /// Set an environment variable exposed to the guest.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Toggle retention of the per-run temp log directory.
    #[must_use]
    pub const fn with_preserve_logs(mut self, preserve: bool) -> Self {
        self.preserve_logs = preserve;
        self
    }

    /// Re-check every invariant. Called by [`ExecutionPolicy::new`]; also safe
    /// to call after mutating a policy built with the builder methods above.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.fuel_budget == 0 {
            return Err(PolicyError::not_positive("fuel_budget", 0i64));
        }
        if self.memory_bytes == 0 {
            return Err(PolicyError::not_positive("memory_bytes", 0i64));
        }
        if self.stdout_max_bytes == 0 {
            return Err(PolicyError::not_positive("stdout_max_bytes", 0i64));
        }
        if self.stderr_max_bytes == 0 {
            return Err(PolicyError::not_positive("stderr_max_bytes", 0i64));
        }
        if !Path::new(&self.mount_host_dir).exists() {
            return Err(PolicyError::MountHostDirMissing {
                path: self.mount_host_dir.display().to_string(),
            });
        }
        if !self.guest_mount_path.starts_with('/') {
            return Err(PolicyError::GuestMountPathNotAbsolute {
                path: self.guest_mount_path.clone(),
            });
        }
        if self.mount_data_dir.is_some() != self.guest_data_path.is_some() {
            return Err(PolicyError::DataMountIncomplete);
        }
        Ok(())
    }
}

/// Defaults matching the teacher's `ExecutionConfig` value set, scaled to the
/// byte-oriented fields this policy uses.
pub mod defaults {
    pub const fn fuel_budget() -> u64 {
        10_000_000
    }

    pub const fn memory_bytes() -> usize {
        128 * 1024 * 1024
    }

    pub const fn stdout_max_bytes() -> usize {
        1024 * 1024
    }

    pub const fn stderr_max_bytes() -> usize {
        256 * 1024
    }

    pub fn guest_mount_path() -> String {
        "/app".to_string()
    }

    pub fn guest_data_path() -> String {
        "/data".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_fuel_budget() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExecutionPolicy::new(0, 1024, 1024, 1024, dir.path(), "/app").unwrap_err();
        assert!(matches!(err, PolicyError::NotPositive { field: "fuel_budget", .. }));
    }

    #[test]
    fn rejects_zero_memory_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExecutionPolicy::new(100, 0, 1024, 1024, dir.path(), "/app").unwrap_err();
        assert!(matches!(err, PolicyError::NotPositive { field: "memory_bytes", .. }));
    }

    #[test]
    fn rejects_missing_mount_dir() {
        let err = ExecutionPolicy::new(100, 1024, 1024, 1024, "/nonexistent/path/xyz", "/app").unwrap_err();
        assert!(matches!(err, PolicyError::MountHostDirMissing { .. }));
    }

    #[test]
    fn rejects_relative_guest_mount_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExecutionPolicy::new(100, 1024, 1024, 1024, dir.path(), "app").unwrap_err();
        assert!(matches!(err, PolicyError::GuestMountPathNotAbsolute { .. }));
    }

    #[test]
    fn accepts_valid_policy() {
        let dir = tempfile::tempdir().unwrap();
        let policy = ExecutionPolicy::new(100, 1024, 1024, 1024, dir.path(), "/app").unwrap();
        assert_eq!(policy.fuel_budget, 100);
        assert!(!policy.preserve_logs);
    }

    #[test]
    fn data_mount_requires_both_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut policy = ExecutionPolicy::new(100, 1024, 1024, 1024, dir.path(), "/app").unwrap();
        policy.mount_data_dir = Some(dir.path().to_path_buf());
        assert!(matches!(
            policy.validate().unwrap_err(),
            PolicyError::DataMountIncomplete
        ));
    }
}
