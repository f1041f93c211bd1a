//! Error types shared across the sandbox host.
//!
//! [`PolicyError`] covers configuration errors: invalid `ExecutionPolicy`
//! fields, missing mount directories. These surface before a guest ever
//! runs and never produce a `SandboxResult`.

use thiserror::Error;

/// Errors raised when constructing or validating an [`crate::ExecutionPolicy`]
/// or a [`crate::SandboxResult`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A numeric limit that must be strictly positive was zero or negative.
    #[error("{field} must be a positive integer, got {value}")]
    NotPositive {
        /// Name of the offending field.
        field: &'static str,
        /// The value that was rejected.
        value: i64,
    },

    /// `mount_host_dir` does not exist on disk.
    #[error("mount_host_dir does not exist: {path}")]
    MountHostDirMissing {
        /// The path that was checked.
        path: String,
    },

    /// `guest_mount_path` is not an absolute guest path.
    #[error("guest_mount_path must be absolute, got {path}")]
    GuestMountPathNotAbsolute {
        /// The path that was rejected.
        path: String,
    },

    /// `mount_data_dir` was set but `guest_data_path` was not, or vice versa.
    #[error("mount_data_dir and guest_data_path must be set together")]
    DataMountIncomplete,
}

impl PolicyError {
    /// Construct a [`PolicyError::NotPositive`].
    pub fn not_positive(field: &'static str, value: impl Into<i64>) -> Self {
        Self::NotPositive {
            field,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_positive_display() {
        let err = PolicyError::not_positive("fuel_budget", 0i64);
        assert_eq!(err.to_string(), "fuel_budget must be a positive integer, got 0");
    }
}
