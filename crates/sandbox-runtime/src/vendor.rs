//! Read-only vendor/data mount resolution (SPEC_FULL.md §4.6).
//!
//! There is no per-session copy of the vendor tree: the host executor
//! preopens `mount_data_dir` read-only at `guest_data_path` once per
//! execution, shared across any number of sessions. This module only
//! resolves the guest-visible path an adapter's prologue should reference.

use sandbox_common::ExecutionPolicy;

/// The guest-visible path of the vendor mount, if one is configured on this
/// policy. `None` means no prologue vendor ergonomics should be injected.
pub fn guest_vendor_path(policy: &ExecutionPolicy) -> Option<&str> {
    match (&policy.mount_data_dir, &policy.guest_data_path) {
        (Some(_), Some(guest_path)) => Some(guest_path.as_str()),
        _ => None,
    }
}
