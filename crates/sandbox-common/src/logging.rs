//! Named structured-event constants for the logger (SPEC_FULL.md §4.7).
//!
//! Every event is emitted through `tracing` with the event name as a field,
//! never interpolated into a format string, so consumers can filter and
//! aggregate on `event` alone. This module only centralizes the names;
//! callers still reach for `tracing::info!`/`warn!` directly.

/// Event names required by SPEC_FULL.md §4.7.
pub mod event {
    pub const EXECUTION_START: &str = "execution.start";
    pub const EXECUTION_COMPLETE: &str = "execution.complete";
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_RETRIEVED: &str = "session.retrieved";
    pub const SESSION_DELETED: &str = "session.deleted";
    pub const SESSION_METADATA_CREATED: &str = "session.metadata.created";
    pub const SESSION_METADATA_UPDATED: &str = "session.metadata.updated";
    pub const SESSION_PRUNE_STARTED: &str = "session.prune.started";
    pub const SESSION_PRUNE_CANDIDATE: &str = "session.prune.candidate";
    pub const SESSION_PRUNE_SKIPPED: &str = "session.prune.skipped";
    pub const SESSION_PRUNE_DELETED: &str = "session.prune.deleted";
    pub const SESSION_PRUNE_COMPLETED: &str = "session.prune.completed";
    pub const FILE_LISTED: &str = "file.listed";
    pub const FILE_READ: &str = "file.read";
    pub const FILE_WRITTEN: &str = "file.written";
    pub const FILE_DELETED: &str = "file.deleted";

    /// `security.<kind>` events carry `kind` as a field rather than being
    /// templated per kind, matching the spec's `security.<kind>` naming.
    pub const SECURITY: &str = "security";
}
