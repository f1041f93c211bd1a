//! `.metadata.json` sidecar: session identity and timestamps (SPEC_FULL.md
//! §3.1, §6.2).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sandbox_common::logging::event;

pub const METADATA_FILENAME: &str = ".metadata.json";
const CURRENT_VERSION: u32 = 1;

/// Session metadata sidecar, `{session_root}/.metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
}

impl SessionMetadata {
    /// A fresh sidecar for a session created right now.
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            version: CURRENT_VERSION,
        }
    }

    /// Write the sidecar to `session_root/.metadata.json`. Failures are
    /// logged and swallowed by the caller per §4.3: a session stays usable
    /// even when its sidecar could not be written.
    pub fn write(&self, session_root: &Path) -> std::io::Result<()> {
        let path = session_root.join(METADATA_FILENAME);
        let content = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)?;
        tracing::info!(event = event::SESSION_METADATA_CREATED, session_id = %self.session_id);
        Ok(())
    }

    /// Read the sidecar from `session_root/.metadata.json`.
    pub fn read(session_root: &Path) -> std::io::Result<Self> {
        let path = session_root.join(METADATA_FILENAME);
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Refresh `updated_at` to `now` and persist. Called by `execute` when a
    /// sandbox is session-bound.
    pub fn touch(&mut self, session_root: &Path, now: DateTime<Utc>) -> std::io::Result<()> {
        self.updated_at = now;
        self.write(session_root)?;
        tracing::info!(event = event::SESSION_METADATA_UPDATED, session_id = %self.session_id);
        Ok(())
    }

    /// Age of this session's last activity, in hours, relative to `now`.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.updated_at).num_seconds() as f64 / 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let metadata = SessionMetadata::new("11111111-1111-4111-8111-111111111111", now);
        metadata.write(dir.path()).unwrap();

        let loaded = SessionMetadata::read(dir.path()).unwrap();
        assert_eq!(loaded.session_id, metadata.session_id);
        assert_eq!(loaded.created_at, metadata.created_at);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn touch_refreshes_updated_at_only() {
        let dir = tempfile::tempdir().unwrap();
        let created = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2026-01-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut metadata = SessionMetadata::new("sess", created);
        metadata.write(dir.path()).unwrap();
        metadata.touch(dir.path(), later).unwrap();

        assert_eq!(metadata.created_at, created);
        assert_eq!(metadata.updated_at, later);

        let loaded = SessionMetadata::read(dir.path()).unwrap();
        assert_eq!(loaded.updated_at, later);
    }

    #[test]
    fn age_hours_reflects_updated_at() {
        let created = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let now = DateTime::parse_from_rfc3339("2026-01-03T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let metadata = SessionMetadata::new("sess", created);

        assert!((metadata.age_hours(now) - 48.0).abs() < 0.01);
    }

    #[test]
    fn missing_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SessionMetadata::read(dir.path()).is_err());
    }
}
