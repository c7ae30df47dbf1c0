//! The single-active-meeting lock.
//!
//! A JSON lock file with an expiry enforces "only one bot runs at a
//! time". Expiry guarantees forward progress after a crash: a stale lock
//! is simply overwritten by the next acquirer.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ms_domain::error::Result;
use ms_domain::meeting::Occurrence;

use crate::atomic;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub event_id: String,
    pub event_start: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn owned_by(&self, occurrence: &Occurrence) -> bool {
        self.event_id == occurrence.event_id && self.event_start == occurrence.start
    }
}

/// File-backed lock with expiry.
pub struct ActiveMeetingLock {
    path: PathBuf,
}

impl ActiveMeetingLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the current lock record, if any. An unreadable file is
    /// treated as absent.
    pub fn read(&self) -> Option<LockRecord> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Try to take the lock for `occurrence` until `expires_at`.
    ///
    /// Succeeds iff no lock exists or the existing lock has expired.
    pub fn acquire(&self, occurrence: &Occurrence, expires_at: DateTime<Utc>) -> Result<bool> {
        self.acquire_at(occurrence, expires_at, Utc::now())
    }

    /// Clock-injected variant for tests.
    pub fn acquire_at(
        &self,
        occurrence: &Occurrence,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if let Some(current) = self.read() {
            if current.is_active(now) {
                return Ok(false);
            }
        }

        let record = LockRecord {
            event_id: occurrence.event_id.clone(),
            event_start: occurrence.start,
            expires_at,
            created_at: now,
        };
        atomic::write_json(&self.path, &record)?;
        Ok(true)
    }

    /// Release the lock. Idempotent; only removes the file when the
    /// caller still owns it.
    pub fn release(&self, occurrence: &Occurrence) {
        let Some(current) = self.read() else {
            return;
        };
        if !current.owned_by(occurrence) {
            return;
        }
        // Best-effort; expiry will eventually clear a leftover file.
        let _ = std::fs::remove_file(&self.path);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn occ(event_id: &str) -> Occurrence {
        Occurrence::new(event_id, Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap())
    }

    #[test]
    fn acquire_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ActiveMeetingLock::new(dir.path().join("active_meeting.json"));
        let now = Utc::now();
        assert!(lock.acquire_at(&occ("ev1"), now + Duration::hours(1), now).unwrap());
    }

    #[test]
    fn second_acquire_fails_while_active() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ActiveMeetingLock::new(dir.path().join("active_meeting.json"));
        let now = Utc::now();
        assert!(lock.acquire_at(&occ("ev1"), now + Duration::hours(1), now).unwrap());
        assert!(!lock.acquire_at(&occ("ev2"), now + Duration::hours(1), now).unwrap());
    }

    #[test]
    fn expired_lock_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ActiveMeetingLock::new(dir.path().join("active_meeting.json"));
        let now = Utc::now();
        assert!(lock.acquire_at(&occ("ev1"), now - Duration::minutes(1), now).unwrap());
        assert!(lock.acquire_at(&occ("ev2"), now + Duration::hours(1), now).unwrap());
        assert_eq!(lock.read().unwrap().event_id, "ev2");
    }

    #[test]
    fn release_requires_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ActiveMeetingLock::new(dir.path().join("active_meeting.json"));
        let now = Utc::now();
        lock.acquire_at(&occ("ev1"), now + Duration::hours(1), now).unwrap();

        lock.release(&occ("ev2"));
        assert!(lock.read().is_some(), "non-owner release must be a no-op");

        lock.release(&occ("ev1"));
        assert!(lock.read().is_none());
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ActiveMeetingLock::new(dir.path().join("active_meeting.json"));
        lock.release(&occ("ev1"));
        lock.release(&occ("ev1"));
    }

    #[test]
    fn corrupt_lock_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active_meeting.json");
        std::fs::write(&path, "garbage").unwrap();
        let lock = ActiveMeetingLock::new(&path);
        assert!(lock.read().is_none());
        let now = Utc::now();
        assert!(lock.acquire_at(&occ("ev1"), now + Duration::hours(1), now).unwrap());
    }
}
