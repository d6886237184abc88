//! Encrypted submission store.
//!
//! Every submission lives in one JSON array that is encrypted as a single
//! envelope and written to `submissions.enc`. Each operation decrypts the whole
//! file, works on the list in memory and writes the whole file back. The file
//! is either absent (no submissions yet) or a complete envelope: writes land in
//! a temp file first and are renamed over the old one.
//!
//! Mutations hold a mutex for the full read-modify-write, so writers inside
//! one process never lose each other's updates. Nothing protects the file
//! against a second process.
//!
//! Once a mutation has been persisted its audit entry is best effort: a failed
//! append is logged and the caller still gets the result of the change.

mod audit;
mod submission;

use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::crypto::envelope::{Envelope, EnvelopeCipher, EnvelopeError};

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use submission::{generate_id, redact_email, NewSubmission, Submission, SubmissionExport};

const STORE_FILE: &str = "submissions.enc";
const AUDIT_FILE: &str = "audit.log";

/// Upper bound on the retention period, roughly a century.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io failed: {0}")]
    Io(#[from] io::Error),
    #[error("store envelope rejected: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("store contents malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("retention period must be between 1 and {MAX_RETENTION_DAYS} days, got {0}")]
    InvalidRetention(i64),
    #[error("expiry date is out of range")]
    ExpiryOutOfRange,
}

pub struct SubmissionStore {
    path: PathBuf,
    audit: AuditLog,
    cipher: EnvelopeCipher,
    retention: Duration,
    write_lock: Mutex<()>,
}

impl SubmissionStore {
    /// Opens (and creates if needed) the data directory.
    pub fn open(
        data_dir: impl AsRef<Path>,
        cipher: EnvelopeCipher,
        retention_days: i64,
    ) -> Result<Self, StoreError> {
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            return Err(StoreError::InvalidRetention(retention_days));
        }
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;

        Ok(Self {
            path: data_dir.join(STORE_FILE),
            audit: AuditLog::new(data_dir.join(AUDIT_FILE)),
            cipher,
            retention: Duration::days(retention_days),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn save(&self, new: NewSubmission) -> Result<String, StoreError> {
        self.save_at(new, Utc::now())
    }

    pub fn save_at(&self, new: NewSubmission, now: DateTime<Utc>) -> Result<String, StoreError> {
        self.insert_at(new, now).map(|s| s.id)
    }

    /// Like [`Self::save`], but hands back the stored record.
    pub fn insert(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        self.insert_at(new, Utc::now())
    }

    pub fn insert_at(&self, new: NewSubmission, now: DateTime<Utc>) -> Result<Submission, StoreError> {
        let _guard = self.lock();
        let mut submissions = self.load()?;

        let submission = new
            .into_submission(generate_id(), now, self.retention)
            .ok_or(StoreError::ExpiryOutOfRange)?;
        submissions.push(submission.clone());
        self.persist(&submissions)?;

        self.record(
            AuditAction::SubmissionCreated,
            json!({ "id": submission.id, "email": redact_email(&submission.email) }),
            now,
        );
        debug!(total = submissions.len(), "submission stored");
        Ok(submission)
    }

    pub fn read_all(&self) -> Result<Vec<Submission>, StoreError> {
        let submissions = {
            let _guard = self.lock();
            self.load()?
        };
        self.audit.append(
            AuditAction::SubmissionsRead,
            json!({ "count": submissions.len() }),
        )?;
        Ok(submissions)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        let found = {
            let _guard = self.lock();
            self.load()?.into_iter().find(|s| s.id == id)
        };
        self.audit.append(
            AuditAction::SubmissionRead,
            json!({ "id": id, "found": found.is_some() }),
        )?;
        Ok(found)
    }

    pub fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock();
        let mut submissions = self.load()?;
        let before = submissions.len();
        submissions.retain(|s| s.id != id);
        if submissions.len() == before {
            return Ok(false);
        }
        self.persist(&submissions)?;
        self.record(AuditAction::SubmissionDeleted, json!({ "id": id }), Utc::now());
        Ok(true)
    }

    /// Erasure request: removes every submission whose e-mail matches,
    /// ignoring case.
    pub fn delete_by_email(&self, email: &str) -> Result<usize, StoreError> {
        let _guard = self.lock();
        let mut submissions = self.load()?;
        let before = submissions.len();
        submissions.retain(|s| !s.email_matches(email));
        let removed = before - submissions.len();
        if removed > 0 {
            self.persist(&submissions)?;
        }
        self.record(
            AuditAction::ErasureRequest,
            json!({ "email": redact_email(email), "deleted": removed }),
            Utc::now(),
        );
        Ok(removed)
    }

    /// Portability request: same matching as [`Self::delete_by_email`].
    pub fn export_by_email(&self, email: &str) -> Result<Vec<SubmissionExport>, StoreError> {
        let matching: Vec<SubmissionExport> = {
            let _guard = self.lock();
            self.load()?
                .into_iter()
                .filter(|s| s.email_matches(email))
                .map(SubmissionExport::from)
                .collect()
        };
        self.audit.append(
            AuditAction::ExportRequest,
            json!({ "email": redact_email(email), "count": matching.len() }),
        )?;
        Ok(matching)
    }

    pub fn cleanup_expired(&self) -> Result<usize, StoreError> {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let _guard = self.lock();
        let mut submissions = self.load()?;
        let before = submissions.len();
        submissions.retain(|s| !s.is_expired(now));
        let removed = before - submissions.len();
        if removed == 0 {
            return Ok(0);
        }
        self.persist(&submissions)?;
        self.record(
            AuditAction::RetentionCleanup,
            json!({ "deleted": removed, "remaining": submissions.len() }),
            now,
        );
        info!(removed, remaining = submissions.len(), "expired submissions removed");
        Ok(removed)
    }

    /// Audit entry for a change that is already on disk.
    fn record(&self, action: AuditAction, details: serde_json::Value, now: DateTime<Utc>) {
        if let Err(e) = self.audit.append_at(action, details, now) {
            error!(?action, "audit append failed after a committed write: {e}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock carries no broken state.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self) -> Result<Vec<Submission>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let envelope: Envelope = serde_json::from_slice(&raw)?;
        let plaintext = self.cipher.decrypt(&envelope)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn persist(&self, submissions: &[Submission]) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec(submissions)?;
        let envelope = self.cipher.encrypt(&plaintext)?;

        let tmp = self.path.with_extension("enc.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(&envelope)?)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path, retention_days: i64) -> SubmissionStore {
        let cipher = EnvelopeCipher::from_secret("test-secret").expect("cipher");
        SubmissionStore::open(dir, cipher, retention_days).expect("open store")
    }

    fn form(email: &str) -> NewSubmission {
        NewSubmission {
            name: "Ada".into(),
            company: "Analytical Engines".into(),
            email: email.into(),
            interests: vec!["web".into()],
            message: "Hello".into(),
            consent: true,
            ip_hash: "ffff".into(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_file_means_no_submissions() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        assert!(store.read_all().expect("read").is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn saves_and_reads_back() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        let id = store.save(form("ada@example.com")).expect("save");

        let all = store.read_all().expect("read");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].email, "ada@example.com");
        assert_eq!(all[0].expires_at, all[0].created_at + Duration::days(180));

        let on_disk = fs::read_to_string(store.path()).expect("read file");
        assert!(!on_disk.contains("ada@example.com"));
        assert!(on_disk.contains("authTag"));
    }

    #[test]
    fn round_trips_through_persist_and_load() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 30);

        store.persist(&[]).expect("persist empty");
        assert!(store.load().expect("load").is_empty());

        let now = Utc::now();
        let list: Vec<Submission> = ["a@x.com", "b@x.com"]
            .iter()
            .map(|e| form(e).into_submission(generate_id(), now, Duration::days(30)))
            .collect::<Option<_>>()
            .expect("in range");
        store.persist(&list).expect("persist");
        assert_eq!(store.load().expect("load"), list);
        assert!(!store.path().with_extension("enc.tmp").exists());
    }

    #[test]
    fn wrong_key_fails_instead_of_returning_empty() {
        let dir = tempdir().expect("tempdir");
        store_in(dir.path(), 180).save(form("a@x.com")).expect("save");

        let other = SubmissionStore::open(
            dir.path(),
            EnvelopeCipher::from_secret("another-secret").expect("cipher"),
            180,
        )
        .expect("open");
        assert!(matches!(other.read_all(), Err(StoreError::Envelope(_))));
    }

    #[test]
    fn deletes_by_id() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        let keep = store.save(form("a@x.com")).expect("save");
        let gone = store.save(form("b@x.com")).expect("save");

        assert!(store.delete_by_id(&gone).expect("delete"));
        assert!(!store.delete_by_id(&gone).expect("second delete"));
        let ids: Vec<String> = store.read_all().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![keep]);
    }

    #[test]
    fn deletes_by_email_case_insensitively() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        store.save(form("A@x.com")).expect("save");
        store.save(form("a@x.com")).expect("save");
        store.save(form("someone@else.org")).expect("save");

        assert_eq!(store.delete_by_email("a@x.com").expect("erase"), 2);
        let left = store.read_all().expect("read");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].email, "someone@else.org");
        assert_eq!(store.delete_by_email("a@x.com").expect("erase again"), 0);
    }

    #[test]
    fn erases_and_exports_non_ascii_addresses_regardless_of_case() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        store.save(form("Jürgen@Ümlaut.de")).expect("save");
        store.save(form("ÉLODIE@exemple.fr")).expect("save");

        assert_eq!(store.export_by_email("jürgen@ümlaut.de").expect("export").len(), 1);
        assert_eq!(store.delete_by_email("jürgen@ümlaut.de").expect("erase"), 1);
        assert_eq!(store.delete_by_email("élodie@exemple.fr").expect("erase"), 1);
        assert!(store.read_all().expect("read").is_empty());
    }

    #[test]
    fn concurrent_saves_are_all_kept() {
        const WRITERS: usize = 16;
        let dir = tempdir().expect("tempdir");
        let store = std::sync::Arc::new(store_in(dir.path(), 180));

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .save(form(&format!("writer{i}@example.com")))
                        .expect("save")
                })
            })
            .collect();
        let mut ids: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().expect("writer thread"))
            .collect();

        let mut stored: Vec<String> = store
            .read_all()
            .expect("read")
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(stored.len(), WRITERS);
        ids.sort();
        stored.sort();
        assert_eq!(stored, ids);
    }

    #[test]
    fn audit_failure_does_not_undo_a_committed_save() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        // A directory where the log file should be makes every append fail.
        fs::create_dir(store.audit_log().path()).expect("block audit log");

        let id = store.save(form("a@x.com")).expect("save succeeds");
        assert_eq!(store.delete_by_email("nobody@x.com").expect("erase"), 0);

        let on_disk = store.load().expect("load");
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].id, id);
        assert!(store.delete_by_id(&id).expect("delete succeeds"));
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn exports_matching_submissions_without_internal_fields() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        store.save(form("Ada@Example.com")).expect("save");
        store.save(form("bob@example.com")).expect("save");

        let exported = store.export_by_email("ada@example.com").expect("export");
        assert_eq!(exported.len(), 1);
        let json = serde_json::to_value(&exported).unwrap();
        assert!(json[0].get("ipHash").is_none());
        assert_eq!(store.read_all().unwrap().len(), 2);
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        let now = Utc::now();
        store
            .save_at(form("old@x.com"), now - Duration::days(200))
            .expect("save old");
        let recent = store
            .save_at(form("new@x.com"), now - Duration::days(10))
            .expect("save recent");

        assert_eq!(store.cleanup_expired_at(now).expect("cleanup"), 1);
        assert_eq!(store.cleanup_expired_at(now).expect("cleanup again"), 0);

        let left = store.read_all().expect("read");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, recent);
    }

    #[test]
    fn every_mutation_is_audited() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path(), 180);
        let id = store.save(form("jonathan@example.com")).expect("save");
        store.delete_by_id(&id).expect("delete");

        let log = fs::read_to_string(store.audit_log().path()).expect("audit log");
        let actions: Vec<AuditAction> = log
            .lines()
            .map(|l| serde_json::from_str::<AuditEntry>(l).unwrap().action)
            .collect();
        assert_eq!(
            actions,
            vec![AuditAction::SubmissionCreated, AuditAction::SubmissionDeleted]
        );
        assert!(log.contains("jo***@example.com"));
        assert!(!log.contains("jonathan@example.com"));
    }

    #[test]
    fn rejects_zero_retention() {
        let dir = tempdir().expect("tempdir");
        let cipher = EnvelopeCipher::from_secret("s").expect("cipher");
        assert!(matches!(
            SubmissionStore::open(dir.path(), cipher, 0),
            Err(StoreError::InvalidRetention(0))
        ));
    }

    #[test]
    fn rejects_retention_beyond_the_calendar() {
        let dir = tempdir().expect("tempdir");
        for days in [MAX_RETENTION_DAYS + 1, i64::MAX] {
            let cipher = EnvelopeCipher::from_secret("s").expect("cipher");
            assert!(matches!(
                SubmissionStore::open(dir.path(), cipher, days),
                Err(StoreError::InvalidRetention(d)) if d == days
            ));
        }
        let store = store_in(dir.path(), MAX_RETENTION_DAYS);
        store.save(form("a@x.com")).expect("save with longest retention");
    }
}
