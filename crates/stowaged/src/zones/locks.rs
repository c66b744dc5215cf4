//! Lock records and the lock registry of an editable zone.
//!
//! A lock is a small JSON file at `locks/<path>.lock`; its presence is the
//! lock. New locks are created with an exclusive create-if-absent rename, so
//! two conversations racing to open the same path cannot both win.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use walkdir::WalkDir;

use super::fsops::remove_and_prune;
use super::{EntryPath, ZONES_TARGET, ZoneError, ZoneLayout};
use crate::identity::{ConversationId, UserId};

const LOCK_SUFFIX: &str = ".lock";

/// Persisted lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Conversation holding the lock.
    pub conv_id: String,
    /// User owning the zone.
    pub user_id: String,
    /// When the lock was taken or last refreshed.
    #[serde(with = "time::serde::rfc3339")]
    pub locked_at: OffsetDateTime,
    /// Locked path inside the zone.
    pub path: String,
}

impl LockRecord {
    /// Builds a record for `conversation` taken at `now`.
    #[must_use]
    pub fn new(
        user: &UserId,
        conversation: &ConversationId,
        path: &EntryPath,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            conv_id: conversation.as_str().to_owned(),
            user_id: user.as_str().to_owned(),
            locked_at: now,
            path: path.as_str().to_owned(),
        }
    }

    /// Time elapsed since the lock was taken. Records from the future have
    /// age zero.
    #[must_use]
    pub fn age(&self, now: OffsetDateTime) -> Duration {
        Duration::try_from(now - self.locked_at).unwrap_or_default()
    }

    /// True when the record belongs to `conversation`.
    #[must_use]
    pub fn is_held_by(&self, conversation: &ConversationId) -> bool {
        self.conv_id == conversation.as_str()
    }

    /// Lock timestamp as RFC 3339 text.
    #[must_use]
    pub fn locked_since(&self) -> String {
        self.locked_at.format(&Rfc3339).unwrap_or_default()
    }

    /// The [`ZoneError::Locked`] reported to other conversations.
    #[must_use]
    pub fn conflict(&self, now: OffsetDateTime) -> ZoneError {
        ZoneError::Locked {
            path: self.path.clone(),
            owner: self.conv_id.clone(),
            locked_since: self.locked_since(),
            age_secs: self.age(now).as_secs(),
        }
    }
}

/// Point in time against which lock expiry is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// Current time.
    pub now: OffsetDateTime,
    /// Age after which a lock no longer blocks anyone.
    pub max_age: Duration,
}

impl Expiry {
    /// Expiry judged at the current UTC time.
    #[must_use]
    pub fn at_now(max_age: Duration) -> Self {
        Self {
            now: OffsetDateTime::now_utc(),
            max_age,
        }
    }

    /// True when `record` is older than the maximum age.
    #[must_use]
    pub fn is_expired(&self, record: &LockRecord) -> bool {
        record.age(self.now) > self.max_age
    }
}

/// What the registry holds for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// No lock file.
    Absent,
    /// A well-formed record.
    Held(LockRecord),
    /// A lock file that does not parse; treated as absent by editors and
    /// removed by maintenance.
    Corrupted,
}

/// A lock file found while listing the registry.
#[derive(Debug, Clone)]
pub struct LockEntry {
    /// Lock file on disk.
    pub file: PathBuf,
    /// Zone path the file locks, derived from its location.
    pub relative: String,
    /// Parsed content.
    pub state: LockState,
}

/// Lock registry rooted at a zone's `locks/` directory.
#[derive(Debug, Clone)]
pub struct Locks {
    dir: PathBuf,
}

impl Locks {
    /// Registry stored under `dir`.
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Registry directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lock file for `path`.
    #[must_use]
    pub fn file_for(&self, path: &EntryPath) -> PathBuf {
        self.dir.join(format!("{path}{LOCK_SUFFIX}"))
    }

    /// Reads the lock state of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when an existing lock file cannot be read.
    pub fn read(&self, path: &EntryPath) -> Result<LockState, ZoneError> {
        read_state(&self.file_for(path))
    }

    /// Creates the lock for `record` if none exists. Returns false when
    /// another lock file was already in place.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when the record cannot be written.
    pub fn acquire(&self, path: &EntryPath, record: &LockRecord) -> Result<bool, ZoneError> {
        let file = self.file_for(path);
        let staged = stage(&file, record)?;
        match staged.persist_noclobber(&file) {
            Ok(_) => {
                debug!(target: ZONES_TARGET, path = %path, conversation = %record.conv_id, "lock acquired");
                Ok(true)
            }
            Err(error) if error.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(error) => Err(ZoneError::io(&file, error.error)),
        }
    }

    /// Writes `record` over whatever lock exists for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when the record cannot be written.
    pub fn replace(&self, path: &EntryPath, record: &LockRecord) -> Result<(), ZoneError> {
        let file = self.file_for(path);
        stage(&file, record)?
            .persist(&file)
            .map_err(|error| ZoneError::io(&file, error.error))?;
        debug!(target: ZONES_TARGET, path = %path, conversation = %record.conv_id, "lock written");
        Ok(())
    }

    /// Removes the lock for `path` and prunes empty directories below the
    /// registry root. Returns false when there was no lock.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when the file cannot be removed.
    pub fn release(&self, path: &EntryPath) -> Result<bool, ZoneError> {
        remove_and_prune(&self.file_for(path), &self.dir)
    }

    /// Finds a live lock held by another conversation on `path`, one of its
    /// ancestors, or anything beneath it.
    ///
    /// Locks on the exact path are not considered here; the caller decides
    /// between refresh, takeover and refusal for those.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when the registry cannot be read.
    pub fn related_conflict(
        &self,
        path: &EntryPath,
        conversation: &ConversationId,
        expiry: Expiry,
    ) -> Result<Option<LockRecord>, ZoneError> {
        let blocks = |record: &LockRecord| {
            !record.is_held_by(conversation) && !expiry.is_expired(record)
        };

        for ancestor in path.ancestors() {
            if let LockState::Held(record) = self.read(&ancestor)?
                && blocks(&record)
            {
                return Ok(Some(record));
            }
        }

        let nested = self.dir.join(path.as_str());
        if !nested.is_dir() {
            return Ok(None);
        }
        Ok(self
            .entries_under(&nested)?
            .into_iter()
            .filter_map(|entry| match entry.state {
                LockState::Held(record) => Some(record),
                LockState::Absent | LockState::Corrupted => None,
            })
            .find(blocks))
    }

    /// Every lock file in the registry. A missing registry is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when the tree cannot be walked.
    pub fn entries(&self) -> Result<Vec<LockEntry>, ZoneError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        self.entries_under(&self.dir)
    }

    fn entries_under(&self, start: &Path) -> Result<Vec<LockEntry>, ZoneError> {
        let mut entries = Vec::new();
        for item in WalkDir::new(start).follow_links(false).sort_by_file_name() {
            let walked = item.map_err(|error| {
                let path = error.path().unwrap_or(start).to_path_buf();
                ZoneError::io(path, io::Error::other(error.to_string()))
            })?;
            if !walked.file_type().is_file() {
                continue;
            }
            let Some(relative) = self.relative_of(walked.path()) else {
                continue;
            };
            entries.push(LockEntry {
                state: read_state(walked.path())?,
                file: walked.into_path(),
                relative,
            });
        }
        Ok(entries)
    }

    /// Zone path locked by `file`, or `None` for files without the lock
    /// suffix.
    fn relative_of(&self, file: &Path) -> Option<String> {
        let inner = file.strip_prefix(&self.dir).ok()?;
        let joined = inner
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        joined
            .strip_suffix(LOCK_SUFFIX)
            .filter(|stem| !stem.is_empty())
            .map(str::to_owned)
    }
}

impl ZoneLayout {
    /// Lock registry of this zone.
    #[must_use]
    pub fn locks(&self) -> Locks {
        Locks::new(self.locks_dir())
    }
}

fn read_state(file: &Path) -> Result<LockState, ZoneError> {
    let bytes = match fs::read(file) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(LockState::Absent),
        Err(error) => return Err(ZoneError::io(file, error)),
    };
    Ok(serde_json::from_slice(&bytes).map_or(LockState::Corrupted, LockState::Held))
}

fn stage(file: &Path, record: &LockRecord) -> Result<NamedTempFile, ZoneError> {
    let parent = file
        .parent()
        .ok_or_else(|| ZoneError::io(file, io::Error::from(io::ErrorKind::InvalidInput)))?;
    fs::create_dir_all(parent).map_err(|error| ZoneError::io(parent, error))?;
    let mut staged = NamedTempFile::new_in(parent).map_err(|error| ZoneError::io(parent, error))?;
    let body = serde_json::to_vec_pretty(record).map_err(|error| ZoneError::io(file, error.into()))?;
    staged
        .write_all(&body)
        .map_err(|error| ZoneError::io(file, error))?;
    Ok(staged)
}
