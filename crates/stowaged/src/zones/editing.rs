//! The open/save/cancel editing protocol.
//!
//! `open_edit` locks a data path for one conversation and copies it into that
//! conversation's edit tree. Writes and commands then act on the copy only.
//! `save_edit` replaces the data path with the copy, and `cancel_edit`
//! throws the copy away. Both release the lock and prune empty directories.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use stowage_sandbox::resolve;

use super::fsops::{copy_tree, exists, remove_and_prune, remove_entry};
use super::locks::{Expiry, LockRecord, LockState, Locks};
use super::{EntryPath, ZONES_TARGET, ZoneError, ZoneLayout};
use crate::identity::{ConversationId, UserId};

/// How `open_edit` obtained its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The path was unlocked.
    Opened,
    /// The conversation already held the lock; it was refreshed and the
    /// existing copy kept.
    Reopened,
    /// An expired or corrupted lock was replaced.
    TookOver {
        /// Conversation whose stale lock was replaced, when the record
        /// could be read.
        previous_owner: Option<String>,
    },
}

/// What `cancel_edit` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    /// An edit copy was discarded.
    pub discarded_copy: bool,
    /// A lock record was released.
    pub released_lock: bool,
}

/// What `force_unlock` removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnlockReport {
    /// Conversations whose edit copy of the path was removed.
    pub removed_copies: Vec<String>,
    /// A lock record was removed.
    pub removed_lock: bool,
}

impl ZoneLayout {
    /// Edit copy of `path` for `conversation`.
    #[must_use]
    pub fn edit_copy(&self, conversation: &ConversationId, path: &EntryPath) -> PathBuf {
        self.edit_root(conversation).join(path.as_str())
    }

    /// Edit tree of `conversation`, which must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::NothingOpen`] when the conversation has not
    /// opened anything in this zone.
    pub fn open_edit_root(&self, conversation: &ConversationId) -> Result<PathBuf, ZoneError> {
        let root = self.edit_root(conversation);
        if root.is_dir() {
            Ok(root)
        } else {
            Err(ZoneError::NothingOpen {
                conversation: conversation.to_string(),
            })
        }
    }

    /// Locks `path` for `conversation` and copies it into the edit tree.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::NotFound`] when the data path does not exist,
    /// [`ZoneError::Locked`] when another conversation holds a live lock on
    /// the path, an ancestor or a descendant, and [`ZoneError::Io`] when the
    /// lock or copy cannot be written.
    pub fn open_edit(
        &self,
        user: &UserId,
        conversation: &ConversationId,
        path: &EntryPath,
        expiry: Expiry,
    ) -> Result<OpenOutcome, ZoneError> {
        self.ensure()?;
        let source = resolve(&self.data_dir(), path.as_str())?;
        if !exists(&source) {
            return Err(ZoneError::not_found(path));
        }

        let locks = self.locks();
        if let Some(record) = locks.related_conflict(path, conversation, expiry)? {
            return Err(record.conflict(expiry.now));
        }

        let record = LockRecord::new(user, conversation, path, expiry.now);
        let outcome = self.claim(&locks, path, &record, expiry, true)?;

        let copy = self.edit_copy(conversation, path);
        if outcome == OpenOutcome::Reopened && exists(&copy) {
            debug!(target: ZONES_TARGET, zone = %self.zone(), path = %path, "edit reopened");
            return Ok(outcome);
        }

        let copied = remove_entry(&copy).and_then(|_| copy_tree(&source, &copy));
        if let Err(error) = copied {
            drop(locks.release(path));
            drop(remove_and_prune(&copy, &self.editzone_dir()));
            return Err(error);
        }

        debug!(
            target: ZONES_TARGET,
            zone = %self.zone(),
            path = %path,
            conversation = %conversation,
            ?outcome,
            "edit opened"
        );
        Ok(outcome)
    }

    /// Installs `record` as the lock on `path`, refreshing or taking over an
    /// existing lock where allowed.
    fn claim(
        &self,
        locks: &Locks,
        path: &EntryPath,
        record: &LockRecord,
        expiry: Expiry,
        may_retry: bool,
    ) -> Result<OpenOutcome, ZoneError> {
        match locks.read(path)? {
            LockState::Absent => {
                if locks.acquire(path, record)? {
                    Ok(OpenOutcome::Opened)
                } else if may_retry {
                    self.claim(locks, path, record, expiry, false)
                } else {
                    Err(ZoneError::io(
                        locks.file_for(path),
                        std::io::Error::from(std::io::ErrorKind::AlreadyExists),
                    ))
                }
            }
            LockState::Held(existing) if existing.conv_id == record.conv_id => {
                locks.replace(path, record)?;
                Ok(OpenOutcome::Reopened)
            }
            LockState::Held(existing) if expiry.is_expired(&existing) => {
                self.discard_stale_copy(&existing.conv_id, path)?;
                locks.replace(path, record)?;
                info!(
                    target: ZONES_TARGET,
                    zone = %self.zone(),
                    path = %path,
                    previous_owner = %existing.conv_id,
                    "took over expired lock"
                );
                Ok(OpenOutcome::TookOver {
                    previous_owner: Some(existing.conv_id),
                })
            }
            LockState::Held(existing) => Err(existing.conflict(expiry.now)),
            LockState::Corrupted => {
                locks.replace(path, record)?;
                info!(target: ZONES_TARGET, zone = %self.zone(), path = %path, "replaced corrupted lock");
                Ok(OpenOutcome::TookOver {
                    previous_owner: None,
                })
            }
        }
    }

    fn discard_stale_copy(&self, owner: &str, path: &EntryPath) -> Result<(), ZoneError> {
        let Ok(previous) = ConversationId::parse(owner) else {
            return Ok(());
        };
        remove_and_prune(&self.edit_copy(&previous, path), &self.editzone_dir())?;
        Ok(())
    }

    /// Replaces the data path with the conversation's edit copy, then
    /// removes the copy and the lock.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::NotFound`] when there is no edit copy,
    /// [`ZoneError::Locked`] when another conversation now holds a live lock
    /// on the path, and [`ZoneError::Io`] on filesystem failures.
    pub fn save_edit(
        &self,
        conversation: &ConversationId,
        path: &EntryPath,
        expiry: Expiry,
    ) -> Result<(), ZoneError> {
        let copy = self.edit_copy(conversation, path);
        if !exists(&copy) {
            return Err(ZoneError::not_found(path));
        }

        let locks = self.locks();
        if let LockState::Held(record) = locks.read(path)?
            && !record.is_held_by(conversation)
            && !expiry.is_expired(&record)
        {
            return Err(record.conflict(expiry.now));
        }

        let target = resolve(&self.data_dir(), path.as_str())?;
        remove_entry(&target)?;
        copy_tree(&copy, &target)?;
        remove_and_prune(&copy, &self.editzone_dir())?;
        locks.release(path)?;

        debug!(
            target: ZONES_TARGET,
            zone = %self.zone(),
            path = %path,
            conversation = %conversation,
            "edit saved"
        );
        Ok(())
    }

    /// Discards the conversation's edit copy and releases its lock. Locks
    /// held live by other conversations are left alone. Cancelling with
    /// nothing open succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when files cannot be removed.
    pub fn cancel_edit(
        &self,
        conversation: &ConversationId,
        path: &EntryPath,
        expiry: Expiry,
    ) -> Result<CancelOutcome, ZoneError> {
        let discarded_copy =
            remove_and_prune(&self.edit_copy(conversation, path), &self.editzone_dir())?;

        let locks = self.locks();
        let releasable = match locks.read(path)? {
            LockState::Absent => false,
            LockState::Corrupted => true,
            LockState::Held(record) => {
                record.is_held_by(conversation) || expiry.is_expired(&record)
            }
        };
        let released_lock = releasable && locks.release(path)?;

        debug!(
            target: ZONES_TARGET,
            zone = %self.zone(),
            path = %path,
            conversation = %conversation,
            discarded_copy,
            released_lock,
            "edit cancelled"
        );
        Ok(CancelOutcome {
            discarded_copy,
            released_lock,
        })
    }

    /// Removes every conversation's edit copy of `path` and its lock,
    /// whoever owns them.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when the edit trees cannot be listed or
    /// entries cannot be removed.
    pub fn force_unlock(&self, path: &EntryPath) -> Result<UnlockReport, ZoneError> {
        let editzone = self.editzone_dir();
        let mut report = UnlockReport::default();

        if editzone.is_dir() {
            let listing =
                std::fs::read_dir(&editzone).map_err(|error| ZoneError::io(&editzone, error))?;
            let mut conversations: Vec<String> = listing
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect();
            conversations.sort();
            for conversation in conversations {
                let copy = editzone.join(&conversation).join(path.as_str());
                if remove_and_prune(&copy, &editzone)? {
                    report.removed_copies.push(conversation);
                }
            }
        }
        report.removed_lock = self.locks().release(path)?;

        info!(
            target: ZONES_TARGET,
            zone = %self.zone(),
            path = %path,
            copies = report.removed_copies.len(),
            removed_lock = report.removed_lock,
            "forced unlock"
        );
        Ok(report)
    }
}
