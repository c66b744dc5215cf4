//! Expiry sweep over a zone's locks and edit trees.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::fsops::{remove_and_prune, walk_error};
use super::locks::{Expiry, LockState, Locks};
use super::{EntryPath, ZONES_TARGET, ZoneError, ZoneLayout};
use crate::identity::ConversationId;

/// Entries removed by a sweep, each prefixed with the zone name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Locks older than the maximum age, as `Zone/path`.
    pub expired_locks: Vec<String>,
    /// Unreadable lock files, as `Zone/path.lock`.
    pub corrupted_locks: Vec<String>,
    /// Edit copies without a lock, as `Zone/editzone/<conversation>/path`.
    pub orphan_editzones: Vec<String>,
}

impl MaintenanceReport {
    /// Appends another zone's findings.
    pub fn absorb(&mut self, other: Self) {
        self.expired_locks.extend(other.expired_locks);
        self.corrupted_locks.extend(other.corrupted_locks);
        self.orphan_editzones.extend(other.orphan_editzones);
    }

    /// Total number of removed entries.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.expired_locks.len() + self.corrupted_locks.len() + self.orphan_editzones.len()
    }
}

impl ZoneLayout {
    /// Removes expired and corrupted locks together with the expired
    /// owners' edit copies, then removes edit copies no lock covers, then
    /// empty directories no lock covers.
    ///
    /// A copy is covered when its owning conversation holds a lock on the
    /// copy's path or one of its ancestors. Fresh locks and their copies are
    /// never touched. Pruned directories are not listed in the report.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when the trees cannot be listed or entries
    /// cannot be removed.
    pub fn sweep(&self, expiry: Expiry) -> Result<MaintenanceReport, ZoneError> {
        let mut report = MaintenanceReport::default();
        let zone = self.zone();
        let locks = self.locks();
        let editzone = self.editzone_dir();

        for entry in locks.entries()? {
            let parsed = EntryPath::parse(&entry.relative).ok();
            let owned = match (entry.state, parsed) {
                (LockState::Held(record), Some(path)) => ConversationId::parse(&record.conv_id)
                    .ok()
                    .map(|owner| (record, owner, path)),
                _ => None,
            };
            let Some((record, owner, path)) = owned else {
                remove_and_prune(&entry.file, locks.dir())?;
                report
                    .corrupted_locks
                    .push(format!("{zone}/{}.lock", entry.relative));
                continue;
            };
            if !expiry.is_expired(&record) {
                continue;
            }
            remove_and_prune(&self.edit_copy(&owner, &path), &editzone)?;
            remove_and_prune(&entry.file, locks.dir())?;
            report.expired_locks.push(format!("{zone}/{path}"));
        }

        for (conversation, relative, file) in edit_files(&editzone)? {
            if is_covered(&locks, &conversation, &relative)? {
                continue;
            }
            remove_and_prune(&file, &editzone)?;
            let shown = if relative.is_empty() {
                conversation
            } else {
                format!("{conversation}/{relative}")
            };
            report
                .orphan_editzones
                .push(format!("{zone}/editzone/{shown}"));
        }

        let pruned = prune_empty_dirs(&locks, &editzone)?;
        if pruned > 0 {
            debug!(
                target: ZONES_TARGET,
                zone = %zone,
                pruned,
                "removed empty edit directories"
            );
        }

        if report.total() > 0 {
            info!(
                target: ZONES_TARGET,
                zone = %zone,
                expired = report.expired_locks.len(),
                corrupted = report.corrupted_locks.len(),
                orphans = report.orphan_editzones.len(),
                "maintenance removed stale entries"
            );
        }
        Ok(report)
    }
}

/// Every non-directory entry under the edit trees, as
/// `(conversation, relative path, file)`.
fn edit_files(editzone: &Path) -> Result<Vec<(String, String, PathBuf)>, ZoneError> {
    if !editzone.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for item in WalkDir::new(editzone)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let walked = item.map_err(|error| walk_error(editzone, error))?;
        if walked.file_type().is_dir() {
            continue;
        }
        if let Some((conversation, relative)) = split_edit_path(editzone, walked.path()) {
            files.push((conversation, relative, walked.into_path()));
        }
    }
    Ok(files)
}

/// Removes empty directories under the edit trees that no lock covers,
/// deepest first, including emptied conversation roots.
fn prune_empty_dirs(locks: &Locks, editzone: &Path) -> Result<usize, ZoneError> {
    if !editzone.is_dir() {
        return Ok(0);
    }
    let mut pruned = 0;
    for item in WalkDir::new(editzone)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true)
    {
        let walked = item.map_err(|error| walk_error(editzone, error))?;
        if !walked.file_type().is_dir() {
            continue;
        }
        let Some((conversation, relative)) = split_edit_path(editzone, walked.path()) else {
            continue;
        };
        if !relative.is_empty() && is_covered(locks, &conversation, &relative)? {
            continue;
        }
        // Fails harmlessly for directories that still hold entries.
        if fs::remove_dir(walked.path()).is_ok() {
            pruned += 1;
        }
    }
    Ok(pruned)
}

/// Splits a path under the edit trees into its conversation and the path
/// inside that conversation's tree.
fn split_edit_path(editzone: &Path, path: &Path) -> Option<(String, String)> {
    let inner = path.strip_prefix(editzone).ok()?;
    let mut segments = inner
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned());
    let conversation = segments.next()?;
    Some((conversation, segments.collect::<Vec<_>>().join("/")))
}

fn is_covered(locks: &Locks, conversation: &str, relative: &str) -> Result<bool, ZoneError> {
    let (Ok(owner), Ok(path)) = (
        ConversationId::parse(conversation),
        EntryPath::parse(relative),
    ) else {
        return Ok(false);
    };
    for candidate in std::iter::once(path.clone()).chain(path.ancestors()) {
        if let LockState::Held(record) = locks.read(&candidate)?
            && record.is_held_by(&owner)
        {
            return Ok(true);
        }
    }
    Ok(false)
}
