//! Direct writes, deletes and renames on a zone's data tree.

use std::fs;

use serde::Serialize;
use tracing::{debug, warn};

use stowage_sandbox::resolve;

use super::{
    BROKER_TARGET, Broker, BrokerError, BrokerResult, Caller, Outcome, commit_if_versioned,
    message_or,
};
use crate::broker::requests::{PathRequest, RenameRequest, WriteRequest};
use crate::version::{Repository, write_message};
use crate::zones::fsops::{exists, remove_entry, write_atomic};
use crate::zones::{EntryPath, Zone, ZoneError};

/// Result of `write` and `edit_write`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// Normalised path written.
    pub path: String,
    /// UTF-8 bytes of content written by this call.
    pub bytes: u64,
    /// True when the file did not exist before.
    pub created: bool,
}

/// Result naming the single path an operation acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathReport {
    /// Normalised path.
    pub path: String,
}

/// Result of `rename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    /// Previous path.
    pub old_path: String,
    /// New path.
    pub new_path: String,
}

impl Broker {
    /// Writes text to a file in a zone's data tree, creating parent
    /// directories. Documents writes end in one commit.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ZoneForbidden`] for Uploads,
    /// [`BrokerError::QuotaExceeded`] when the content is larger than the
    /// write limit, and path, filesystem or version-control failures.
    pub fn write(&self, caller: &Caller, request: &WriteRequest) -> BrokerResult<WriteReport> {
        let layout = self.editable(caller, request.zone, "write")?;
        let path = Self::entry(request.zone, &request.path)?;
        let bytes = self.check_size(&path, &request.content)?;

        layout.ensure()?;
        if layout.zone().is_versioned() {
            Repository::at(layout.data_dir()).ensure()?;
        }
        let target = resolve(&layout.data_dir(), path.as_str())?;
        let created = !exists(&target);
        write_atomic(&target, request.content.as_bytes(), request.append)?;

        let message = message_or(request.message.as_deref(), || {
            write_message(&path, !created, request.append)
        });
        commit_if_versioned(&layout, &message)?;

        Ok(Outcome::new(
            format!("Written: {path}"),
            WriteReport {
                path: path.to_string(),
                bytes,
                created,
            },
        ))
    }

    /// Writes text to a file inside the caller's edit tree. The data tree
    /// is not touched and nothing is committed.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ZoneForbidden`] for Uploads or when nothing is
    /// open, [`BrokerError::QuotaExceeded`] for oversized content, and path
    /// or filesystem failures.
    pub fn edit_write(&self, caller: &Caller, request: &WriteRequest) -> BrokerResult<WriteReport> {
        let layout = self.editable(caller, request.zone, "edit_write")?;
        let path = Self::entry(request.zone, &request.path)?;
        let bytes = self.check_size(&path, &request.content)?;

        let root = layout.open_edit_root(&caller.conversation)?;
        let target = resolve(&root, path.as_str())?;
        let created = !exists(&target);
        write_atomic(&target, request.content.as_bytes(), request.append)?;

        Ok(Outcome::new(
            format!("Written to editzone: {path}"),
            WriteReport {
                path: path.to_string(),
                bytes,
                created,
            },
        ))
    }

    /// Removes a file or directory tree. Uploads deletes from the
    /// conversation's uploads directory; Documents deletes through the
    /// repository and commits.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the path escapes, does not exist, or
    /// cannot be removed or committed.
    pub fn delete(&self, caller: &Caller, request: &PathRequest) -> BrokerResult<PathReport> {
        let zone = request.zone;
        let path = Self::entry(zone, &request.path)?;
        debug!(target: BROKER_TARGET, zone = %zone, path = %path, "delete requested");

        if zone == Zone::Uploads {
            let root = self.user_root(caller).uploads(&caller.conversation);
            let target = resolve(&root, path.as_str())?;
            if !remove_entry(&target)? {
                return Err(ZoneError::not_found(&path).into());
            }
        } else {
            let layout = self.editable(caller, zone, "delete")?;
            let target = resolve(&layout.data_dir(), path.as_str())?;
            if !exists(&target) {
                return Err(ZoneError::not_found(&path).into());
            }
            if zone.is_versioned() {
                Repository::at(layout.data_dir()).remove(&path)?;
            }
            remove_entry(&target)?;
            let message = message_or(request.message.as_deref(), || format!("Deleted {path}"));
            commit_if_versioned(&layout, &message)?;
        }

        Ok(Outcome::new(
            format!("Deleted: {path}"),
            PathReport {
                path: path.to_string(),
            },
        ))
    }

    /// Moves an entry to a new path within the same data tree. Documents
    /// renames through the repository and commits.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ZoneForbidden`] for Uploads and path,
    /// filesystem or version-control failures.
    pub fn rename(&self, caller: &Caller, request: &RenameRequest) -> BrokerResult<RenameReport> {
        let layout = self.editable(caller, request.zone, "rename")?;
        let from = Self::entry(request.zone, &request.old_path)?;
        let to = Self::entry(request.zone, &request.new_path)?;

        let data = layout.data_dir();
        let source = resolve(&data, from.as_str())?;
        if !exists(&source) {
            return Err(ZoneError::not_found(&from).into());
        }
        let target = resolve(&data, to.as_str())?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| ZoneError::io(parent, error))?;
        }

        if layout.zone().is_versioned() {
            let repository = Repository::at(data);
            if let Err(error) = repository.rename(&from, &to) {
                warn!(
                    target: BROKER_TARGET,
                    from = %from,
                    to = %to,
                    %error,
                    "repository rename failed; renaming on disk"
                );
            }
        }
        if exists(&source) {
            fs::rename(&source, &target).map_err(|error| ZoneError::io(&source, error))?;
        }
        let message = message_or(request.message.as_deref(), || {
            format!("Renamed {from} -> {to}")
        });
        commit_if_versioned(&layout, &message)?;

        Ok(Outcome::new(
            format!("Renamed: {from} -> {to}"),
            RenameReport {
                old_path: from.to_string(),
                new_path: to.to_string(),
            },
        ))
    }

    fn check_size(&self, path: &EntryPath, content: &str) -> Result<u64, BrokerError> {
        let size_bytes = u64::try_from(content.len()).unwrap_or(u64::MAX);
        let max_bytes = self.limits.max_write_bytes();
        if size_bytes > max_bytes {
            return Err(BrokerError::QuotaExceeded {
                path: path.to_string(),
                size_bytes,
                max_bytes,
            });
        }
        Ok(size_bytes)
    }
}
