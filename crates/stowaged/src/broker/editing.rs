//! Broker side of the editing protocol: open, save, cancel and the
//! administrative unlock.

use serde::Serialize;

use super::{Broker, BrokerError, BrokerResult, Caller, Outcome, commit_if_versioned, message_or};
use crate::broker::files::PathReport;
use crate::broker::requests::PathRequest;
use crate::version::Repository;
use crate::zones::Zone;
use crate::zones::editing::{CancelOutcome, OpenOutcome, UnlockReport};

/// Result of `edit_open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenReport {
    /// Normalised path opened.
    pub path: String,
    /// `opened`, `reopened` or `took_over`.
    pub lock: &'static str,
    /// Conversation whose stale lock was replaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_owner: Option<String>,
}

impl OpenReport {
    fn from_outcome(path: String, outcome: OpenOutcome) -> Self {
        let (lock, previous_owner) = match outcome {
            OpenOutcome::Opened => ("opened", None),
            OpenOutcome::Reopened => ("reopened", None),
            OpenOutcome::TookOver { previous_owner } => ("took_over", previous_owner),
        };
        Self {
            path,
            lock,
            previous_owner,
        }
    }
}

/// Result of `edit_cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelReport {
    /// Normalised path.
    pub path: String,
    /// What was removed.
    #[serde(flatten)]
    pub outcome: CancelOutcome,
}

impl Broker {
    /// Locks a path for the caller's conversation and copies it into the
    /// conversation's edit tree.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ZoneForbidden`] for Uploads, and the
    /// not-found, locked and filesystem failures of
    /// [`ZoneLayout::open_edit`](crate::zones::ZoneLayout::open_edit).
    pub fn edit_open(&self, caller: &Caller, request: &PathRequest) -> BrokerResult<OpenReport> {
        let layout = self.editable(caller, request.zone, "edit_open")?;
        let path = Self::entry(request.zone, &request.path)?;
        let outcome = layout.open_edit(&caller.user, &caller.conversation, &path, self.expiry())?;
        Ok(Outcome::new(
            format!("Opened for editing: {path}"),
            OpenReport::from_outcome(path.to_string(), outcome),
        ))
    }

    /// Copies the caller's edit copy back over the data path, releases the
    /// lock and, for Documents, commits.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ZoneForbidden`] for Uploads,
    /// [`BrokerError::Zone`] when there is no copy or another conversation
    /// holds the lock, and version-control failures.
    pub fn edit_save(&self, caller: &Caller, request: &PathRequest) -> BrokerResult<PathReport> {
        let layout = self.editable(caller, request.zone, "edit_save")?;
        let path = Self::entry(request.zone, &request.path)?;
        if layout.zone().is_versioned() {
            Repository::at(layout.data_dir()).ensure()?;
        }
        layout.save_edit(&caller.conversation, &path, self.expiry())?;

        let message = message_or(request.message.as_deref(), || format!("Modified {path}"));
        commit_if_versioned(&layout, &message)?;
        Ok(Outcome::new(
            format!("Saved: {path}"),
            PathReport {
                path: path.to_string(),
            },
        ))
    }

    /// Discards the caller's edit copy and lock. Succeeds when nothing is
    /// open.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ZoneForbidden`] for Uploads and filesystem
    /// failures.
    pub fn edit_cancel(&self, caller: &Caller, request: &PathRequest) -> BrokerResult<CancelReport> {
        let layout = self.editable(caller, request.zone, "edit_cancel")?;
        let path = Self::entry(request.zone, &request.path)?;
        let outcome = layout.cancel_edit(&caller.conversation, &path, self.expiry())?;
        Ok(Outcome::new(
            format!("Cancelled: {path}"),
            CancelReport {
                path: path.to_string(),
                outcome,
            },
        ))
    }

    /// Removes every conversation's edit copy of a path and its lock.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ZoneForbidden`] for Uploads and filesystem
    /// failures.
    pub fn force_unlock(&self, caller: &Caller, request: &PathRequest) -> BrokerResult<UnlockReport> {
        let layout = self.editable(caller, request.zone, "force_unlock")?;
        let path = Self::entry(request.zone, &request.path)?;
        let report = layout.force_unlock(&path)?;
        Ok(Outcome::new(
            format!("Unlocked: {path} in {}", zone_name(request.zone)),
            report,
        ))
    }
}

fn zone_name(zone: Zone) -> String {
    String::from(zone)
}
