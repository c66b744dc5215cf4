//! The broker operation surface.
//!
//! A [`Broker`] owns the storage root, the enforcement [`Limits`] and the
//! [`CommandPolicy`], and exposes one method per operation. Each method
//! resolves the caller's user root, picks the zone's chroot, validates its
//! inputs, acts on the filesystem or through the executor, and commits
//! Documents mutations. Methods return an [`Outcome`] carrying a typed
//! payload, or a [`BrokerError`] that renders as a failure envelope.

mod bridge;
mod editing;
pub mod errors;
mod exec;
mod files;
mod import;
mod reports;
pub mod requests;

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::debug;

use stowage_config::{Config, Limits};
use stowage_sandbox::CommandPolicy;

use crate::envelope::Envelope;
use crate::identity::{ConversationId, UserId};
use crate::version::Repository;
use crate::zones::locks::Expiry;
use crate::zones::{EntryPath, UserRoot, Zone, ZoneLayout};

pub use self::bridge::BridgeReport;
pub use self::errors::BrokerError;
pub use self::exec::CommandReport;
pub use self::editing::{CancelReport, OpenReport};
pub use self::files::{PathReport, RenameReport, WriteReport};
pub use self::import::ImportReport;
pub use self::reports::{
    AllowedCommandsReport, CommandSummary, GitCommands, StatsReport, TotalUsage, ZoneCommands,
    ZoneUsage,
};
pub use self::requests::{
    BridgeRequest, ExecRequest, FileReference, ImportRequest, PathRequest, RenameRequest,
    WriteRequest,
};

/// Tracing target for broker operations.
pub(crate) const BROKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::broker");

const REPOSITORY_DIR: &str = ".git";

/// Identity of the caller, validated for use as directory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Owner of the user root.
    pub user: UserId,
    /// Conversation scoping uploads and edit trees.
    pub conversation: ConversationId,
}

impl Caller {
    /// Validates both identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Identity`] when either identifier is not a
    /// plain directory name.
    pub fn parse(user: &str, conversation: &str) -> Result<Self, BrokerError> {
        Ok(Self {
            user: UserId::parse(user)?,
            conversation: ConversationId::parse(conversation)?,
        })
    }
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    /// Human-readable summary.
    pub message: Option<String>,
    /// Operation-specific payload.
    pub data: T,
}

impl<T: Serialize> Outcome<T> {
    fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: Some(message.into()),
            data,
        }
    }

    const fn silent(data: T) -> Self {
        Self {
            message: None,
            data,
        }
    }

    /// Renders the outcome as a success envelope.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error when the payload cannot be rendered
    /// as JSON.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let data = serde_json::to_value(self.data)?;
        Ok(Envelope::success(self.message, data))
    }
}

/// Result type of every broker operation.
pub type BrokerResult<T> = Result<Outcome<T>, BrokerError>;

/// Entry point for every filesystem operation on behalf of a caller.
#[derive(Debug)]
pub struct Broker {
    storage_root: PathBuf,
    limits: Limits,
    policy: CommandPolicy,
    upload_search_paths: Vec<PathBuf>,
    availability: OnceCell<AllowedCommandsReport>,
}

impl Broker {
    /// Broker over `storage_root` with the standard command policy and no
    /// upload search paths.
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>, limits: Limits) -> Self {
        Self {
            storage_root: storage_root.into(),
            limits,
            policy: CommandPolicy::new(),
            upload_search_paths: Vec::new(),
            availability: OnceCell::new(),
        }
    }

    /// Broker configured from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage_root().as_std_path(), config.limits()).with_upload_search_paths(
            config
                .upload_search_paths()
                .iter()
                .map(|path| path.as_std_path().to_path_buf())
                .collect(),
        )
    }

    /// Replaces the directories searched by `import`.
    #[must_use]
    pub fn with_upload_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.upload_search_paths = paths;
        self
    }

    /// Directory holding every user root.
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Enforcement limits in effect.
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    fn user_root(&self, caller: &Caller) -> UserRoot {
        UserRoot::new(&self.storage_root, &caller.user)
    }

    /// Layout of `zone`, refusing Uploads for operations that need the
    /// editable layout.
    fn editable(
        &self,
        caller: &Caller,
        zone: Zone,
        operation: &'static str,
    ) -> Result<ZoneLayout, BrokerError> {
        if !zone.is_editable() {
            return Err(BrokerError::ZoneForbidden { zone, operation });
        }
        debug!(
            target: BROKER_TARGET,
            user = %caller.user,
            conversation = %caller.conversation,
            zone = %zone,
            operation,
            "operation started"
        );
        Ok(self.user_root(caller).zone(zone))
    }

    fn expiry(&self) -> Expiry {
        Expiry::at_now(self.limits.lock_max_age())
    }

    fn entry(zone: Zone, raw: &str) -> Result<EntryPath, BrokerError> {
        let path = EntryPath::parse(raw)?;
        guard_repository(zone, path.as_str())?;
        Ok(path)
    }
}

/// Commits the data tree of a versioned zone; other zones are untouched.
fn commit_if_versioned(layout: &ZoneLayout, message: &str) -> Result<(), BrokerError> {
    if layout.zone().is_versioned() {
        Repository::at(layout.data_dir()).commit(message)?;
    }
    Ok(())
}

/// Rejects paths and arguments that reach into the repository metadata of a
/// versioned zone.
fn guard_repository(zone: Zone, value: &str) -> Result<(), BrokerError> {
    if zone.is_versioned() && value.split(['/', '=']).any(|segment| segment == REPOSITORY_DIR) {
        return Err(BrokerError::RepositoryPath {
            path: value.to_owned(),
        });
    }
    Ok(())
}

/// The caller's message when it is not blank, else `fallback`.
fn message_or(message: Option<&str>, fallback: impl FnOnce() -> String) -> String {
    message
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map_or_else(fallback, str::to_owned)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Zone::Documents, ".git/config", true)]
    #[case(Zone::Documents, "notes/.git", true)]
    #[case(Zone::Documents, "--git-dir=.git", true)]
    #[case(Zone::Documents, "notes/.gitignore", false)]
    #[case(Zone::Storage, ".git/config", false)]
    fn repository_metadata_is_guarded(#[case] zone: Zone, #[case] value: &str, #[case] refused: bool) {
        assert_eq!(guard_repository(zone, value).is_err(), refused);
    }

    #[test]
    fn blank_messages_fall_back() {
        assert_eq!(message_or(Some("  "), || "default".to_owned()), "default");
        assert_eq!(message_or(Some("mine"), || "default".to_owned()), "mine");
    }

    #[test]
    fn identities_are_validated() {
        assert!(Caller::parse("alice", "chat-1").is_ok());
        assert!(matches!(
            Caller::parse("../alice", "chat-1"),
            Err(BrokerError::Identity(_))
        ));
    }
}
