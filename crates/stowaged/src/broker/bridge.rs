//! Copies and moves between zones.

use serde::Serialize;
use tracing::info;

use stowage_sandbox::resolve;

use super::{
    BROKER_TARGET, Broker, BrokerError, BrokerResult, Caller, Outcome, commit_if_versioned,
    message_or,
};
use crate::broker::requests::BridgeRequest;
use crate::version::Repository;
use crate::zones::fsops::{copy_tree, exists, remove_entry};
use crate::zones::{EntryPath, Zone, ZoneError};

/// Result of `bridge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeReport {
    /// Zone the content came from.
    pub src_zone: Zone,
    /// Zone the content went to.
    pub dest_zone: Zone,
    /// Normalised source path.
    pub src_path: String,
    /// Normalised destination path.
    pub dest_path: String,
    /// True when the source was removed after copying.
    pub moved: bool,
    /// True when a commit was recorded.
    pub committed: bool,
}

/// What a supported zone pair does beyond copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Copy,
    CopyAndCommit,
    Move,
}

impl Route {
    const fn between(from: Zone, to: Zone) -> Option<Self> {
        match (from, to) {
            (Zone::Uploads, Zone::Storage) => Some(Self::Copy),
            (Zone::Uploads | Zone::Storage, Zone::Documents) => Some(Self::CopyAndCommit),
            (Zone::Documents, Zone::Storage) => Some(Self::Move),
            _ => None,
        }
    }

    const fn verb(self) -> &'static str {
        match self {
            Self::Copy => "Copied",
            Self::CopyAndCommit => "Copied and committed",
            Self::Move => "Moved",
        }
    }
}

impl Broker {
    /// Copies an entry from one zone's data tree into another's.
    ///
    /// Supported pairs are uploads to storage, uploads to documents,
    /// storage to documents and documents to storage. Copies into
    /// Documents are committed; copies out of Documents remove the source
    /// through the repository and commit, making them moves. An existing
    /// destination entry is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnsupportedBridge`] for other pairs,
    /// [`BrokerError::NoUploads`] or a not-found error when the source is
    /// missing, and path, filesystem or version-control failures.
    pub fn bridge(&self, caller: &Caller, request: &BridgeRequest) -> BrokerResult<BridgeReport> {
        let (from, to) = (request.src_zone, request.dest_zone);
        let route = Route::between(from, to).ok_or(BrokerError::UnsupportedBridge { from, to })?;
        let src = Self::entry(from, &request.src_path)?;
        let dest_raw = request
            .dest_path
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or(&request.src_path);
        let dest = Self::entry(to, dest_raw)?;

        let user_root = self.user_root(caller);
        let source_root = if from == Zone::Uploads {
            let uploads = user_root.uploads(&caller.conversation);
            if !uploads.is_dir() {
                return Err(BrokerError::NoUploads {
                    conversation: caller.conversation.to_string(),
                });
            }
            uploads
        } else {
            user_root.zone(from).data_dir()
        };
        let source = resolve(&source_root, src.as_str())?;
        if !exists(&source) {
            return Err(ZoneError::not_found(&src).into());
        }

        let destination = self.editable(caller, to, "bridge")?;
        destination.ensure()?;
        if to.is_versioned() {
            Repository::at(destination.data_dir()).ensure()?;
        }
        let target = resolve(&destination.data_dir(), dest.as_str())?;
        remove_entry(&target)?;
        copy_tree(&source, &target)?;

        let committed = match route {
            Route::Copy => false,
            Route::CopyAndCommit => {
                let message = message_or(request.message.as_deref(), || import_message(from, &src));
                commit_if_versioned(&destination, &message)?;
                true
            }
            Route::Move => {
                let origin = user_root.zone(from);
                Repository::at(origin.data_dir()).remove(&src)?;
                remove_entry(&source)?;
                let message =
                    message_or(request.message.as_deref(), || format!("Move to Storage: {src}"));
                commit_if_versioned(&origin, &message)?;
                true
            }
        };

        info!(
            target: BROKER_TARGET,
            from = %from,
            to = %to,
            src = %src,
            dest = %dest,
            ?route,
            "bridged entry"
        );
        Ok(Outcome::new(
            format!("{}: {from}/{src} -> {to}/{dest}", route.verb()),
            BridgeReport {
                src_zone: from,
                dest_zone: to,
                src_path: src.to_string(),
                dest_path: dest.to_string(),
                moved: route == Route::Move,
                committed,
            },
        ))
    }
}

fn import_message(from: Zone, src: &EntryPath) -> String {
    if from == Zone::Uploads {
        format!("Import {src}")
    } else {
        format!("Import from {from}: {src}")
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Zone::Uploads, Zone::Storage, Some(Route::Copy))]
    #[case(Zone::Uploads, Zone::Documents, Some(Route::CopyAndCommit))]
    #[case(Zone::Storage, Zone::Documents, Some(Route::CopyAndCommit))]
    #[case(Zone::Documents, Zone::Storage, Some(Route::Move))]
    #[case(Zone::Storage, Zone::Uploads, None)]
    #[case(Zone::Documents, Zone::Documents, None)]
    fn only_four_pairs_are_routed(#[case] from: Zone, #[case] to: Zone, #[case] expected: Option<Route>) {
        assert_eq!(Route::between(from, to), expected);
    }

    #[test]
    fn import_messages_name_their_origin() {
        let src = EntryPath::parse("draft.md").expect("path");
        assert_eq!(import_message(Zone::Uploads, &src), "Import draft.md");
        assert_eq!(
            import_message(Zone::Storage, &src),
            "Import from Storage: draft.md"
        );
    }
}
