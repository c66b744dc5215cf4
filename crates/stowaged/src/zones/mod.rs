//! Per-user zones and their on-disk layout.
//!
//! A user root holds three zones:
//!
//! ```text
//! <storage_root>/<user>/Uploads/<conversation>/...
//! <storage_root>/<user>/Storage/{data,locks,editzone/<conversation>}/...
//! <storage_root>/<user>/Documents/{data,locks,editzone/<conversation>}/...
//! ```
//!
//! Storage and Documents support the open/save/cancel editing protocol in
//! [`editing`]; [`maintenance`] sweeps expired locks and orphaned edit
//! copies. Everything here is plain filesystem work. Version control is
//! layered on by the broker.

pub mod editing;
pub(crate) mod fsops;
pub mod locks;
pub mod maintenance;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use stowage_sandbox::{Access, SandboxError, normalise_relative};

use crate::identity::{ConversationId, UserId};

/// Tracing target for zone operations.
pub(crate) const ZONES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::zones");

const DATA_DIR: &str = "data";
const LOCKS_DIR: &str = "locks";
const EDITZONE_DIR: &str = "editzone";

/// The three storage zones of a user root.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(try_from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum Zone {
    /// Per-conversation copies of chat uploads; read and delete only.
    Uploads,
    /// Shared persistent scratch space.
    Storage,
    /// Persistent, version-controlled documents.
    Documents,
}

impl Zone {
    /// Every zone, in layout order.
    pub const ALL: [Self; 3] = [Self::Uploads, Self::Storage, Self::Documents];

    /// Zones that support the editing protocol.
    pub const EDITABLE: [Self; 2] = [Self::Storage, Self::Documents];

    /// Command access granted inside the zone.
    #[must_use]
    pub const fn access(self) -> Access {
        match self {
            Self::Uploads => Access::ReadOnly,
            Self::Storage | Self::Documents => Access::ReadWrite,
        }
    }

    /// True for zones with `data/`, `locks/` and `editzone/` trees.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        !matches!(self, Self::Uploads)
    }

    /// True when mutations are committed to a repository.
    #[must_use]
    pub const fn is_versioned(self) -> bool {
        matches!(self, Self::Documents)
    }
}

impl TryFrom<String> for Zone {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Zone> for String {
    fn from(zone: Zone) -> Self {
        zone.to_string().to_lowercase()
    }
}

/// A validated, normalised, non-empty path inside a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryPath(String);

impl EntryPath {
    /// Normalises `raw` and rejects paths that climb out of the zone or name
    /// the zone root itself.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Sandbox`] for escaping paths and
    /// [`ZoneError::EmptyPath`] when nothing is left after normalisation.
    pub fn parse(raw: &str) -> Result<Self, ZoneError> {
        let normalised = normalise_relative(raw)?;
        if normalised.is_empty() {
            return Err(ZoneError::EmptyPath {
                path: raw.to_owned(),
            });
        }
        Ok(Self(normalised))
    }

    /// The normalised path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Proper ancestors, nearest first: `a/b/c` yields `a/b` then `a`.
    pub fn ancestors(&self) -> impl Iterator<Item = Self> + '_ {
        self.0
            .char_indices()
            .rev()
            .filter(|(_, character)| *character == '/')
            .filter_map(|(index, _)| self.0.get(..index).map(|prefix| Self(prefix.to_owned())))
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failures of zone-level filesystem operations.
#[derive(Debug, Clone, Error)]
pub enum ZoneError {
    /// Path resolution or validation failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The path names the zone root itself.
    #[error("path '{path}' does not name an entry inside the zone")]
    EmptyPath {
        /// Path as supplied.
        path: String,
    },

    /// The entry does not exist.
    #[error("'{path}' not found")]
    NotFound {
        /// Path inside the zone.
        path: String,
    },

    /// Another conversation holds a live lock on the path.
    #[error("'{path}' is locked by conversation {owner}")]
    Locked {
        /// Locked path; may be an ancestor or descendant of the request.
        path: String,
        /// Conversation holding the lock.
        owner: String,
        /// Lock timestamp in RFC 3339.
        locked_since: String,
        /// Lock age in seconds.
        age_secs: u64,
    },

    /// Edit-zone operation with nothing opened by the conversation.
    #[error("conversation {conversation} has nothing open for editing")]
    NothingOpen {
        /// Conversation that issued the call.
        conversation: String,
    },

    /// Filesystem failure.
    #[error("filesystem error at {path}: {source}")]
    Io {
        /// Affected path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl ZoneError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn not_found(path: &EntryPath) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }
}

/// A user's directory under the storage root.
#[derive(Debug, Clone)]
pub struct UserRoot {
    root: PathBuf,
}

impl UserRoot {
    /// Locates the root for `user` under `storage_root`. Nothing is created.
    #[must_use]
    pub fn new(storage_root: &Path, user: &UserId) -> Self {
        Self {
            root: storage_root.join(user.as_str()),
        }
    }

    /// Layout of `zone`.
    #[must_use]
    pub fn zone(&self, zone: Zone) -> ZoneLayout {
        ZoneLayout {
            zone,
            base: self.root.join(zone.to_string()),
        }
    }

    /// Uploads chroot for `conversation`.
    #[must_use]
    pub fn uploads(&self, conversation: &ConversationId) -> PathBuf {
        self.zone(Zone::Uploads).base.join(conversation.as_str())
    }
}

/// Directory layout of one zone.
#[derive(Debug, Clone)]
pub struct ZoneLayout {
    zone: Zone,
    base: PathBuf,
}

impl ZoneLayout {
    /// The zone this layout belongs to.
    #[must_use]
    pub const fn zone(&self) -> Zone {
        self.zone
    }

    /// Zone directory (`<user>/<Zone>`).
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Shared data tree; the chroot for direct operations.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.base.join(DATA_DIR)
    }

    /// Lock records, mirroring `data/` with a `.lock` suffix.
    #[must_use]
    pub fn locks_dir(&self) -> PathBuf {
        self.base.join(LOCKS_DIR)
    }

    /// Parent of every conversation's edit tree.
    #[must_use]
    pub fn editzone_dir(&self) -> PathBuf {
        self.base.join(EDITZONE_DIR)
    }

    /// Edit tree of `conversation`, whether or not it exists.
    #[must_use]
    pub fn edit_root(&self, conversation: &ConversationId) -> PathBuf {
        self.editzone_dir().join(conversation.as_str())
    }

    /// Creates the `data/`, `locks/` and `editzone/` directories.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::Io`] when a directory cannot be created.
    pub fn ensure(&self) -> Result<(), ZoneError> {
        for dir in [self.data_dir(), self.locks_dir(), self.editzone_dir()] {
            std::fs::create_dir_all(&dir).map_err(|source| ZoneError::io(&dir, source))?;
        }
        Ok(())
    }
}
