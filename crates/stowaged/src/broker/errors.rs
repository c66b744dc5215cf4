//! Broker failures and their mapping onto response envelopes.

use serde_json::{Value, json};
use thiserror::Error;

use stowage_sandbox::SandboxError;

use crate::envelope::{Envelope, ErrorCode};
use crate::identity::IdentityError;
use crate::version::VersionError;
use crate::zones::{Zone, ZoneError};

const MIB: u64 = 1024 * 1024;

/// Every way a broker operation can fail.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// A caller identity is not a usable directory name.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Path, lock or edit-zone failure.
    #[error(transparent)]
    Zone(#[from] ZoneError),

    /// Validation or execution failure.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Version-control failure.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// The operation does not apply to the zone.
    #[error("{operation} is not available in the {zone} zone")]
    ZoneForbidden {
        /// Zone named by the request.
        zone: Zone,
        /// Operation that was refused.
        operation: &'static str,
    },

    /// The zone pair is not a supported bridge.
    #[error("copying from {from} to {to} is not supported")]
    UnsupportedBridge {
        /// Source zone.
        from: Zone,
        /// Destination zone.
        to: Zone,
    },

    /// The conversation has no uploads directory.
    #[error("no files uploaded in conversation {conversation}")]
    NoUploads {
        /// Conversation that issued the call.
        conversation: String,
    },

    /// The path names repository metadata in a versioned zone.
    #[error("'{path}' is managed by version control")]
    RepositoryPath {
        /// Offending path or argument.
        path: String,
    },

    /// The content is larger than the single-write limit.
    #[error("content too large: {size_bytes} bytes exceeds the {max_bytes} byte limit")]
    QuotaExceeded {
        /// Target path.
        path: String,
        /// Content size.
        size_bytes: u64,
        /// Configured limit.
        max_bytes: u64,
    },

    /// An import request carried no file references.
    #[error("no files attached to the conversation")]
    NoAttachments,

    /// No attached file matched the import filter or could be located.
    #[error("no matching files found")]
    NothingImported {
        /// Per-file failures.
        errors: Vec<String>,
    },
}

impl BrokerError {
    /// Response code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Identity(_) => ErrorCode::PathEscape,
            Self::Zone(error) => zone_code(error),
            Self::Sandbox(error) | Self::Version(VersionError::Unavailable(error)) => {
                sandbox_code(error)
            }
            Self::Version(_) => ErrorCode::ExecError,
            Self::ZoneForbidden { .. } | Self::UnsupportedBridge { .. } => ErrorCode::ZoneForbidden,
            Self::NoUploads { .. } | Self::NoAttachments | Self::NothingImported { .. } => {
                ErrorCode::FileNotFound
            }
            Self::RepositoryPath { .. } => ErrorCode::ArgumentForbidden,
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
        }
    }

    /// Structured context for the response envelope.
    #[must_use]
    pub fn details(&self) -> Value {
        match self {
            Self::Identity(error) => json!({ "kind": error.kind.to_string(), "value": error.value }),
            Self::Zone(error) => zone_details(error),
            Self::Sandbox(error) | Self::Version(VersionError::Unavailable(error)) => {
                sandbox_details(error)
            }
            Self::Version(VersionError::Failed {
                operation,
                exit_code,
                stderr,
            }) => json!({ "operation": operation, "exit_code": exit_code, "stderr": stderr }),
            Self::Version(VersionError::Prepare { path, message }) => {
                json!({ "path": path.display().to_string(), "error": message })
            }
            Self::ZoneForbidden { zone, operation } => {
                json!({ "zone": zone, "operation": operation })
            }
            Self::UnsupportedBridge { from, to } => json!({ "from": from, "to": to }),
            Self::NoUploads { conversation } => json!({ "conversation": conversation }),
            Self::RepositoryPath { path } => json!({ "path": path }),
            Self::QuotaExceeded {
                path,
                size_bytes,
                max_bytes,
            } => json!({
                "path": path,
                "size_bytes": size_bytes,
                "max_mb": max_bytes.checked_div(MIB).unwrap_or(0),
            }),
            Self::NoAttachments => json!({}),
            Self::NothingImported { errors } => json!({ "errors": errors }),
        }
    }

    /// Suggested next step for the caller.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        let text = match self {
            Self::Identity(_) => "User and conversation identifiers must be plain names",
            Self::Zone(error) => return zone_hint(error),
            Self::Sandbox(error) | Self::Version(VersionError::Unavailable(error)) => {
                return sandbox_hint(error);
            }
            Self::Version(_) => return None,
            Self::ZoneForbidden { .. } => {
                "Use 'storage' or 'documents'; bridge copies uploads into either"
            }
            Self::UnsupportedBridge { .. } => {
                "Supported: uploads->storage, uploads->documents, storage->documents, documents->storage"
            }
            Self::NoUploads { .. } => "Import the conversation's files with the import operation first",
            Self::RepositoryPath { .. } => {
                "The .git directory is maintained by the broker; use the git subcommands instead"
            }
            Self::QuotaExceeded { max_bytes, .. } => {
                return Some(format!(
                    "Max size is {} MB",
                    max_bytes.checked_div(MIB).unwrap_or(0)
                ));
            }
            Self::NoAttachments => "Attach files to the conversation, then import again",
            Self::NothingImported { .. } => "Pass import_all or the exact file name",
        };
        Some(text.to_owned())
    }

    /// Renders the failure as an envelope.
    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        Envelope::failure(self.code(), self.to_string(), self.details(), self.hint())
    }
}

const fn zone_code(error: &ZoneError) -> ErrorCode {
    match error {
        ZoneError::Sandbox(inner) => sandbox_code(inner),
        ZoneError::EmptyPath { .. } => ErrorCode::ArgumentForbidden,
        ZoneError::NotFound { .. } => ErrorCode::FileNotFound,
        ZoneError::Locked { .. } => ErrorCode::FileLocked,
        ZoneError::NothingOpen { .. } => ErrorCode::ZoneForbidden,
        ZoneError::Io { .. } => ErrorCode::ExecError,
    }
}

const fn sandbox_code(error: &SandboxError) -> ErrorCode {
    match error {
        SandboxError::PathEscape { .. } => ErrorCode::PathEscape,
        SandboxError::CommandForbidden { .. } => ErrorCode::CommandForbidden,
        SandboxError::ArgumentForbidden { .. } => ErrorCode::ArgumentForbidden,
        SandboxError::Timeout { .. } => ErrorCode::Timeout,
        SandboxError::CommandNotFound { .. } => ErrorCode::CommandNotFound,
        SandboxError::Spawn { .. } | SandboxError::Io { .. } => ErrorCode::ExecError,
    }
}

fn zone_details(error: &ZoneError) -> Value {
    match error {
        ZoneError::Sandbox(inner) => sandbox_details(inner),
        ZoneError::EmptyPath { path } | ZoneError::NotFound { path } => json!({ "path": path }),
        ZoneError::Locked {
            path,
            owner,
            locked_since,
            age_secs,
        } => json!({
            "locked_by": owner,
            "locked_since": locked_since,
            "path": path,
            "age_seconds": age_secs,
        }),
        ZoneError::NothingOpen { conversation } => json!({ "conversation": conversation }),
        ZoneError::Io { path, source } => {
            json!({ "path": path.display().to_string(), "error": source.to_string() })
        }
    }
}

fn sandbox_details(error: &SandboxError) -> Value {
    match error {
        SandboxError::PathEscape { path, .. } => json!({ "path": path }),
        SandboxError::CommandForbidden { command, reason } => {
            json!({ "command": command, "reason": reason })
        }
        SandboxError::ArgumentForbidden { argument, reason } => {
            json!({ "argument": argument, "reason": reason })
        }
        SandboxError::Timeout {
            command,
            timeout_secs,
        } => json!({ "command": command, "timeout": timeout_secs }),
        SandboxError::CommandNotFound { command } => json!({ "command": command }),
        SandboxError::Spawn { command, source } => {
            json!({ "command": command, "error": source.to_string() })
        }
        SandboxError::Io { path, source } => {
            json!({ "path": path.display().to_string(), "error": source.to_string() })
        }
    }
}

fn zone_hint(error: &ZoneError) -> Option<String> {
    let text = match error {
        ZoneError::Sandbox(inner) => return sandbox_hint(inner),
        ZoneError::EmptyPath { .. } => "Name a file or folder inside the zone",
        ZoneError::NotFound { .. } => return None,
        ZoneError::Locked { .. } => "Wait, or use force_unlock or maintenance",
        ZoneError::NothingOpen { .. } => "Call edit_open first",
        ZoneError::Io { .. } => return None,
    };
    Some(text.to_owned())
}

fn sandbox_hint(error: &SandboxError) -> Option<String> {
    let text = match error {
        SandboxError::PathEscape { .. } => "Paths must stay inside the zone",
        SandboxError::CommandForbidden { .. } => "Use allowed_commands to list permitted commands",
        SandboxError::ArgumentForbidden { .. } => {
            "Pass plain arguments with paths relative to the zone"
        }
        SandboxError::Timeout { .. } => "Retry with a larger timeout, up to the configured maximum",
        SandboxError::CommandNotFound { .. } => {
            "Use allowed_commands to see which commands are installed"
        }
        SandboxError::Spawn { .. } | SandboxError::Io { .. } => return None,
    };
    Some(text.to_owned())
}
