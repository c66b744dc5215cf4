//! Domain errors raised by the sandbox primitives.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while resolving paths, validating commands, or running them.
///
/// I/O errors are wrapped in `Arc` so the enum stays cheap to clone into
/// response envelopes.
#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    /// The resolved path leaves its chroot.
    #[error("path '{path}' escapes its chroot")]
    PathEscape {
        /// Path as supplied by the caller.
        path: String,
        /// Chroot the path was resolved against, when one was involved.
        root: Option<PathBuf>,
    },

    /// The command is blacklisted, not whitelisted, or a disallowed git
    /// subcommand.
    #[error("command '{command}' is forbidden: {reason}")]
    CommandForbidden {
        /// Command (or `git <subcommand>`) that was rejected.
        command: String,
        /// Which rule rejected it.
        reason: String,
    },

    /// An argument matched an injection pattern or a flag that the zone does
    /// not permit.
    #[error("argument '{argument}' is forbidden: {reason}")]
    ArgumentForbidden {
        /// Offending argument.
        argument: String,
        /// Which rule rejected it.
        reason: String,
    },

    /// The process outlived its timeout and was killed.
    #[error("command '{command}' timed out after {timeout_secs}s")]
    Timeout {
        /// Command that was running.
        command: String,
        /// Applied timeout in seconds.
        timeout_secs: u64,
    },

    /// The binary does not exist on the host.
    #[error("command '{command}' was not found on this system")]
    CommandNotFound {
        /// Command that was looked up.
        command: String,
    },

    /// The process could not be started or its output could not be read.
    #[error("failed to run '{command}': {source}")]
    Spawn {
        /// Command that was being run.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A filesystem lookup failed while resolving a path.
    #[error("failed to inspect {path}: {source}")]
    Io {
        /// Path being inspected.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl SandboxError {
    pub(crate) fn path_escape(path: &str, root: Option<&std::path::Path>) -> Self {
        Self::PathEscape {
            path: path.to_owned(),
            root: root.map(std::path::Path::to_path_buf),
        }
    }

    pub(crate) fn command_forbidden(command: &str, reason: impl Into<String>) -> Self {
        Self::CommandForbidden {
            command: command.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn argument_forbidden(argument: &str, reason: impl Into<String>) -> Self {
        Self::ArgumentForbidden {
            argument: argument.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
