//! Request deserialisation for the dispatch loop.
//!
//! Each JSONL line carries the caller identity and an `operation` tag; the
//! remaining fields are the operation's parameters:
//!
//! ```json
//! {"user":"alice","conversation":"c1","operation":"write","zone":"storage","path":"a.txt","content":"hi"}
//! ```

use serde::Deserialize;
use strum::IntoStaticStr;

use super::errors::DispatchError;
use crate::broker::{
    BridgeRequest, ExecRequest, ImportRequest, PathRequest, RenameRequest, WriteRequest,
};

/// Parsed request from the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Request {
    /// Opaque user identifier.
    pub user: String,
    /// Opaque conversation identifier.
    pub conversation: String,
    /// Operation and its parameters.
    #[serde(flatten)]
    pub operation: Operation,
}

/// Every operation the broker serves.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, IntoStaticStr)]
#[serde(tag = "operation", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// Runs a command in a zone.
    Exec(ExecRequest),
    /// Writes a file in a zone.
    Write(WriteRequest),
    /// Deletes an entry.
    Delete(PathRequest),
    /// Renames an entry.
    Rename(RenameRequest),
    /// Locks a path and copies it into the edit tree.
    EditOpen(PathRequest),
    /// Runs a command in the edit tree.
    EditExec(ExecRequest),
    /// Writes a file in the edit tree.
    EditWrite(WriteRequest),
    /// Copies the edit copy back and unlocks.
    EditSave(PathRequest),
    /// Discards the edit copy and unlocks.
    EditCancel(PathRequest),
    /// Copies or moves between zones.
    Bridge(BridgeRequest),
    /// Copies chat attachments into Uploads.
    Import(ImportRequest),
    /// Removes every edit copy and the lock of a path.
    ForceUnlock(PathRequest),
    /// Sweeps expired locks and orphaned edit copies.
    Maintenance,
    /// Reports zone usage.
    Stats,
    /// Lists the command catalogue.
    AllowedCommands,
}

impl Operation {
    /// Wire name of the operation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

impl Request {
    /// Parses a JSONL line into a request.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed before
    /// parsing.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedJsonl` if the line is empty or does
    /// not describe a known operation with valid parameters.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }

        serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}
