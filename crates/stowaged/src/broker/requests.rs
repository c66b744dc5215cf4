//! Typed parameters of the broker operations.

use serde::Deserialize;

use crate::zones::Zone;

/// Runs a whitelisted command in a zone or in the caller's edit tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecRequest {
    /// Target zone.
    pub zone: Zone,
    /// Program name.
    pub cmd: String,
    /// Arguments, passed without a shell.
    #[serde(default)]
    pub args: Vec<String>,
    /// Timeout in seconds; the configured default when absent.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Writes text content to a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteRequest {
    /// Target zone.
    pub zone: Zone,
    /// File path inside the zone.
    pub path: String,
    /// UTF-8 content.
    pub content: String,
    /// Appends instead of replacing.
    #[serde(default)]
    pub append: bool,
    /// Commit message for Documents.
    #[serde(default)]
    pub message: Option<String>,
}

/// Names one entry in a zone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathRequest {
    /// Target zone.
    pub zone: Zone,
    /// Entry path inside the zone.
    pub path: String,
    /// Commit message for Documents.
    #[serde(default)]
    pub message: Option<String>,
}

/// Renames an entry within a zone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameRequest {
    /// Target zone.
    pub zone: Zone,
    /// Current path.
    pub old_path: String,
    /// New path.
    pub new_path: String,
    /// Commit message for Documents.
    #[serde(default)]
    pub message: Option<String>,
}

/// Copies or moves content between zones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BridgeRequest {
    /// Zone holding the source.
    pub src_zone: Zone,
    /// Zone receiving the copy.
    pub dest_zone: Zone,
    /// Source path.
    pub src_path: String,
    /// Destination path; the source path when absent.
    #[serde(default)]
    pub dest_path: Option<String>,
    /// Commit message for Documents.
    #[serde(default)]
    pub message: Option<String>,
}

/// A file attached to the conversation by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileReference {
    /// A host path, accepted only inside the configured search paths.
    Path {
        /// Absolute host path.
        path: String,
        /// Display name; the path's final component when absent.
        #[serde(default)]
        name: Option<String>,
    },
    /// A file in the host's upload store, located by identifier.
    Stored {
        /// Upload identifier.
        id: String,
        /// Original file name.
        #[serde(default)]
        name: Option<String>,
        /// Owner directory inside the store.
        #[serde(default)]
        owner: Option<String>,
    },
}

impl FileReference {
    /// Name the file should have once imported, before sanitising.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Path { path, name } => name
                .as_deref()
                .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path)),
            Self::Stored { id, name, .. } => name.as_deref().unwrap_or(id),
        }
    }
}

/// Copies the conversation's attachments into its Uploads directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportRequest {
    /// Attachments supplied by the host.
    #[serde(default)]
    pub files: Vec<FileReference>,
    /// Only the attachment with this name.
    #[serde(default)]
    pub filename: Option<String>,
    /// Every attachment; takes precedence over `filename`.
    #[serde(default)]
    pub import_all: bool,
    /// Subdirectory of the Uploads directory to import into.
    #[serde(default)]
    pub dest_subdir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_requests_default_their_arguments() {
        let request: ExecRequest =
            serde_json::from_str(r#"{"zone":"Storage","cmd":"ls"}"#).expect("request parses");
        assert_eq!(request.zone, Zone::Storage);
        assert!(request.args.is_empty());
        assert_eq!(request.timeout, None);
    }

    #[test]
    fn file_references_are_tagged() {
        let files: Vec<FileReference> = serde_json::from_str(
            r#"[{"type":"path","path":"/srv/up/report.pdf"},{"type":"stored","id":"42","name":"a.txt"}]"#,
        )
        .expect("references parse");
        let names: Vec<&str> = files.iter().map(FileReference::display_name).collect();
        assert_eq!(names, vec!["report.pdf", "a.txt"]);
    }
}
