//! Response envelope returned for every request.
//!
//! Successful calls render as `{"success":true,"data":...,"message":...}`
//! with both fields optional. Failures always carry every field:
//! `{"success":false,"error":"FILE_LOCKED","message":...,"details":{...},"hint":...}`.

use serde::Serialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A path or identifier leaves its chroot.
    PathEscape,
    /// Blacklisted or unlisted command, or a disallowed git subcommand.
    CommandForbidden,
    /// Injection pattern, absolute argument or forbidden flag.
    ArgumentForbidden,
    /// The named entry does not exist.
    FileNotFound,
    /// Another conversation holds the edit lock.
    FileLocked,
    /// The operation is not available in the zone, or nothing is open.
    ZoneForbidden,
    /// The command outlived its timeout.
    Timeout,
    /// The command is not installed on the host.
    CommandNotFound,
    /// The content exceeds the single-write limit.
    QuotaExceeded,
    /// Any other execution or filesystem failure.
    ExecError,
    /// The request line could not be understood.
    InvalidRequest,
}

/// Serialised reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// The operation completed.
    Success {
        /// Always true.
        success: bool,
        /// Operation-specific payload.
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// Human-readable summary.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The operation was refused or failed.
    Failure {
        /// Always false.
        success: bool,
        /// Failure category.
        error: ErrorCode,
        /// Human-readable description.
        message: String,
        /// Structured context; an empty object when there is none.
        details: Value,
        /// Suggested next step, or null.
        hint: Option<String>,
    },
}

impl Envelope {
    /// A success reply. A `null` payload is omitted.
    #[must_use]
    pub fn success(message: Option<String>, data: Value) -> Self {
        Self::Success {
            success: true,
            data: (!data.is_null()).then_some(data),
            message,
        }
    }

    /// A failure reply. `details` that are not an object are wrapped in an
    /// empty object.
    #[must_use]
    pub fn failure(
        error: ErrorCode,
        message: impl Into<String>,
        details: Value,
        hint: Option<String>,
    ) -> Self {
        Self::Failure {
            success: false,
            error,
            message: message.into(),
            details: if details.is_object() {
                details
            } else {
                Value::Object(Map::new())
            },
            hint,
        }
    }

    /// True for [`Envelope::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failure category, if any.
    #[must_use]
    pub const fn error(&self) -> Option<ErrorCode> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(*error),
        }
    }
}
