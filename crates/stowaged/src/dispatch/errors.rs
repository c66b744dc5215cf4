//! Error types for request framing and dispatch failures.

use std::io;

use serde_json::json;
use thiserror::Error;

use crate::envelope::{Envelope, ErrorCode};

/// Errors surfaced while reading requests or writing responses.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as a request.
    #[error("malformed request: {message}")]
    MalformedJsonl {
        /// Parser message.
        message: String,
        /// Underlying parser error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes consumed for the rejected line.
        size: u64,
        /// Configured limit.
        max_size: u64,
    },

    /// IO error while reading requests or writing responses.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialisation failed.
    #[error("failed to serialise response: {0}")]
    SerializeResponse(#[from] serde_json::Error),
}

impl DispatchError {
    /// Creates a malformed request error from a serde error.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed request error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a request too large error.
    #[must_use]
    pub const fn request_too_large(size: u64, max_size: u64) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Renders the failure as an envelope. Framing problems are
    /// `INVALID_REQUEST`; transport failures are `EXEC_ERROR`.
    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        let (code, details, hint) = match self {
            Self::MalformedJsonl { .. } => (
                ErrorCode::InvalidRequest,
                json!({}),
                Some("Send one JSON object per line with user, conversation and operation"),
            ),
            Self::RequestTooLarge { size, max_size } => (
                ErrorCode::InvalidRequest,
                json!({ "size": size, "max_size": max_size }),
                Some("Split the content across several appending writes"),
            ),
            Self::Io(_) | Self::SerializeResponse(_) => (ErrorCode::ExecError, json!({}), None),
        };
        Envelope::failure(code, self.to_string(), details, hint.map(str::to_owned))
    }
}
