//! Caller identities.
//!
//! User and conversation identifiers arrive from the host and become
//! directory names under the storage root, so they are validated once at the
//! edge and carried as newtypes afterwards.

use std::fmt;

use thiserror::Error;

/// Which identity failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// The user identifier.
    User,
    /// The conversation identifier.
    Conversation,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Conversation => "conversation",
        })
    }
}

/// An identifier that cannot be used as a single directory name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} identifier '{value}' is not a valid directory name")]
pub struct IdentityError {
    /// Which identifier was rejected.
    pub kind: IdentityKind,
    /// The rejected value.
    pub value: String,
}

fn check(kind: IdentityKind, value: &str) -> Result<String, IdentityError> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if invalid {
        return Err(IdentityError {
            kind,
            value: value.to_owned(),
        });
    }
    Ok(value.to_owned())
}

/// Opaque user identifier naming a user root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Validates `value` as a user identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] for empty values, `.`/`..`, and values
    /// containing path separators or NUL.
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        check(IdentityKind::User, value).map(Self)
    }

    /// The identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque conversation identifier naming uploads and edit-zone scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    /// Validates `value` as a conversation identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] under the same rules as [`UserId::parse`].
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        check(IdentityKind::Conversation, value).map(Self)
    }

    /// The identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
