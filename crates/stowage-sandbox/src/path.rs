//! Chroot-style path resolution.
//!
//! Every user-supplied path is interpreted relative to exactly one root.
//! Absolute-looking input is reinterpreted as relative by stripping leading
//! slashes. Parent segments are resolved logically first, so an input can
//! never borrow `..` past the root, and the joined path is then walked
//! component by component with symlinks dereferenced before the containment
//! check runs.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::SandboxError;

/// Cleans a relative path without touching the filesystem.
///
/// Leading slashes, empty segments and `.` are dropped, and `..` pops the
/// previous segment. A `..` with nothing left to pop is a
/// [`SandboxError::PathEscape`]. The empty string denotes the root itself.
///
/// ```
/// use stowage_sandbox::normalise_relative;
///
/// assert_eq!(normalise_relative("/notes/./a/../b.txt").ok().as_deref(), Some("notes/b.txt"));
/// assert!(normalise_relative("notes/../../etc").is_err());
/// ```
pub fn normalise_relative(input: &str) -> Result<String, SandboxError> {
    clean_segments(input)
        .map(|segments| segments.join("/"))
        .ok_or_else(|| SandboxError::path_escape(input, None))
}

/// Resolves `relative` against `root`, failing with
/// [`SandboxError::PathEscape`] when the result is not `root` or one of its
/// descendants.
///
/// The returned path is rooted at the canonical form of `root`. Components
/// that do not exist yet are appended verbatim so the result can be used as
/// a write target.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    let segments =
        clean_segments(relative).ok_or_else(|| SandboxError::path_escape(relative, Some(root)))?;
    let canonical_root = canonical_root(root)?;
    let cleaned: PathBuf = segments.iter().collect();
    follow(&canonical_root, &cleaned, relative)
}

/// Resolves a raw command argument against `root` with the filesystem's own
/// `..` semantics, used for arguments that embed parent segments.
pub(crate) fn resolve_argument(root: &Path, argument: &str) -> Result<PathBuf, SandboxError> {
    let canonical_root = canonical_root(root)?;
    follow(&canonical_root, Path::new(argument), argument)
}

/// Canonical form of a chroot; roots that do not exist yet are made absolute
/// without consulting the filesystem.
pub(crate) fn canonical_root(root: &Path) -> Result<PathBuf, SandboxError> {
    match fs::canonicalize(root) {
        Ok(path) => Ok(path),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            std::path::absolute(root).map_err(|source| SandboxError::io(root, source))
        }
        Err(error) => Err(SandboxError::io(root, error)),
    }
}

fn clean_segments(input: &str) -> Option<Vec<&str>> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in input.trim_start_matches('/').split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            name => segments.push(name),
        }
    }
    Some(segments)
}

fn follow(root: &Path, relative: &Path, original: &str) -> Result<PathBuf, SandboxError> {
    let escape = || SandboxError::path_escape(original, Some(root));
    let mut current = root.to_path_buf();

    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                current.pop();
            }
            Component::Normal(name) => {
                current.push(name);
                current = dereference(current).ok_or_else(escape)??;
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    if current.starts_with(root) {
        Ok(current)
    } else {
        Err(escape())
    }
}

/// Replaces a symlink with its canonical target.
///
/// Returns `None` when the link cannot be followed (dangling or looping), as
/// its eventual target cannot be checked against the root.
fn dereference(path: PathBuf) -> Option<Result<PathBuf, SandboxError>> {
    match fs::symlink_metadata(&path) {
        Ok(metadata) if metadata.file_type().is_symlink() => fs::canonicalize(&path).ok().map(Ok),
        Ok(_) => Some(Ok(path)),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            Some(Ok(path))
        }
        Err(error) => Some(Err(SandboxError::io(path, error))),
    }
}
