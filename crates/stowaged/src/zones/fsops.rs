//! Filesystem helpers shared by the zone and broker layers.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use filetime::FileTime;
use tempfile::NamedTempFile;
use tracing::warn;
use walkdir::WalkDir;

use super::{ZONES_TARGET, ZoneError};

/// Returns true when `path` exists, without following a final symlink.
pub(crate) fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Copies a file or directory tree from `source` to `target`.
///
/// Parent directories of `target` are created. Files keep their permission
/// bits and access and modification times. Symbolic links inside a copied
/// tree are skipped so a copy never carries a link out of its zone.
pub(crate) fn copy_tree(source: &Path, target: &Path) -> Result<(), ZoneError> {
    let metadata = fs::metadata(source).map_err(|error| ZoneError::io(source, error))?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|error| ZoneError::io(parent, error))?;
    }
    if !metadata.is_dir() {
        return copy_file(source, target, &metadata);
    }

    for item in WalkDir::new(source).follow_links(false) {
        let entry = item.map_err(|error| walk_error(source, error))?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|error| ZoneError::io(&destination, error))?;
        } else if file_type.is_file() {
            let metadata = fs::metadata(entry.path())
                .map_err(|error| ZoneError::io(entry.path(), error))?;
            copy_file(entry.path(), &destination, &metadata)?;
        } else {
            warn!(
                target: ZONES_TARGET,
                path = %entry.path().display(),
                "skipping non-regular entry while copying"
            );
        }
    }
    Ok(())
}

fn copy_file(source: &Path, target: &Path, metadata: &fs::Metadata) -> Result<(), ZoneError> {
    fs::copy(source, target).map_err(|error| ZoneError::io(target, error))?;
    filetime::set_file_times(
        target,
        FileTime::from_last_access_time(metadata),
        FileTime::from_last_modification_time(metadata),
    )
    .map_err(|error| ZoneError::io(target, error))
}

/// Removes a file, symlink or directory tree. Returns false when nothing was
/// there.
pub(crate) fn remove_entry(path: &Path) -> Result<bool, ZoneError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(ZoneError::io(path, error)),
    };
    let outcome = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    outcome.map_err(|error| ZoneError::io(path, error))?;
    Ok(true)
}

/// Removes now-empty ancestors of `path`, stopping below `stop_at`.
///
/// `stop_at` itself is never removed, and the walk ends at the first
/// directory that is not empty.
pub(crate) fn prune_empty_parents(path: &Path, stop_at: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == stop_at || !dir.starts_with(stop_at) {
            break;
        }
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// Removes `path` and then its empty ancestors below `stop_at`.
pub(crate) fn remove_and_prune(path: &Path, stop_at: &Path) -> Result<bool, ZoneError> {
    let removed = remove_entry(path)?;
    if removed {
        prune_empty_parents(path, stop_at);
    }
    Ok(removed)
}

/// Writes `content` to `target` through a temporary file in the same
/// directory, so a failed write never leaves a truncated target.
///
/// With `append`, existing content is kept in front of `content`. Existing
/// permissions are carried over.
pub(crate) fn write_atomic(target: &Path, content: &[u8], append: bool) -> Result<(), ZoneError> {
    let parent = target
        .parent()
        .ok_or_else(|| ZoneError::io(target, io::Error::from(io::ErrorKind::InvalidInput)))?;
    fs::create_dir_all(parent).map_err(|error| ZoneError::io(parent, error))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|error| ZoneError::io(parent, error))?;
    let existing = fs::metadata(target).ok().filter(fs::Metadata::is_file);

    if let Some(metadata) = &existing {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|error| ZoneError::io(target, error))?;
        if append {
            let mut original =
                fs::File::open(target).map_err(|error| ZoneError::io(target, error))?;
            io::copy(&mut original, &mut temp).map_err(|error| ZoneError::io(target, error))?;
        }
    }

    temp.write_all(content)
        .and_then(|()| temp.flush())
        .map_err(|error| ZoneError::io(target, error))?;
    temp.persist(target)
        .map_err(|error| ZoneError::io(target, error.error))?;
    Ok(())
}

/// Size and file count of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Total bytes of regular files.
    pub bytes: u64,
    /// Number of regular files.
    pub files: u64,
}

/// Measures `root`, skipping top-level entries named in `excluded`. A missing
/// root measures as empty.
pub(crate) fn usage(root: &Path, excluded: &[&str]) -> Usage {
    let mut total = Usage::default();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() != 1
            || !entry
                .file_name()
                .to_str()
                .is_some_and(|name| excluded.contains(&name))
    });
    for entry in walker.filter_map(Result::ok) {
        if entry.file_type().is_file() {
            total.files += 1;
            total.bytes += entry.metadata().map_or(0, |metadata| metadata.len());
        }
    }
    total
}

pub(crate) fn walk_error(root: &Path, error: walkdir::Error) -> ZoneError {
    let path = error.path().unwrap_or(root).to_path_buf();
    let source = error
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
    ZoneError::io(path, source)
}
