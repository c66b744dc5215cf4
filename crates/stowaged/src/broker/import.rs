//! Import of chat attachments into the conversation's Uploads directory.
//!
//! The host describes attachments as [`FileReference`] values. Direct paths
//! are honoured only inside the configured search paths. Stored uploads are
//! located by trying a fixed list of naming strategies against every search
//! path in order; the first strategy that finds a regular file wins.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use stowage_sandbox::resolve;

use super::{BROKER_TARGET, Broker, BrokerError, BrokerResult, Caller, Outcome};
use crate::broker::requests::{FileReference, ImportRequest};
use crate::zones::fsops::copy_tree;
use crate::zones::{EntryPath, ZoneError};

/// Result of `import`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Names written into the uploads directory.
    pub imported: Vec<String>,
    /// Number of imported files.
    pub count: usize,
    /// Attachments that could not be imported.
    pub errors: Vec<String>,
}

/// Result of one lookup strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Resolved(PathBuf),
    TryNext,
}

/// Identifier, name and owner of a stored upload.
struct Stored<'a> {
    id: &'a str,
    name: Option<&'a str>,
    owner: Option<&'a str>,
}

type Strategy = fn(&Path, &Stored<'_>) -> Lookup;

const STRATEGIES: &[Strategy] = &[by_id_and_name, by_id, by_owner_and_id, by_id_prefix];

impl Broker {
    /// Copies the requested attachments into `Uploads/<conversation>`.
    ///
    /// Partial success is a success: attachments that could not be found
    /// are listed in the report's `errors`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NoAttachments`] when the request lists no
    /// files, [`BrokerError::NothingImported`] when nothing matched or could
    /// be located, and path or filesystem failures of the destination.
    pub fn import(&self, caller: &Caller, request: &ImportRequest) -> BrokerResult<ImportReport> {
        if request.files.is_empty() {
            return Err(BrokerError::NoAttachments);
        }
        let selected: Vec<&FileReference> = request
            .files
            .iter()
            .filter(|file| request.import_all || wanted(request.filename.as_deref(), file))
            .collect();
        if selected.is_empty() {
            return Err(BrokerError::NothingImported {
                errors: vec![format!(
                    "no attachment named '{}'",
                    request.filename.as_deref().unwrap_or_default()
                )],
            });
        }

        let mut destination = self.user_root(caller).uploads(&caller.conversation);
        if let Some(subdir) = request.dest_subdir.as_deref().filter(|raw| !raw.trim().is_empty()) {
            let sub = EntryPath::parse(subdir)?;
            destination = resolve(&destination, sub.as_str())?;
        }
        fs::create_dir_all(&destination).map_err(|error| ZoneError::io(&destination, error))?;

        let mut report = ImportReport::default();
        for file in selected {
            let Some(source) = self.locate(file) else {
                warn!(target: BROKER_TARGET, name = file.display_name(), "attachment not found");
                report
                    .errors
                    .push(format!("{}: not found", file.display_name()));
                continue;
            };
            let name = sanitise_name(file.display_name(), fallback_name(file));
            let target = resolve(&destination, &name)?;
            copy_tree(&source, &target)?;
            debug!(
                target: BROKER_TARGET,
                source = %source.display(),
                name = %name,
                "imported attachment"
            );
            report.imported.push(name);
        }
        report.count = report.imported.len();

        if report.imported.is_empty() {
            return Err(BrokerError::NothingImported {
                errors: report.errors,
            });
        }
        Ok(Outcome::new(
            format!("Imported {} file(s)", report.count),
            report,
        ))
    }

    fn locate(&self, file: &FileReference) -> Option<PathBuf> {
        match file {
            FileReference::Path { path, .. } => self.within_search_paths(Path::new(path)),
            FileReference::Stored { id, name, owner } => {
                let stored = Stored {
                    id,
                    name: name.as_deref(),
                    owner: owner.as_deref(),
                };
                if !is_plain(stored.id) {
                    return None;
                }
                self.upload_search_paths.iter().find_map(|base| {
                    STRATEGIES
                        .iter()
                        .find_map(|strategy| match strategy(base, &stored) {
                            Lookup::Resolved(found) => Some(found),
                            Lookup::TryNext => None,
                        })
                })
            }
        }
    }

    /// The canonical form of `path` when it is a regular file inside one of
    /// the search paths.
    fn within_search_paths(&self, path: &Path) -> Option<PathBuf> {
        let canonical = fs::canonicalize(path).ok()?;
        if !canonical.is_file() {
            return None;
        }
        self.upload_search_paths
            .iter()
            .filter_map(|base| fs::canonicalize(base).ok())
            .any(|base| canonical.starts_with(base))
            .then_some(canonical)
    }
}

fn wanted(filename: Option<&str>, file: &FileReference) -> bool {
    filename.is_none_or(|wanted_name| {
        file.display_name() == wanted_name
            || sanitise_name(file.display_name(), fallback_name(file)) == wanted_name
    })
}

fn regular_file(path: PathBuf) -> Lookup {
    if path.is_file() {
        Lookup::Resolved(path)
    } else {
        Lookup::TryNext
    }
}

fn by_id_and_name(base: &Path, stored: &Stored<'_>) -> Lookup {
    stored
        .name
        .filter(|name| is_plain(name))
        .map_or(Lookup::TryNext, |name| {
            regular_file(base.join(format!("{}_{name}", stored.id)))
        })
}

fn by_id(base: &Path, stored: &Stored<'_>) -> Lookup {
    regular_file(base.join(stored.id))
}

fn by_owner_and_id(base: &Path, stored: &Stored<'_>) -> Lookup {
    stored
        .owner
        .filter(|owner| is_plain(owner))
        .map_or(Lookup::TryNext, |owner| regular_file(base.join(owner).join(stored.id)))
}

fn by_id_prefix(base: &Path, stored: &Stored<'_>) -> Lookup {
    let prefix = format!("{}_", stored.id);
    let Ok(listing) = fs::read_dir(base) else {
        return Lookup::TryNext;
    };
    listing
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_str().is_some_and(|name| name.starts_with(&prefix)))
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .min()
        .map_or(Lookup::TryNext, Lookup::Resolved)
}

/// True for a single, non-special path component.
fn is_plain(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

/// Final component of `name`, or `fallback` when nothing usable is left.
fn sanitise_name(name: &str, fallback: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if is_plain(last) {
        last.to_owned()
    } else if is_plain(fallback) {
        fallback.to_owned()
    } else {
        "upload".to_owned()
    }
}

fn fallback_name(file: &FileReference) -> &str {
    match file {
        FileReference::Path { path, .. } => path.rsplit('/').next().unwrap_or_default(),
        FileReference::Stored { id, .. } => id,
    }
}
