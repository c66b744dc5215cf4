//! Version control over the Documents data tree.
//!
//! The Documents zone's `data/` directory is a git working tree created on
//! first use. Every mutation through the broker ends in exactly one commit.
//! Internal git calls bypass the command validator but run through the same
//! shell-free executor, with hooks and filesystem monitors disabled so
//! nothing written into the tree can run code.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use stowage_sandbox::{ExecOutput, GIT_COMMAND, SandboxError, run};

use crate::zones::EntryPath;

const VERSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::version");

/// Author and committer name of broker commits.
pub const BOT_NAME: &str = "Stowage";
/// Author and committer email of broker commits.
pub const BOT_EMAIL: &str = "stowage@localhost";

const GIT_TIMEOUT_SECS: u64 = 60;
const REPOSITORY_MARKER: &str = ".git";

/// Failures of the version bridge.
#[derive(Debug, Clone, Error)]
pub enum VersionError {
    /// Git could not be run at all.
    #[error("version control unavailable: {0}")]
    Unavailable(#[from] SandboxError),

    /// Git ran and reported failure.
    #[error("git {operation} failed with exit code {exit_code}: {stderr}")]
    Failed {
        /// Git subcommand that failed.
        operation: String,
        /// Exit code.
        exit_code: i32,
        /// Trimmed standard error.
        stderr: String,
    },

    /// The working tree directory could not be created.
    #[error("cannot prepare repository at {path}: {message}")]
    Prepare {
        /// Repository root.
        path: PathBuf,
        /// Underlying error text.
        message: String,
    },
}

/// A git working tree rooted at a zone's data directory.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    /// Repository rooted at `root`. Nothing is created until
    /// [`Repository::ensure`] runs.
    #[must_use]
    pub const fn at(root: PathBuf) -> Self {
        Self { root }
    }

    /// True once the repository marker exists.
    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.root.join(REPOSITORY_MARKER).exists()
    }

    /// Initialises the repository and its bot identity when missing.
    /// Returns true when a new repository was created.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] when the directory cannot be created or git
    /// fails; callers must not proceed against a missing repository.
    pub fn ensure(&self) -> Result<bool, VersionError> {
        if self.is_initialised() {
            return Ok(false);
        }
        fs::create_dir_all(&self.root).map_err(|error| VersionError::Prepare {
            path: self.root.clone(),
            message: error.to_string(),
        })?;
        self.git("init", &["init", "--quiet"])?;
        self.git("config", &["config", "user.name", BOT_NAME])?;
        self.git("config", &["config", "user.email", BOT_EMAIL])?;
        self.git("config", &["config", "commit.gpgsign", "false"])?;
        info!(target: VERSION_TARGET, root = %self.root.display(), "initialised repository");
        Ok(true)
    }

    /// Stages everything and commits with `message`. A commit is recorded
    /// even when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] when initialisation, staging or committing
    /// fails.
    pub fn commit(&self, message: &str) -> Result<(), VersionError> {
        self.ensure()?;
        self.git("add", &["add", "--all"])?;
        self.git(
            "commit",
            &[
                "commit",
                "--quiet",
                "--allow-empty",
                "--allow-empty-message",
                "--message",
                message,
            ],
        )?;
        debug!(target: VERSION_TARGET, root = %self.root.display(), message, "committed");
        Ok(())
    }

    /// Removes `path` from the index and working tree. Untracked paths are
    /// left for the caller to delete.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] when git fails.
    pub fn remove(&self, path: &EntryPath) -> Result<(), VersionError> {
        self.ensure()?;
        self.git(
            "rm",
            &["rm", "-r", "--quiet", "--ignore-unmatch", "--", path.as_str()],
        )?;
        Ok(())
    }

    /// Moves `from` to `to` through the index. Sources git does not track
    /// are skipped; the caller renames those directly.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] when git fails.
    pub fn rename(&self, from: &EntryPath, to: &EntryPath) -> Result<(), VersionError> {
        self.ensure()?;
        self.git("mv", &["mv", "-k", "--", from.as_str(), to.as_str()])?;
        Ok(())
    }

    /// Number of commits on the current branch; zero before the first one.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] when git cannot be run.
    pub fn commit_count(&self) -> Result<u64, VersionError> {
        if !self.is_initialised() {
            return Ok(0);
        }
        let output = self.invoke(&["rev-list", "--count", "HEAD"])?;
        if !output.succeeded {
            return Ok(0);
        }
        Ok(output.stdout.trim().parse().unwrap_or(0))
    }

    fn git(&self, operation: &str, args: &[&str]) -> Result<ExecOutput, VersionError> {
        let output = self.invoke(args)?;
        if output.succeeded {
            return Ok(output);
        }
        let stderr = output.stderr.trim().to_owned();
        warn!(
            target: VERSION_TARGET,
            operation,
            exit_code = output.exit_code,
            stderr = %stderr,
            "git failed"
        );
        Err(VersionError::Failed {
            operation: operation.to_owned(),
            exit_code: output.exit_code,
            stderr,
        })
    }

    fn invoke(&self, args: &[&str]) -> Result<ExecOutput, VersionError> {
        let identity_name = format!("user.name={BOT_NAME}");
        let identity_email = format!("user.email={BOT_EMAIL}");
        let mut argv: Vec<String> = [
            "-c",
            "core.hooksPath=/dev/null",
            "-c",
            "core.fsmonitor=false",
            "-c",
            "commit.gpgsign=false",
            "-c",
            identity_name.as_str(),
            "-c",
            identity_email.as_str(),
        ]
        .iter()
        .map(|arg| (*arg).to_owned())
        .collect();
        argv.extend(args.iter().map(|arg| (*arg).to_owned()));
        run(GIT_COMMAND, &argv, &self.root, GIT_TIMEOUT_SECS).map_err(VersionError::from)
    }
}

/// Commit message for a direct write.
#[must_use]
pub fn write_message(path: &EntryPath, existed: bool, append: bool) -> String {
    match (existed, append) {
        (false, _) => format!("Created {path}"),
        (true, true) => format!("Appended to {path}"),
        (true, false) => format!("Modified {path}"),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    #[case(false, false, "Created notes.md")]
    #[case(false, true, "Created notes.md")]
    #[case(true, true, "Appended to notes.md")]
    #[case(true, false, "Modified notes.md")]
    fn synthesises_write_messages(
        #[case] existed: bool,
        #[case] append: bool,
        #[case] expected: &str,
    ) {
        let path = EntryPath::parse("notes.md").expect("path");
        assert_eq!(write_message(&path, existed, append), expected);
    }

    #[test]
    fn commits_even_without_changes() {
        if !stowage_sandbox::is_available(GIT_COMMAND) {
            eprintln!("git not available; skipping");
            return;
        }
        let temp = TempDir::new().expect("temp dir");
        let repo = Repository::at(temp.path().join("data"));
        assert!(repo.ensure().expect("init"));
        assert!(!repo.ensure().expect("second init"));

        repo.commit("first").expect("first commit");
        repo.commit("second").expect("empty commit");
        assert_eq!(repo.commit_count().expect("count"), 2);
    }
}
