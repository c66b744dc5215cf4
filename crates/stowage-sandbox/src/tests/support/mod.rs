//! Shared fixtures for sandbox tests.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::SandboxError;
use crate::exec::{ExecOutput, is_available, run};
use crate::policy::{Access, CommandPolicy};
use crate::validate::validate;

/// A chroot directory with an `outside` sibling for escape attempts.
pub struct Chroot {
    temp_dir: TempDir,
    root: PathBuf,
}

impl Chroot {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to allocate temporary directory");
        let root = temp_dir.path().join("root");
        fs::create_dir_all(root.join("notes")).expect("create chroot");
        fs::create_dir_all(temp_dir.path().join("outside")).expect("create outside dir");
        fs::write(root.join("notes/a.txt"), "inside").expect("write inside fixture");
        fs::write(temp_dir.path().join("outside/secret.txt"), "secret")
            .expect("write outside fixture");
        Self { temp_dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outside(&self) -> PathBuf {
        self.temp_dir.path().join("outside")
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture parent");
        }
        fs::write(&path, content).expect("write fixture");
        path
    }

    #[cfg(unix)]
    pub fn symlink(&self, relative: &str, target: &Path) {
        std::os::unix::fs::symlink(target, self.root.join(relative)).expect("create symlink");
    }
}

/// State for validation and execution scenarios.
pub struct SandboxWorld {
    pub chroot: Chroot,
    pub policy: CommandPolicy,
    pub access: Access,
    pub validation: Option<Result<(), SandboxError>>,
    pub execution: Option<Result<ExecOutput, SandboxError>>,
    pub skipped: bool,
}

impl SandboxWorld {
    pub fn new() -> Self {
        Self {
            chroot: Chroot::new(),
            policy: CommandPolicy::new(),
            access: Access::ReadWrite,
            validation: None,
            execution: None,
            skipped: false,
        }
    }

    pub fn validate(&mut self, command: &str, args: &[String]) {
        self.validation = Some(validate(
            &self.policy,
            self.access,
            self.chroot.root(),
            command,
            args,
        ));
    }

    /// Marks the scenario as skipped when `command` is not installed.
    pub fn require(&mut self, command: &str) {
        if !is_available(command) {
            eprintln!("skipping: `{command}` is not available on this host");
            self.skipped = true;
        }
    }

    pub fn run(&mut self, command: &str, args: &[String], timeout_secs: u64) {
        if self.skipped {
            return;
        }
        self.execution = Some(run(command, args, self.chroot.root(), timeout_secs));
    }

    pub fn validation(&self) -> &Result<(), SandboxError> {
        self.validation.as_ref().expect("validation should have run")
    }

    pub fn execution(&self) -> &Result<ExecOutput, SandboxError> {
        self.execution.as_ref().expect("execution should have run")
    }
}

/// Splits a space-separated argument list from a feature file.
pub fn split_args(raw: &str) -> Vec<String> {
    raw.trim_matches('"')
        .split_whitespace()
        .map(ToOwned::to_owned)
        .collect()
}
