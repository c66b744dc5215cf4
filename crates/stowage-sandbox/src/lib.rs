//! Sandbox primitives for the stowage broker.
//!
//! This crate holds the three leaf components every broker operation relies
//! on:
//!
//! - [`resolve`] and [`normalise_relative`] confine user-supplied paths to a
//!   chroot directory, dereferencing symlinks before the containment check.
//! - [`validate`] gates a command line against a [`CommandPolicy`]: a global
//!   blacklist, per-access whitelists, a git subcommand policy, an injection
//!   scan, path checks on every argument and option value, and a scan of awk
//!   and sed program text.
//! - [`run`] executes a validated command without a shell, with its working
//!   directory pinned and a hard timeout.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use stowage_sandbox::{Access, CommandPolicy, run, validate};
//!
//! # fn main() -> Result<(), stowage_sandbox::SandboxError> {
//! let policy = CommandPolicy::new();
//! let root = Path::new("/var/lib/stowage/users/alice/Storage/data");
//! let args = vec![String::from("-la")];
//! validate(&policy, Access::ReadWrite, root, "ls", &args)?;
//! let output = run("ls", &args, root, 30)?;
//! assert!(output.succeeded);
//! # Ok(()) }
//! ```

mod error;
mod exec;
mod path;
mod policy;
mod script;
mod validate;

pub use error::SandboxError;
pub use exec::{ExecOutput, MAX_CAPTURE_BYTES, is_available, run};
pub use path::{normalise_relative, resolve};
pub use policy::{Access, CommandPolicy, GIT_COMMAND, GitSubcommand};
pub use validate::{INJECTION_PATTERNS, contains_injection, validate};

#[cfg(test)]
mod tests;
