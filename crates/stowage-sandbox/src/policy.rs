//! Command policy data: whitelists, the global blacklist and the git
//! sub-policy.
//!
//! A [`CommandPolicy`] is built once at start-up and passed explicitly to the
//! validator. The default tables describe a read-only toolbox for uploaded
//! material and a larger read-write toolbox for the persistent zones.

use std::collections::BTreeSet;

/// Level of access a zone grants to commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Inspection only; in-place edits are forbidden.
    ReadOnly,
    /// Full filesystem mutation within the chroot.
    ReadWrite,
}

impl Access {
    /// Returns true for [`Access::ReadOnly`].
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Classification of a git subcommand under the sub-policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitSubcommand {
    /// Inspects the repository.
    Read,
    /// Changes the working tree or history locally.
    Write,
    /// Touches the network or rewrites history; always refused.
    Forbidden,
    /// Not listed anywhere; refused.
    Unknown,
}

const READ_ONLY_COMMANDS: &[&str] = &[
    // reading
    "cat", "head", "tail", "less", "more", "nl", "wc", "stat", "file", "du", "tac",
    // navigation
    "ls", "tree", "find",
    // search
    "grep", "egrep", "fgrep", "rg", "awk", "sed",
    // text transformation
    "sort", "uniq", "cut", "paste", "tr", "fold", "fmt", "column", "rev", "shuf", "expand",
    "unexpand", "pr", "join",
    // comparison
    "diff", "diff3", "cmp", "comm",
    // archive listing and streaming decompression
    "tar", "unzip", "zipinfo", "7z", "zcat", "bzcat", "xzcat",
    // checksums and encodings
    "md5sum", "sha1sum", "sha256sum", "sha512sum", "b2sum", "cksum", "base32", "base64",
    "basenc", "strings", "od", "hexdump", "xxd",
    // structured data
    "jq", "xmllint", "yq", "iconv", "sqlite3",
    // calculation
    "bc", "dc", "expr", "factor", "numfmt",
    // paths and output
    "basename", "dirname", "realpath", "echo", "printf",
    // media metadata
    "ffprobe", "identify", "exiftool",
];

const READ_WRITE_EXTRA_COMMANDS: &[&str] = &[
    "df", "locate", "which", "whereis",
    "split", "csplit", "sdiff", "patch", "colordiff",
    "zip", "7za", "gzip", "gunzip", "bzip2", "bunzip2", "xz", "unxz", "lz4", "zstd",
    "sum", "uuencode", "uudecode",
    // filesystem mutation
    "touch", "mkdir", "rm", "rmdir", "mv", "cp", "ln", "truncate", "mktemp", "install", "shred",
    "rename", "chmod",
    // conversion
    "pandoc", "dos2unix", "unix2dos", "recode", "ffmpeg", "magick", "convert",
    // misc
    "seq", "date", "cal", "readlink", "pathchk", "pwd", "uname", "nproc", "printenv", "env",
    "timeout", "sleep", "yes", "tee", "xargs", "envsubst", "gettext", "tsort", "true", "false",
    // version control
    "git",
];

const BLACKLISTED_COMMANDS: &[&str] = &[
    // interpreters and shells
    "bash", "sh", "zsh", "fish", "dash", "csh", "tcsh", "ksh", "python", "python3", "perl",
    "ruby", "node", "php", "lua", "exec", "eval", "source",
    // detaching
    "nohup", "disown", "setsid", "screen", "tmux", "at", "batch", "crontab",
    // privileges
    "sudo", "su", "doas", "chown", "chgrp",
    // network
    "wget", "curl", "fetch", "ssh", "scp", "sftp", "rsync", "nc", "netcat", "ncat", "telnet",
    "ftp", "ping", "traceroute",
    // system
    "dd", "mount", "umount", "kill", "killall", "pkill", "reboot", "shutdown", "halt",
    "poweroff", "systemctl", "service", "mkfs", "fdisk", "parted", "iptables", "firewall-cmd",
];

const GIT_READ_SUBCOMMANDS: &[&str] = &[
    "status", "log", "show", "diff", "branch", "tag", "blame", "ls-files", "ls-tree", "shortlog",
    "reflog", "describe", "rev-parse", "rev-list", "cat-file",
];

const GIT_WRITE_SUBCOMMANDS: &[&str] = &[
    "add", "commit", "reset", "restore", "checkout", "rm", "mv", "revert", "cherry-pick", "stash",
    "clean",
];

const GIT_FORBIDDEN_SUBCOMMANDS: &[&str] = &[
    "push", "pull", "fetch", "clone", "remote", "gc", "prune", "filter-branch", "filter-repo",
];

/// Name of the version-control tool subject to the git sub-policy.
pub const GIT_COMMAND: &str = "git";

/// Immutable command policy consulted by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    blacklist: BTreeSet<String>,
    read_only: BTreeSet<String>,
    read_write: BTreeSet<String>,
    git_read: BTreeSet<String>,
    git_write: BTreeSet<String>,
    git_forbidden: BTreeSet<String>,
}

impl CommandPolicy {
    /// Builds the standard policy.
    ///
    /// ```
    /// use stowage_sandbox::{Access, CommandPolicy};
    ///
    /// let policy = CommandPolicy::new();
    /// assert!(policy.is_allowed(Access::ReadOnly, "cat"));
    /// assert!(!policy.is_allowed(Access::ReadOnly, "rm"));
    /// assert!(policy.is_allowed(Access::ReadWrite, "rm"));
    /// assert!(policy.is_blacklisted("bash"));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        let read_only = to_set(READ_ONLY_COMMANDS);
        let mut read_write = read_only.clone();
        read_write.extend(to_set(READ_WRITE_EXTRA_COMMANDS));
        Self {
            blacklist: to_set(BLACKLISTED_COMMANDS),
            read_only,
            read_write,
            git_read: to_set(GIT_READ_SUBCOMMANDS),
            git_write: to_set(GIT_WRITE_SUBCOMMANDS),
            git_forbidden: to_set(GIT_FORBIDDEN_SUBCOMMANDS),
        }
    }

    /// Adds a command to the whitelist for `access`. Read-only additions are
    /// also granted to read-write zones.
    #[must_use]
    pub fn allow_command(mut self, access: Access, command: impl Into<String>) -> Self {
        let name = command.into();
        if access.is_read_only() {
            self.read_only.insert(name.clone());
        }
        self.read_write.insert(name);
        self
    }

    /// Returns true when the command is globally forbidden.
    #[must_use]
    pub fn is_blacklisted(&self, command: &str) -> bool {
        self.blacklist.contains(command)
    }

    /// Returns true when the command is on the whitelist for `access` and not
    /// blacklisted.
    #[must_use]
    pub fn is_allowed(&self, access: Access, command: &str) -> bool {
        !self.is_blacklisted(command) && self.whitelist(access).contains(command)
    }

    /// Whitelist applying to `access`.
    #[must_use]
    pub const fn whitelist(&self, access: Access) -> &BTreeSet<String> {
        match access {
            Access::ReadOnly => &self.read_only,
            Access::ReadWrite => &self.read_write,
        }
    }

    /// Globally forbidden commands.
    #[must_use]
    pub const fn blacklist(&self) -> &BTreeSet<String> {
        &self.blacklist
    }

    /// Git subcommands that only inspect the repository.
    #[must_use]
    pub const fn git_read(&self) -> &BTreeSet<String> {
        &self.git_read
    }

    /// Git subcommands that change the repository locally.
    #[must_use]
    pub const fn git_write(&self) -> &BTreeSet<String> {
        &self.git_write
    }

    /// Git subcommands refused even in read-write zones.
    #[must_use]
    pub const fn git_forbidden(&self) -> &BTreeSet<String> {
        &self.git_forbidden
    }

    /// Classifies a git subcommand. The explicit forbidden list wins over
    /// both allow lists.
    #[must_use]
    pub fn classify_git(&self, subcommand: &str) -> GitSubcommand {
        if self.git_forbidden.contains(subcommand) {
            GitSubcommand::Forbidden
        } else if self.git_read.contains(subcommand) {
            GitSubcommand::Read
        } else if self.git_write.contains(subcommand) {
            GitSubcommand::Write
        } else {
            GitSubcommand::Unknown
        }
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new()
    }
}

fn to_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}
