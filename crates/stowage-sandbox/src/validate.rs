//! Command and argument validation.
//!
//! [`validate`] runs a fixed sequence of checks and stops at the first
//! failure:
//!
//! 1. the global blacklist, which overrides every whitelist;
//! 2. the injection scan and the read-only flag rules;
//! 3. path-bearing arguments (absolute arguments are refused outright, and
//!    arguments with parent segments must stay inside the chroot);
//! 4. the zone whitelist;
//! 5. the git sub-policy, command-specific option rules and the awk and sed
//!    script scan.
//!
//! Argument checks precede the whitelist so that an absolute argument is
//! reported as such in every zone.

use std::path::Path;

use tracing::warn;

use crate::error::SandboxError;
use crate::path::resolve_argument;
use crate::policy::{Access, CommandPolicy, GIT_COMMAND, GitSubcommand};
use crate::script::{awk_hazard, sed_hazard};

const VALIDATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::validate");

/// Character and operator sequences refused in every argument.
pub const INJECTION_PATTERNS: &[&str] = &[
    ";", "&", "|", "`", "$(", "${", ">>", "<<", ">", "<", "\n", "\r",
];

/// Commands that run another program named among their arguments.
const WRAPPER_COMMANDS: &[&str] = &["env", "timeout", "xargs"];

/// Options that make an otherwise harmless tool run arbitrary programs or
/// load program text from a file, with the short option letters that take a
/// value (the rest of a short cluster after them is that value).
const EXEC_OPTIONS: &[(&str, &[&str], &str)] = &[
    ("find", &["-exec", "-execdir", "-ok", "-okdir"], ""),
    (
        "tar",
        &[
            "--to-command",
            "--use-compress-program",
            "--info-script",
            "--new-volume-script",
            "--checkpoint-action",
            "-I",
            "-F",
        ],
        "bCfgHKLNTVX",
    ),
    ("rg", &["--pre"], ""),
    ("sort", &["--compress-program"], "kotST"),
    ("zip", &["-TT", "--unzip-command"], ""),
    (
        "awk",
        &[
            "-f", "--file", "-i", "--include", "-l", "--load", "-E", "--exec",
        ],
        "vF",
    ),
    ("sed", &["-f", "--file"], "eil"),
];

/// Commands that can create symbolic links, with the short flag and long
/// option that request one.
const SYMLINK_FLAGS: &[(&str, char, &str)] =
    &[("ln", 's', "symbolic"), ("cp", 's', "symbolic-link")];

/// Validates `command` and `args` for execution with `root` as chroot.
///
/// # Errors
///
/// Returns [`SandboxError::CommandForbidden`] for blacklisted, unlisted or
/// disallowed git commands, [`SandboxError::ArgumentForbidden`] for
/// injection patterns, absolute arguments and forbidden flags, and
/// [`SandboxError::PathEscape`] when an argument climbs out of `root`.
///
/// ```
/// use std::path::Path;
/// use stowage_sandbox::{Access, CommandPolicy, SandboxError, validate};
///
/// let policy = CommandPolicy::new();
/// let root = Path::new("/tmp");
/// let args = vec![String::from("-la")];
/// assert!(validate(&policy, Access::ReadOnly, root, "ls", &args).is_ok());
///
/// let args = vec![String::from("-c"), String::from("ls")];
/// assert!(matches!(
///     validate(&policy, Access::ReadWrite, root, "bash", &args),
///     Err(SandboxError::CommandForbidden { .. })
/// ));
/// ```
pub fn validate(
    policy: &CommandPolicy,
    access: Access,
    root: &Path,
    command: &str,
    args: &[String],
) -> Result<(), SandboxError> {
    check_command(policy, access, root, command, args).inspect_err(|error| {
        warn!(
            target: VALIDATE_TARGET,
            command,
            ?access,
            %error,
            "command rejected"
        );
    })
}

fn check_command(
    policy: &CommandPolicy,
    access: Access,
    root: &Path,
    command: &str,
    args: &[String],
) -> Result<(), SandboxError> {
    if policy.is_blacklisted(command) {
        return Err(SandboxError::command_forbidden(
            command,
            "command is globally forbidden",
        ));
    }
    if command.is_empty() || command.contains('/') || contains_injection(command) {
        return Err(SandboxError::command_forbidden(
            command,
            "commands must be bare program names",
        ));
    }

    for argument in args {
        check_injection(argument)?;
        if access.is_read_only() {
            check_read_only_flag(command, argument)?;
        }
    }
    for argument in args {
        check_path_argument(root, argument)?;
    }

    if !policy.is_allowed(access, command) {
        return Err(SandboxError::command_forbidden(
            command,
            "command is not in this zone's whitelist",
        ));
    }

    if command == GIT_COMMAND {
        check_git(policy, args)?;
    }
    if WRAPPER_COMMANDS.contains(&command) {
        check_wrapped(policy, command, args)?;
    }
    check_exec_options(command, args)?;
    check_script(command, args)?;
    check_symlink_flags(command, args)
}

/// Returns true when `argument` contains any of [`INJECTION_PATTERNS`].
#[must_use]
pub fn contains_injection(argument: &str) -> bool {
    INJECTION_PATTERNS
        .iter()
        .any(|pattern| argument.contains(pattern))
}

fn check_injection(argument: &str) -> Result<(), SandboxError> {
    if contains_injection(argument) {
        return Err(SandboxError::argument_forbidden(
            argument,
            "shell metacharacters ; & | ` $( ${ > >> < << are forbidden",
        ));
    }
    Ok(())
}

fn check_read_only_flag(command: &str, argument: &str) -> Result<(), SandboxError> {
    let in_place = argument == "-i"
        || argument.starts_with("--in-place")
        || (command == "sed" && short_flags(argument).is_some_and(|flags| flags.contains('i')));
    if in_place {
        return Err(SandboxError::argument_forbidden(
            argument,
            "in-place editing is forbidden in a read-only zone",
        ));
    }
    Ok(())
}

fn check_path_argument(root: &Path, argument: &str) -> Result<(), SandboxError> {
    for candidate in path_candidates(argument) {
        if candidate.starts_with('/') {
            return Err(SandboxError::argument_forbidden(
                argument,
                "absolute paths are forbidden; use paths relative to the zone",
            ));
        }
        if candidate.contains("..") {
            resolve_argument(root, candidate).map_err(|error| match error {
                SandboxError::PathEscape { root: chroot, .. } => SandboxError::PathEscape {
                    path: argument.to_owned(),
                    root: chroot,
                },
                other => other,
            })?;
        }
    }
    Ok(())
}

/// The argument itself plus the values an option may carry: the text after
/// `=` in `--option=value` forms, and for short clusters such as `-o../x` or
/// `-nC..` the rest of the cluster after each option letter.
fn path_candidates(argument: &str) -> impl Iterator<Item = &str> {
    let value = argument
        .strip_prefix('-')
        .and_then(|option| option.split_once('='))
        .map(|(_, value)| value);
    let attached = short_flags(argument).map_or_else(Vec::new, attached_values);
    std::iter::once(argument).chain(value).chain(attached)
}

/// Text following each leading option letter of a short cluster.
fn attached_values(flags: &str) -> Vec<&str> {
    let mut values = Vec::new();
    let mut letters = flags.chars();
    while letters.next().is_some_and(|letter| letter.is_ascii_alphanumeric()) {
        let rest = letters.as_str();
        if rest.is_empty() {
            break;
        }
        values.push(rest);
    }
    values
}

fn check_git(policy: &CommandPolicy, args: &[String]) -> Result<(), SandboxError> {
    let Some(subcommand) = args.first() else {
        return Err(SandboxError::argument_forbidden(
            "",
            "git needs a subcommand, for example `git status`",
        ));
    };
    let label = format!("{GIT_COMMAND} {subcommand}");
    match policy.classify_git(subcommand) {
        GitSubcommand::Read | GitSubcommand::Write => Ok(()),
        GitSubcommand::Forbidden => Err(SandboxError::command_forbidden(
            &label,
            "network and history-rewriting git subcommands are forbidden",
        )),
        GitSubcommand::Unknown => Err(SandboxError::command_forbidden(
            &label,
            "git subcommand is not allowed",
        )),
    }
}

fn check_wrapped(
    policy: &CommandPolicy,
    command: &str,
    args: &[String],
) -> Result<(), SandboxError> {
    args.iter()
        .find(|argument| policy.is_blacklisted(argument))
        .map_or(Ok(()), |wrapped| {
            Err(SandboxError::command_forbidden(
                wrapped,
                format!("command is globally forbidden, even when run through {command}"),
            ))
        })
}

fn check_exec_options(command: &str, args: &[String]) -> Result<(), SandboxError> {
    let Some((_, options, value_letters)) =
        EXEC_OPTIONS.iter().find(|(name, _, _)| *name == command)
    else {
        return Ok(());
    };
    let offending = args
        .iter()
        .take_while(|argument| *argument != "--")
        .find(|argument| {
            let name = argument
                .split_once('=')
                .map_or(argument.as_str(), |(name, _)| name);
            options.contains(&name)
                || options.iter().any(|option| {
                    single_letter(option)
                        .is_some_and(|letter| clusters_option(argument, letter, value_letters))
                })
        });
    offending.map_or(Ok(()), |argument| {
        Err(SandboxError::argument_forbidden(
            argument,
            format!("this {command} option runs other programs or loads program files"),
        ))
    })
}

fn check_script(command: &str, args: &[String]) -> Result<(), SandboxError> {
    match command {
        "awk" => awk_hazard(args).map_or(Ok(()), |(argument, fragment)| {
            Err(SandboxError::argument_forbidden(
                argument,
                format!("awk programs may not use {fragment}"),
            ))
        }),
        "sed" => sed_hazard(args).map_or(Ok(()), |(script, letter)| {
            Err(SandboxError::argument_forbidden(
                script,
                format!("sed scripts may not use the `{letter}` command or flag"),
            ))
        }),
        _ => Ok(()),
    }
}

/// The letter of a one-letter short option such as `-I`.
fn single_letter(option: &str) -> Option<char> {
    let mut letters = option.strip_prefix('-')?.chars();
    let letter = letters.next()?;
    (letter != '-' && letters.next().is_none()).then_some(letter)
}

/// Returns true when the short cluster `argument` sets option `letter`
/// before any letter that consumes the rest of the cluster as its value.
fn clusters_option(argument: &str, letter: char, value_letters: &str) -> bool {
    short_flags(argument).is_some_and(|flags| {
        flags
            .chars()
            .take_while(|flag| flag.is_ascii_alphanumeric())
            .scan(false, |valued, flag| {
                if *valued {
                    return None;
                }
                *valued = value_letters.contains(flag);
                Some(flag)
            })
            .any(|flag| flag == letter)
    })
}

fn check_symlink_flags(command: &str, args: &[String]) -> Result<(), SandboxError> {
    let Some((_, short, long)) = SYMLINK_FLAGS.iter().find(|(name, _, _)| *name == command) else {
        return Ok(());
    };
    let offending = args.iter().take_while(|argument| *argument != "--").find(|argument| {
        short_flags(argument).is_some_and(|flags| flags.contains(*short))
            || long_option(argument).is_some_and(|name| long.starts_with(name))
    });
    offending.map_or(Ok(()), |argument| {
        Err(SandboxError::argument_forbidden(
            argument,
            "creating symbolic links is forbidden",
        ))
    })
}

/// The flag letters of a short-option cluster such as `-rs`.
fn short_flags(argument: &str) -> Option<&str> {
    argument
        .strip_prefix('-')
        .filter(|flags| !flags.is_empty() && !flags.starts_with('-'))
}

/// The name of a long option such as `--symbolic` or `--suffix=x`.
fn long_option(argument: &str) -> Option<&str> {
    argument
        .strip_prefix("--")
        .map(|option| option.split_once('=').map_or(option, |(name, _)| name))
        .filter(|name| !name.is_empty())
}
