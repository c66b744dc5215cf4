//! Unit tests for path resolution and validation properties.

use rstest::{fixture, rstest};

use crate::error::SandboxError;
use crate::exec::{is_available, run_capped};
use crate::path::resolve;
use crate::policy::{Access, CommandPolicy};
use crate::tests::support::Chroot;
use crate::validate::{INJECTION_PATTERNS, validate};

#[fixture]
fn chroot() -> Chroot {
    Chroot::new()
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

#[rstest]
#[case("notes/a.txt")]
#[case("/notes/a.txt")]
#[case("notes/new/deeper.txt")]
#[case("")]
fn contained_paths_resolve_under_the_root(chroot: Chroot, #[case] relative: &str) {
    let resolved = resolve(chroot.root(), relative).expect("path should resolve");
    let root = chroot.root().canonicalize().expect("canonical root");
    assert!(resolved.starts_with(&root), "{resolved:?} is outside {root:?}");
}

#[rstest]
fn resolving_the_empty_path_yields_the_root(chroot: Chroot) {
    let resolved = resolve(chroot.root(), "").expect("root should resolve");
    assert_eq!(resolved, chroot.root().canonicalize().expect("canonical root"));
}

#[rstest]
#[case("..")]
#[case("../outside/secret.txt")]
#[case("notes/../../outside")]
fn parent_segments_above_the_root_escape(chroot: Chroot, #[case] relative: &str) {
    assert!(matches!(
        resolve(chroot.root(), relative),
        Err(SandboxError::PathEscape { .. })
    ));
}

#[cfg(unix)]
#[rstest]
fn symlinks_leaving_the_root_escape(chroot: Chroot) {
    chroot.symlink("exit", &chroot.outside());
    assert!(matches!(
        resolve(chroot.root(), "exit/secret.txt"),
        Err(SandboxError::PathEscape { .. })
    ));
}

#[cfg(unix)]
#[rstest]
fn symlinks_inside_the_root_are_followed(chroot: Chroot) {
    chroot.symlink("alias", &chroot.root().join("notes"));
    let resolved = resolve(chroot.root(), "alias/a.txt").expect("internal link resolves");
    let expected = chroot
        .root()
        .join("notes/a.txt")
        .canonicalize()
        .expect("canonical target");
    assert_eq!(resolved, expected);
}

#[cfg(unix)]
#[rstest]
fn dangling_symlinks_escape(chroot: Chroot) {
    chroot.symlink("dangling", &chroot.outside().join("missing"));
    assert!(matches!(
        resolve(chroot.root(), "dangling"),
        Err(SandboxError::PathEscape { .. })
    ));
}

#[rstest]
fn every_blacklisted_command_is_forbidden_in_both_zones(chroot: Chroot) {
    let policy = CommandPolicy::new();
    for command in policy.blacklist() {
        for access in [Access::ReadOnly, Access::ReadWrite] {
            let outcome = validate(&policy, access, chroot.root(), command, &args(&["x"]));
            assert!(
                matches!(outcome, Err(SandboxError::CommandForbidden { .. })),
                "{command} in {access:?} gave {outcome:?}"
            );
        }
    }
}

#[rstest]
fn every_injection_pattern_is_refused(chroot: Chroot) {
    let policy = CommandPolicy::new();
    for pattern in INJECTION_PATTERNS {
        let argument = format!("notes{pattern}id");
        let outcome = validate(
            &policy,
            Access::ReadWrite,
            chroot.root(),
            "cat",
            &[argument.clone()],
        );
        assert!(
            matches!(outcome, Err(SandboxError::ArgumentForbidden { .. })),
            "{argument:?} gave {outcome:?}"
        );
    }
}

#[rstest]
#[case("grep", &["-rn", "needle", "notes"])]
#[case("wc", &["-l", "notes/a.txt"])]
#[case("echo", &["$HOME", "costs", "5$"])]
#[case("find", &[".", "-name", "*.txt"])]
#[case("sort", &["-u", "notes/a.txt"])]
fn clean_arguments_pass_in_read_only_zones(
    chroot: Chroot,
    #[case] command: &str,
    #[case] values: &[&str],
) {
    let policy = CommandPolicy::new();
    let outcome = validate(&policy, Access::ReadOnly, chroot.root(), command, &args(values));
    assert!(outcome.is_ok(), "{command} {values:?} gave {outcome:?}");
}

#[rstest]
#[case("cat", &["--file=/etc/passwd"])]
#[case("ls", &["/"])]
#[case("rm", &["-rf", "/"])]
fn absolute_arguments_are_forbidden(
    chroot: Chroot,
    #[case] command: &str,
    #[case] values: &[&str],
) {
    let policy = CommandPolicy::new();
    for access in [Access::ReadOnly, Access::ReadWrite] {
        assert!(matches!(
            validate(&policy, access, chroot.root(), command, &args(values)),
            Err(SandboxError::ArgumentForbidden { .. })
        ));
    }
}

#[rstest]
#[case("git", &[])]
#[case("find", &[".", "-exec", "id", "+"])]
#[case("tar", &["--to-command=id", "-xf", "a.tar"])]
#[case("sed", &["-ni", "p", "notes/a.txt"])]
#[case("cp", &["--symbolic-link", "notes/a.txt", "b"])]
fn option_rules_forbid_arguments(
    chroot: Chroot,
    #[case] command: &str,
    #[case] values: &[&str],
) {
    let policy = CommandPolicy::new();
    let access = if command == "sed" {
        Access::ReadOnly
    } else {
        Access::ReadWrite
    };
    let outcome = validate(&policy, access, chroot.root(), command, &args(values));
    assert!(
        matches!(outcome, Err(SandboxError::ArgumentForbidden { .. })),
        "{command} {values:?} gave {outcome:?}"
    );
}

#[rstest]
#[case("xargs", &["-n1", "sh"])]
#[case("env", &["FOO=1", "python3"])]
#[case("git", &["remote", "add", "origin", "x"])]
#[case("git", &["bisect", "start"])]
#[case("git", &["-c", "core.pager=id", "log"])]
#[case("./cat", &["notes/a.txt"])]
fn commands_smuggled_past_the_whitelist_are_forbidden(
    chroot: Chroot,
    #[case] command: &str,
    #[case] values: &[&str],
) {
    let policy = CommandPolicy::new();
    let outcome = validate(&policy, Access::ReadWrite, chroot.root(), command, &args(values));
    assert!(
        matches!(outcome, Err(SandboxError::CommandForbidden { .. })),
        "{command} {values:?} gave {outcome:?}"
    );
}

#[rstest]
#[case("sort", &["-o../escaped.txt", "notes/a.txt"])]
#[case("sort", &["-uo../escaped.txt", "notes/a.txt"])]
#[case("tar", &["-C..", "-cf", "notes/x.tar", "outside"])]
#[case("grep", &["-f../outside/secret.txt", "notes/a.txt"])]
fn values_attached_to_short_options_stay_inside(
    chroot: Chroot,
    #[case] command: &str,
    #[case] values: &[&str],
) {
    let policy = CommandPolicy::new();
    for access in [Access::ReadOnly, Access::ReadWrite] {
        let outcome = validate(&policy, access, chroot.root(), command, &args(values));
        assert!(
            matches!(outcome, Err(SandboxError::PathEscape { .. })),
            "{command} {values:?} in {access:?} gave {outcome:?}"
        );
    }
}

#[rstest]
fn absolute_values_attached_to_short_options_are_forbidden(chroot: Chroot) {
    let policy = CommandPolicy::new();
    let outcome = validate(
        &policy,
        Access::ReadWrite,
        chroot.root(),
        "sort",
        &args(&["-o/tmp/escaped.txt", "notes/a.txt"]),
    );
    assert!(
        matches!(outcome, Err(SandboxError::ArgumentForbidden { .. })),
        "gave {outcome:?}"
    );
}

#[rstest]
#[case("awk", &["BEGIN{system(\"cat ../outside/secret.txt\")}"])]
#[case("awk", &["BEGIN{ARGV[1]=\"x\"}", "notes/a.txt"])]
#[case("awk", &["-f", "notes/prog.awk", "notes/a.txt"])]
#[case("sed", &["-n", "w ../sed_out.txt", "notes/a.txt"])]
#[case("sed", &["-n", "r ../outside/secret.txt", "notes/a.txt"])]
#[case("sed", &["s/a/id/e", "notes/a.txt"])]
#[case("sed", &["-e", "p", "-e", "s/a/b/w copy.txt", "notes/a.txt"])]
#[case("sed", &["-nf", "notes/script.sed", "notes/a.txt"])]
fn script_features_reaching_outside_are_forbidden(
    chroot: Chroot,
    #[case] command: &str,
    #[case] values: &[&str],
) {
    let policy = CommandPolicy::new();
    for access in [Access::ReadOnly, Access::ReadWrite] {
        let outcome = validate(&policy, access, chroot.root(), command, &args(values));
        assert!(
            matches!(outcome, Err(SandboxError::ArgumentForbidden { .. })),
            "{command} {values:?} in {access:?} gave {outcome:?}"
        );
    }
}

#[rstest]
#[case("awk", &["-F", ":", "{print $1}", "notes/a.txt"])]
#[case("awk", &["-v", "limit=3", "NR==limit", "notes/a.txt"])]
#[case("sed", &["-n", "1,3p", "notes/a.txt"])]
#[case("sed", &["-e", "s/inside/outside/g", "notes/a.txt"])]
fn ordinary_scripts_pass(chroot: Chroot, #[case] command: &str, #[case] values: &[&str]) {
    let policy = CommandPolicy::new();
    let outcome = validate(&policy, Access::ReadOnly, chroot.root(), command, &args(values));
    assert!(outcome.is_ok(), "{command} {values:?} gave {outcome:?}");
}

#[rstest]
fn output_beyond_the_capture_limit_is_dropped(chroot: Chroot) {
    if !is_available("seq") {
        eprintln!("skipping: `seq` is not available on this host");
        return;
    }
    let output = run_capped("seq", &args(&["1", "20000"]), chroot.root(), 10, 64)
        .expect("seq should run");
    assert!(output.succeeded);
    assert!(output.truncated);
    assert_eq!(output.stdout.len(), 64);
    assert!(output.stdout.starts_with("1\n2\n3\n"));
}
