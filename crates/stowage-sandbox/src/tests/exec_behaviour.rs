//! Behavioural tests for the process executor.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::error::SandboxError;
use crate::tests::support::{SandboxWorld, split_args};

#[fixture]
fn world() -> RefCell<SandboxWorld> {
    RefCell::new(SandboxWorld::new())
}

#[given("the host provides {command}")]
fn given_host_provides(world: &RefCell<SandboxWorld>, command: String) {
    world.borrow_mut().require(command.trim_matches('"'));
}

#[when("the sandbox runs {command} with arguments {args} and a {timeout} second timeout")]
fn when_runs(world: &RefCell<SandboxWorld>, command: String, args: String, timeout: u64) {
    let command = command.trim_matches('"');
    world.borrow_mut().run(command, &split_args(&args), timeout);
}

#[then("the run succeeds with output {expected}")]
fn then_succeeds(world: &RefCell<SandboxWorld>, expected: String) {
    let world = world.borrow();
    if world.skipped {
        return;
    }
    let output = world.execution().as_ref().expect("command should run");
    assert!(output.succeeded, "expected success: {output:?}");
    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout.trim_end(), expected.trim_matches('"'));
}

#[then("the run finishes with a non-zero exit code")]
fn then_non_zero(world: &RefCell<SandboxWorld>) {
    let world = world.borrow();
    if world.skipped {
        return;
    }
    let output = world.execution().as_ref().expect("command should run");
    assert!(!output.succeeded);
    assert_ne!(output.exit_code, 0);
}

#[then("the run fails with a timeout")]
fn then_timeout(world: &RefCell<SandboxWorld>) {
    let world = world.borrow();
    if world.skipped {
        return;
    }
    match world.execution() {
        Err(SandboxError::Timeout { timeout_secs, .. }) => assert_eq!(*timeout_secs, 1),
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[then("the run fails because the command was not found")]
fn then_not_found(world: &RefCell<SandboxWorld>) {
    let world = world.borrow();
    match world.execution() {
        Err(SandboxError::CommandNotFound { command }) => {
            assert_eq!(command, "stowage-no-such-binary");
        }
        other => panic!("expected CommandNotFound, got {other:?}"),
    }
}

#[scenario(path = "tests/features/execution.feature")]
fn execution(#[from(world)] _world: RefCell<SandboxWorld>) {}
