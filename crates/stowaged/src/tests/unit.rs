//! Unit tests for bootstrap and end-to-end broker operations.

use std::fs;
use std::io::Cursor;
use std::sync::Arc;

use rstest::rstest;
use serde_json::json;
use stowage_config::LogFormat;
use stowage_sandbox::{GIT_COMMAND, is_available};
use tempfile::TempDir;

use crate::bootstrap_with;
use crate::broker::{Broker, Caller, FileReference, ImportRequest, PathRequest, WriteRequest};
use crate::envelope::ErrorCode;
use crate::zones::Zone;

use super::support::{
    BrokerWorld, FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader, USER,
};

fn caller(conversation: &str) -> Caller {
    Caller::parse(USER, conversation).expect("caller")
}

#[rstest]
fn bootstrap_reports_start_and_success() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let daemon = bootstrap_with(&loader, reporter.clone()).expect("bootstrap should succeed");

    assert_eq!(
        reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
    assert_eq!(
        daemon.broker().storage_root(),
        loader.storage_root().as_std_path()
    );
    assert_eq!(daemon.telemetry().format(), LogFormat::Json);
}

#[rstest]
fn bootstrap_failure_is_reported_once() {
    let reporter = Arc::new(RecordingHealthReporter::default());

    bootstrap_with(&FailingConfigLoader, reporter.clone()).expect_err("bootstrap should fail");

    let events = reporter.events();
    assert_eq!(events.len(), 2, "events: {events:?}");
    assert!(matches!(events[1], HealthEvent::BootstrapFailed(_)));
}

#[rstest]
fn empty_input_ends_the_session_without_replies() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let daemon = bootstrap_with(&loader, reporter.clone()).expect("bootstrap should succeed");

    let mut output = Vec::new();
    let handled = daemon
        .serve(&mut Cursor::new(Vec::new()), &mut output)
        .expect("serve");

    assert_eq!(handled, 0);
    assert!(output.is_empty());
    assert!(reporter.events().contains(&HealthEvent::SessionFinished(0)));
}

#[rstest]
fn storage_write_then_delete_removes_the_file() {
    let mut world = BrokerWorld::new();
    world.send(
        "c1",
        json!({"operation": "write", "zone": "storage", "path": "notes/a.md", "content": "hi"}),
    );
    assert!(world.last().is_success());
    assert!(world.data_file(Zone::Storage, "notes/a.md").is_file());

    world.send(
        "c1",
        json!({"operation": "delete", "zone": "storage", "path": "notes/a.md"}),
    );
    assert!(world.last().is_success());
    assert!(!world.data_file(Zone::Storage, "notes/a.md").exists());
}

#[rstest]
fn deleting_a_missing_file_is_not_found() {
    let mut world = BrokerWorld::new();
    world.send(
        "c1",
        json!({"operation": "delete", "zone": "storage", "path": "ghost.md"}),
    );
    assert_eq!(world.last().error(), Some(ErrorCode::FileNotFound));
}

#[rstest]
fn appends_extend_existing_files() {
    let world = BrokerWorld::new();
    let broker = world.broker();
    let request = |append| WriteRequest {
        zone: Zone::Storage,
        path: "log.txt".to_owned(),
        content: "ab".to_owned(),
        append,
        message: None,
    };

    let first = broker.write(&caller("c1"), &request(false)).expect("write");
    assert!(first.data.created);
    let second = broker.write(&caller("c1"), &request(true)).expect("append");
    assert!(!second.data.created);

    let content = fs::read_to_string(world.data_file(Zone::Storage, "log.txt")).expect("read");
    assert_eq!(content, "abab");
}

#[rstest]
fn storage_exec_lists_the_data_tree() {
    if !is_available("ls") {
        eprintln!("skipping: ls is not available on this host");
        return;
    }
    let mut world = BrokerWorld::new();
    world.seed(&world.data_file(Zone::Storage, "visible.md"), "x");
    world.send(
        "c1",
        json!({"operation": "exec", "zone": "storage", "cmd": "ls", "args": []}),
    );
    let reply = world.last_json();
    assert_eq!(reply["success"], true, "reply: {reply}");
    assert!(
        reply["data"]["stdout"]
            .as_str()
            .is_some_and(|stdout| stdout.contains("visible.md")),
        "reply: {reply}"
    );
}

#[rstest]
fn edit_exec_runs_inside_the_conversation_copy() {
    if !is_available("ls") {
        eprintln!("skipping: ls is not available on this host");
        return;
    }
    let mut world = BrokerWorld::new();
    world.send(
        "c1",
        json!({"operation": "edit_exec", "zone": "storage", "cmd": "ls", "args": []}),
    );
    assert_eq!(world.last().error(), Some(ErrorCode::ZoneForbidden));

    world.seed(&world.data_file(Zone::Storage, "draft.md"), "x");
    world.send(
        "c1",
        json!({"operation": "edit_open", "zone": "storage", "path": "draft.md"}),
    );
    world.send(
        "c1",
        json!({"operation": "edit_exec", "zone": "storage", "cmd": "ls", "args": []}),
    );
    let reply = world.last_json();
    assert_eq!(reply["success"], true, "reply: {reply}");
    assert!(
        reply["data"]["stdout"]
            .as_str()
            .is_some_and(|stdout| stdout.contains("draft.md")),
        "reply: {reply}"
    );
}

#[rstest]
fn uploads_exec_without_uploads_is_not_found() {
    let mut world = BrokerWorld::new();
    world.send(
        "c1",
        json!({"operation": "exec", "zone": "uploads", "cmd": "ls", "args": []}),
    );
    assert_eq!(world.last().error(), Some(ErrorCode::FileNotFound));
}

#[rstest]
fn bridging_storage_to_uploads_is_refused() {
    let mut world = BrokerWorld::new();
    world.seed(&world.data_file(Zone::Storage, "a.md"), "a");
    world.send(
        "c1",
        json!({"operation": "bridge", "src_zone": "storage", "dest_zone": "uploads", "src_path": "a.md"}),
    );
    assert_eq!(world.last().error(), Some(ErrorCode::ZoneForbidden));
}

#[rstest]
fn documents_move_to_storage_removes_and_commits() {
    if !is_available(GIT_COMMAND) {
        eprintln!("skipping: git is not available on this host");
        return;
    }
    let mut world = BrokerWorld::new();
    world.send(
        "c1",
        json!({"operation": "write", "zone": "documents", "path": "plan.md", "content": "v1"}),
    );
    world.send(
        "c1",
        json!({"operation": "bridge", "src_zone": "documents", "dest_zone": "storage", "src_path": "plan.md"}),
    );
    let reply = world.last_json();
    assert_eq!(reply["success"], true, "reply: {reply}");
    assert_eq!(reply["data"]["moved"], true);
    assert!(!world.data_file(Zone::Documents, "plan.md").exists());
    assert_eq!(
        fs::read_to_string(world.data_file(Zone::Storage, "plan.md")).expect("read"),
        "v1"
    );
    assert_eq!(world.commit_count(Zone::Documents), 2);
}

#[rstest]
fn import_copies_attachments_from_search_paths() {
    let uploads = TempDir::new().expect("upload store");
    let source = uploads.path().join("report.pdf");
    fs::write(&source, "pdf").expect("write upload");

    let world = BrokerWorld::new();
    let broker = Broker::new(world.storage_root(), *world.broker().limits())
        .with_upload_search_paths(vec![uploads.path().to_path_buf()]);
    let request = ImportRequest {
        files: vec![
            FileReference::Path {
                path: source.to_string_lossy().into_owned(),
                name: None,
            },
            FileReference::Stored {
                id: "missing".to_owned(),
                name: Some("ghost.txt".to_owned()),
                owner: None,
            },
        ],
        import_all: true,
        ..ImportRequest::default()
    };

    let outcome = broker.import(&caller("c1"), &request).expect("import");

    assert_eq!(outcome.data.imported, vec!["report.pdf".to_owned()]);
    assert_eq!(outcome.data.errors.len(), 1);
    let imported = world
        .storage_root()
        .join(USER)
        .join("Uploads/c1/report.pdf");
    assert_eq!(fs::read_to_string(imported).expect("read import"), "pdf");
}

#[rstest]
fn import_refuses_paths_outside_search_paths() {
    let outside = TempDir::new().expect("outside dir");
    let source = outside.path().join("secret.txt");
    fs::write(&source, "secret").expect("write secret");

    let world = BrokerWorld::new();
    let request = ImportRequest {
        files: vec![FileReference::Path {
            path: source.to_string_lossy().into_owned(),
            name: None,
        }],
        ..ImportRequest::default()
    };

    let error = world
        .broker()
        .import(&caller("c1"), &request)
        .expect_err("nothing importable");
    assert_eq!(error.code(), ErrorCode::FileNotFound);
}

#[rstest]
fn stats_count_files_per_zone() {
    let world = BrokerWorld::new();
    world.seed(&world.data_file(Zone::Storage, "a.md"), "1234");
    world.seed(&world.data_file(Zone::Storage, "b/c.md"), "12");

    let outcome = world.broker().stats(&caller("c1"));

    assert_eq!(outcome.data.storage.files, 2);
    assert_eq!(outcome.data.storage.size_bytes, 6);
    assert_eq!(outcome.data.total.files, 2);
    assert_eq!(outcome.data.documents.files, 0);
}

#[rstest]
fn reopening_keeps_the_edit_copy() {
    let world = BrokerWorld::new();
    world.seed(&world.data_file(Zone::Storage, "a.md"), "base");
    let request = PathRequest {
        zone: Zone::Storage,
        path: "a.md".to_owned(),
        message: None,
    };
    let broker = world.broker();
    broker.edit_open(&caller("c1"), &request).expect("open");
    let copy = world.edit_file(Zone::Storage, "c1", "a.md");
    fs::write(&copy, "draft").expect("edit copy");

    let reopened = broker.edit_open(&caller("c1"), &request).expect("reopen");

    assert_eq!(reopened.data.lock, "reopened");
    assert_eq!(fs::read_to_string(copy).expect("read copy"), "draft");
}
