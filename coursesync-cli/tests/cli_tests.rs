use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use filetime::{set_file_mtime, FileTime};
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

const T0: i64 = 1_700_000_000;

fn coursesync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("coursesync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("CANVAS_API_URL")
        .env_remove("CANVAS_API_TOKEN")
        .env("RUST_LOG", "error");
    cmd
}

fn write_at(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create dirs");
    }
    fs::write(&path, content).expect("write fixture");
    set_file_mtime(&path, FileTime::from_unix_time(T0, 0)).expect("set mtime");
    path
}

fn course() -> TempDir {
    let root = TempDir::new().expect("content root");
    write_at(root.path(), "01_Intro.qmd", "---\ntitle: Intro\ncanvas:\n  type: page\n---\nHello\n");
    write_at(
        root.path(),
        "02_Week_1/01_Notes.qmd",
        "---\ntitle: Notes\ncanvas:\n  type: page\n---\nNotes\n",
    );
    write_at(root.path(), "02_Week_1/02_Draft.qmd", "---\ntitle: Draft\n---\nnot content\n");
    root
}

fn write_map(root: &Path, map: &str) {
    fs::write(root.join(".canvas_sync_map.json"), map).expect("write map");
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run coursesync");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

#[test]
fn init_records_course_id() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("root");

    coursesync_cmd(home.path())
        .args(["init", root.path().to_str().unwrap(), "--course-id", " 4242 "])
        .assert()
        .success()
        .stdout(contains("Course 4242 recorded"))
        .stdout(contains("CANVAS_API_TOKEN"));

    let saved = fs::read_to_string(root.path().join("course_id.txt")).unwrap();
    assert_eq!(saved.trim(), "4242");
}

#[test]
fn init_rejects_missing_directory() {
    let home = TempDir::new().expect("home");
    coursesync_cmd(home.path())
        .args(["init", "/definitely/not/here", "--course-id", "1"])
        .assert()
        .failure()
        .stderr(contains("cannot resolve path"));
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[test]
fn status_lists_new_content_only() {
    let home = TempDir::new().expect("home");
    let root = course();

    let json = json_stdout(
        coursesync_cmd(home.path()).args(["status", root.path().to_str().unwrap(), "--json"]),
    );
    let files = json["files"].as_array().unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f["path"].as_str().unwrap()).collect();
    assert_eq!(paths, vec!["01_Intro.qmd", "02_Week_1/01_Notes.qmd"]);
    assert!(files.iter().all(|f| f["state"] == "new"));
    assert_eq!(json["summary"]["pending"], 2);
}

#[test]
fn status_reports_current_stub_and_missing() {
    let home = TempDir::new().expect("home");
    let root = course();
    write_map(
        root.path(),
        &format!(
            r#"{{
  "01_Intro.qmd": {{"remote_id": "100", "remote_kind": "page", "mtime": {T0}.0}},
  "02_Week_1/01_Notes.qmd": {{"remote_id": "101", "remote_kind": "page", "placeholder": true}},
  "03_Gone.qmd": {{"remote_id": "102", "remote_kind": "page", "mtime": {T0}.0}}
}}"#
        ),
    );

    let json = json_stdout(
        coursesync_cmd(home.path()).args(["status", root.path().to_str().unwrap(), "--json"]),
    );
    assert_eq!(json["files"][0]["state"], "current");
    assert_eq!(json["files"][0]["remote_id"], "100");
    assert_eq!(json["files"][1]["state"], "stub");
    assert_eq!(json["summary"]["pending"], 1);
    assert_eq!(json["missing"], serde_json::json!(["03_Gone.qmd"]));
}

#[test]
fn status_table_flags_errors() {
    let home = TempDir::new().expect("home");
    let root = course();
    write_at(root.path(), "03_Broken.qmd", "---\ntitle: [unclosed\n---\n");

    coursesync_cmd(home.path())
        .args(["status", root.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("NEW"))
        .stdout(contains("ERROR"))
        .stdout(contains("03_Broken.qmd"))
        .stdout(contains("Run 'coursesync sync'"));
}

// ---------------------------------------------------------------------------
// map
// ---------------------------------------------------------------------------

#[test]
fn map_list_and_forget() {
    let home = TempDir::new().expect("home");
    let root = course();
    write_map(
        root.path(),
        r#"{"01_Intro.qmd": {"remote_id": "100", "remote_kind": "page"}, "02_Week_1": 7}"#,
    );
    let root_arg = root.path().to_str().unwrap();

    let json = json_stdout(coursesync_cmd(home.path()).args(["map", "list", root_arg, "--json"]));
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["path"], "01_Intro.qmd");
    assert_eq!(entries[1]["remote_id"], "7", "legacy bare ids load");

    coursesync_cmd(home.path())
        .args(["map", "forget", "./01_Intro.qmd", "--root", root_arg])
        .assert()
        .success()
        .stdout(contains("Forgot '01_Intro.qmd'"));

    coursesync_cmd(home.path())
        .args(["map", "forget", "01_Intro.qmd", "--root", root_arg])
        .assert()
        .failure()
        .stderr(contains("no record"));
}

#[test]
fn map_prune_missing_drops_gone_paths() {
    let home = TempDir::new().expect("home");
    let root = course();
    write_map(
        root.path(),
        r#"{"01_Intro.qmd": {"remote_id": "100"}, "09_Old/01_Gone.qmd": {"remote_id": "5"}}"#,
    );
    let root_arg = root.path().to_str().unwrap();

    coursesync_cmd(home.path())
        .args(["map", "prune-missing", root_arg])
        .assert()
        .success()
        .stdout(contains("Dropped 1 records"))
        .stdout(contains("09_Old/01_Gone.qmd"));

    coursesync_cmd(home.path())
        .args(["map", "prune-missing", root_arg])
        .assert()
        .success()
        .stdout(contains("Nothing to prune"));
}

// ---------------------------------------------------------------------------
// sync (offline failure paths only)
// ---------------------------------------------------------------------------

#[test]
fn sync_without_credentials_fails_cleanly() {
    let home = TempDir::new().expect("home");
    let root = course();

    coursesync_cmd(home.path())
        .args(["sync", root.path().to_str().unwrap(), "--course-id", "1"])
        .assert()
        .failure()
        .stderr(contains("credentials"));
}

#[test]
fn sync_without_course_id_fails_cleanly() {
    let home = TempDir::new().expect("home");
    let root = course();

    coursesync_cmd(home.path())
        .env("CANVAS_API_URL", "https://canvas.invalid")
        .env("CANVAS_API_TOKEN", "token")
        .args(["sync", root.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("no course id"));
}
