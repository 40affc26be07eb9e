//! End-to-end tests of the `listago` binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    _temp: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().to_path_buf();
        Self { _temp: temp, root }
    }

    /// Command bound to `db` inside the workspace.
    fn cmd(&self, db: &str) -> Command {
        let mut cmd = Command::cargo_bin("listago").expect("binary is built");
        cmd.env_remove("RUST_LOG")
            .arg("--db")
            .arg(self.root.join(db))
            .arg("--cache-dir")
            .arg(self.root.join("cache"))
            .arg("--documents-dir")
            .arg(self.root.join("documents"))
            .arg("--prefs")
            .arg(self.root.join("preferences.json"))
            .arg("--json");
        cmd
    }

    fn json(&self, db: &str, args: &[&str]) -> Value {
        let output = self.cmd(db).args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).expect("stdout is JSON")
    }
}

fn lists(workspace: &Workspace, db: &str) -> Vec<Value> {
    workspace.json(db, &["lists", "--items"])["lists"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

#[test]
fn test_add_and_show_lists() {
    let ws = Workspace::new();
    let created = ws.json("main.db", &["add", "Groceries", "Bread", "--locked", "Milk"]);
    assert_eq!(created["success"], true);
    assert_eq!(created["list"]["items"].as_array().map(Vec::len), Some(2));

    let lists = lists(&ws, "main.db");
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0]["name"], "Groceries");
    assert_eq!(lists[0]["items"][1]["item"], "Milk");
    assert_eq!(lists[0]["items"][1]["locked"], true);
}

#[test]
fn test_trash_and_restore() {
    let ws = Workspace::new();
    let created = ws.json("main.db", &["add", "Pantry", "Rice"]);
    let id = created["list"]["id"].as_i64().unwrap().to_string();

    assert_eq!(ws.json("main.db", &["trash", &id])["trashed"], 1);
    assert!(lists(&ws, "main.db").is_empty());
    assert_eq!(ws.json("main.db", &["lists", "--trash"])["count"], 1);

    assert_eq!(ws.json("main.db", &["restore", &id])["restored"], 1);
    assert_eq!(lists(&ws, "main.db").len(), 1);
}

#[test]
fn test_export_then_import_into_new_database() {
    let ws = Workspace::new();
    ws.json("main.db", &["add", "Groceries", "Bread", "--locked", "Milk"]);

    let exported = ws.json("main.db", &["export", "--lists", "--trash"]);
    let archive = exported["archive"].as_str().unwrap().to_string();
    assert!(Path::new(&archive).starts_with(ws.root.join("documents")));

    let analysed = ws.json("copy.db", &["import", &archive, "--analyse"]);
    assert_eq!(analysed["found"], serde_json::json!(["lists"]));
    assert!(lists(&ws, "copy.db").is_empty());

    let imported = ws.json("copy.db", &["import", &archive]);
    assert_eq!(imported["steps"][0]["success"], 1);
    let copied = lists(&ws, "copy.db");
    assert_eq!(copied.len(), 1);
    assert_eq!(copied[0]["items"].as_array().map(Vec::len), Some(2));

    // importing the same archive again matches the stored rows
    ws.json("copy.db", &["import", &archive]);
    assert_eq!(lists(&ws, "copy.db").len(), 1);
}

#[test]
fn test_missing_list_reports_structured_error() {
    let ws = Workspace::new();
    let output = ws
        .cmd("main.db")
        .args(["--quiet", "items", "list", "42"])
        .assert()
        .code(3)
        .get_output()
        .stderr
        .clone();
    let error: Value = serde_json::from_slice(&output).expect("stderr is JSON");
    assert_eq!(error["error"]["code"], "LIST_NOT_FOUND");
}

#[test]
fn test_import_without_content_fails() {
    let ws = Workspace::new();
    let archive = ws.root.join("not-an-export");
    std::fs::create_dir_all(archive.join("lists")).unwrap();
    std::fs::write(archive.join("readme.txt"), "hello").unwrap();
    let archive = archive.to_str().unwrap();

    for args in [vec!["import", archive, "--analyse"], vec!["import", archive]] {
        let output = ws
            .cmd("main.db")
            .arg("--quiet")
            .args(&args)
            .assert()
            .code(6)
            .get_output()
            .stderr
            .clone();
        let error: Value = serde_json::from_slice(&output).expect("stderr is JSON");
        assert_eq!(error["error"]["code"], "INVALID_ARCHIVE");
    }
    assert!(lists(&ws, "main.db").is_empty());
}

#[test]
fn test_version() {
    let ws = Workspace::new();
    let version = ws.json("main.db", &["version"]);
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(version["model_revision"], 1);
    assert_eq!(version["schema"], 2);
    assert_eq!(
        version["archive_content"],
        serde_json::json!(["lists", "trash", "settings"])
    );
}
