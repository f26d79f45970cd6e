use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Runs the binary against an isolated home, database and reports directory.
fn doclassify(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("doclassify").unwrap();
    cmd.env("HOME", home.path())
        .env_remove("DOCLASSIFY_CONFIG")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("RUST_LOG")
        .env_remove("XDG_CONFIG_HOME")
        .arg("--database")
        .arg(home.path().join("db.sqlite"))
        .arg("--reports-dir")
        .arg(home.path().join("reports"));
    cmd
}

fn docs_dir(home: &TempDir) -> std::path::PathBuf {
    let dir = home.path().join("docs");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("meeting-transcript-2024.md"), "A: hello\nB: hi").unwrap();
    std::fs::write(dir.join("deploy.sh"), "#!/bin/sh\necho deploy").unwrap();
    std::fs::write(dir.join("blob.bin"), [0u8, 1, 2]).unwrap();
    dir
}

fn report_json(home: &TempDir) -> serde_json::Value {
    let reports = home.path().join("reports");
    let path = std::fs::read_dir(&reports)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|e| e == "json"))
        .expect("a JSON report");
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    doclassify(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("show"));
}

#[test]
fn scan_registers_supported_files_once() {
    let home = TempDir::new().unwrap();
    let dir = docs_dir(&home);

    doclassify(&home)
        .arg("scan")
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 2 documents: 2 registered, 0 already tracked"));

    doclassify(&home)
        .arg("scan")
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 registered, 2 already tracked"));
}

#[test]
fn pending_dry_run_writes_reports() {
    let home = TempDir::new().unwrap();
    let dir = docs_dir(&home);
    doclassify(&home).arg("scan").arg(&dir).assert().success();

    doclassify(&home)
        .args(["pending", "--dry-run", "--batch-size", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 of 2 succeeded"))
        .stdout(predicate::str::contains("(dry run)"));

    let report = report_json(&home);
    assert_eq!(report["totalFiles"], 2);
    assert_eq!(report["dryRun"], true);
    assert_eq!(report["rounds"].as_array().unwrap().len(), 2);
}

#[test]
fn pending_with_nothing_to_do() {
    let home = TempDir::new().unwrap();
    doclassify(&home)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending documents."));
}

#[test]
fn live_run_without_api_key_fails() {
    let home = TempDir::new().unwrap();
    let dir = docs_dir(&home);

    doclassify(&home)
        .arg("file")
        .arg(dir.join("deploy.sh"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn file_not_found_fails() {
    let home = TempDir::new().unwrap();
    doclassify(&home)
        .args(["file", "/nonexistent/notes.md", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn show_unknown_document_fails() {
    let home = TempDir::new().unwrap();
    doclassify(&home)
        .args(["show", "no-such-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no document with id no-such-id"));
}

#[test]
fn zero_batch_size_is_rejected() {
    let home = TempDir::new().unwrap();
    doclassify(&home)
        .args(["pending", "--batch-size", "0"])
        .assert()
        .failure();
}
