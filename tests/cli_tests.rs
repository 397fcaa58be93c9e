use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn cmd() -> Command {
    Command::cargo_bin("gerrit-threads").unwrap()
}

/// Run `comment` and return the new draft id from its output.
fn add_comment(db: &Path, args: &[&str]) -> String {
    let output = cmd()
        .arg("--db")
        .arg(db)
        .arg("comment")
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "comment failed: {:?}", output);
    let stdout = String::from_utf8(output.stdout).unwrap();
    stdout.split_whitespace().nth(2).unwrap().to_string()
}

#[test]
fn config_prints_settings_with_defaults() {
    let root = tempfile::tempdir().unwrap();
    fs::write(
        root.path().join(".gitreview"),
        "[gerrit]\nhost=review.example.com\nproject=tools/app\nbranch=main\n",
    )
    .unwrap();

    cmd()
        .current_dir(root.path())
        .arg("config")
        .arg("--root")
        .arg(root.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("review.example.com"))
        .stdout(predicate::str::contains("tools/app"))
        .stdout(predicate::str::contains("29418"))
        .stdout(predicate::str::contains("branch:        main"));
}

#[test]
fn config_without_file_fails() {
    let root = tempfile::tempdir().unwrap();

    cmd()
        .current_dir(root.path())
        .arg("config")
        .arg("--root")
        .arg(root.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No valid .gitreview"));
}

#[test]
fn comment_reply_and_list_threads() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("comments.db");

    let root = add_comment(&db, &["src/lib.rs", "Is this needed?", "--line", "12"]);
    add_comment(&db, &["src/lib.rs", "Later note", "--line", "40", "--resolved"]);

    cmd()
        .arg("--db")
        .arg(&db)
        .arg("done")
        .arg(&root)
        .assert()
        .success();

    cmd()
        .arg("--db")
        .arg(&db)
        .arg("threads")
        .arg("src/lib.rs")
        .assert()
        .success()
        .stdout(predicate::str::contains("L12  Comment  [collapsed]  (draft pending)"))
        .stdout(predicate::str::contains("L40  Comment  [collapsed]"))
        .stdout(predicate::str::contains("Done [draft]"));
}

#[test]
fn publish_clears_drafts() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("comments.db");
    add_comment(&db, &["a.rs", "one"]);
    add_comment(&db, &["b.rs", "two"]);

    cmd()
        .arg("--db")
        .arg(&db)
        .args(["publish", "--file", "a.rs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published 1 drafts"));

    cmd()
        .arg("--db")
        .arg(&db)
        .arg("publish")
        .assert()
        .success()
        .stdout(predicate::str::contains("Published 1 drafts"));
}

#[test]
fn discard_unknown_comment_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("comments.db");

    cmd()
        .arg("--db")
        .arg(&db)
        .args(["discard", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No comment with id nope"));
}

#[test]
fn discard_published_comment_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("comments.db");
    let id = add_comment(&db, &["a.rs", "one"]);
    cmd().arg("--db").arg(&db).arg("publish").assert().success();

    cmd()
        .arg("--db")
        .arg(&db)
        .arg("discard")
        .arg(&id)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already published"));
}

#[test]
fn comment_on_parent_side_is_listed_under_parent() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("comments.db");
    add_comment(&db, &["src/lib.rs", "Old behaviour", "--line", "7", "--side", "parent"]);
    add_comment(&db, &["src/lib.rs", "New behaviour", "--line", "7"]);

    cmd()
        .arg("--db")
        .arg(&db)
        .arg("threads")
        .arg("src/lib.rs")
        .assert()
        .success()
        .stdout(predicate::str::contains("src/lib.rs (PARENT)"))
        .stdout(predicate::str::contains("src/lib.rs (REVISION)"))
        .stdout(predicate::str::contains("Old behaviour [draft]"))
        .stdout(predicate::str::contains("L7  Comment (unresolved)  [expanded]"));
}
