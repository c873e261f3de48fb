//! CLI smoke tests: exit codes and operator-facing failure messages.

use assert_cmd::Command;
use predicates::prelude::*;

fn relkit(work: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("relkit").expect("binary");
    cmd.arg("--work-dir").arg(work);
    cmd.arg("--cache-dir").arg(work.join("cache"));
    cmd
}

#[test]
fn missing_manifest_fails_with_context() {
    let work = tempfile::tempdir().expect("tempdir");
    relkit(work.path())
        .args(["--config", "does-not-exist.toml", "bundle"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.toml"));
}

#[test]
fn clean_succeeds_on_fresh_workspace() {
    let work = tempfile::tempdir().expect("tempdir");
    relkit(work.path()).arg("clean").assert().success();
}

#[test]
fn archive_without_bundle_names_the_missing_stage() {
    let work = tempfile::tempdir().expect("tempdir");
    let manifest = work.path().join("relkit.toml");
    std::fs::write(
        &manifest,
        r#"
[package]
product_name = "App"
version = "1.0.0"

[bundle]
app_dir = "app"
main_binary = "app"
"#,
    )
    .expect("write manifest");

    relkit(work.path())
        .arg("--config")
        .arg(&manifest)
        .args(["--platform", "linux", "archive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("run bundle first"));
}
