//! CLI command integration tests.
//! Each test uses a temp directory via TAPESTRY_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tap_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("tap").unwrap();
    cmd.env("TAPESTRY_DATA_DIR", data_dir.path());
    cmd
}

fn weave(dir: &TempDir, id: &str, region: &str, title: &str, timestamp: u64) {
    tap_cmd(dir)
        .args(["weave", "--intention", "vibrancy", "--time", "midday"])
        .args(["--region", region, "--title", title, "--id", id])
        .args(["--timestamp", &timestamp.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("woven {id}")));
}

fn surge(dir: &TempDir) {
    for i in 0..6u64 {
        weave(dir, &format!("t{i}"), "coast", "Harbour at noon", 1_000 + i * 50);
    }
}

#[test]
fn list_fresh_ledger() {
    let dir = TempDir::new().unwrap();
    tap_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(ledger is empty)"));
}

#[test]
fn weave_then_list() {
    let dir = TempDir::new().unwrap();
    weave(&dir, "first", "medina", "Spice stalls", 1_000);
    weave(&dir, "second", "sahara", "Dune camp", 2_000);

    tap_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("first"))
        .stdout(predicate::str::contains("Dune camp"))
        .stdout(predicate::str::contains("threads: 2"));
}

#[test]
fn weave_rejects_unknown_region() {
    let dir = TempDir::new().unwrap();
    tap_cmd(&dir)
        .args(["weave", "--intention", "awe", "--time", "dawn", "--region", "atlantis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected one of"));
}

#[test]
fn weave_rejects_duplicate_id() {
    let dir = TempDir::new().unwrap();
    weave(&dir, "same", "coast", "One", 1_000);
    tap_cmd(&dir)
        .args(["weave", "--intention", "awe", "--time", "dawn", "--region", "coast"])
        .args(["--id", "same"])
        .assert()
        .failure();
}

#[test]
fn assess_reports_surge() {
    let dir = TempDir::new().unwrap();
    surge(&dir);

    let output = tap_cmd(&dir).arg("assess").output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["defcon_level"].as_u64().unwrap() <= 3);
    assert!(
        report["threats"]
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["kind"] == "TEMPORAL_SURGE")
    );
}

#[test]
fn assess_at_replays_history() {
    let dir = TempDir::new().unwrap();
    surge(&dir);

    let output = tap_cmd(&dir).args(["assess", "--at", "2"]).output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["total"], 2);
    assert_eq!(report["defcon_level"], 5);
    assert_eq!(report["horizon"]["streak"], 2);

    tap_cmd(&dir)
        .args(["assess", "--at", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ledger holds 6 threads"));
}

#[test]
fn evaluate_deploys_and_logs() {
    let dir = TempDir::new().unwrap();
    surge(&dir);

    let output = tap_cmd(&dir).arg("evaluate").output().unwrap();
    assert!(output.status.success());
    let entry: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entry["outcome"], "DEPLOYED");
    assert_eq!(entry["seq"], 1);

    tap_cmd(&dir)
        .arg("log")
        .assert()
        .success()
        .stdout(predicate::str::contains("#1"))
        .stdout(predicate::str::contains("DEPLOYED"));
}

#[test]
fn evaluate_calm_ledger_is_no_action() {
    let dir = TempDir::new().unwrap();
    let output = tap_cmd(&dir).arg("evaluate").output().unwrap();
    assert!(output.status.success());
    let entry: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entry["outcome"], "NO_ACTION");
    assert_eq!(entry["trigger"], "SCAN");
}

#[test]
fn inactive_status_suppresses_across_runs() {
    let dir = TempDir::new().unwrap();
    tap_cmd(&dir)
        .args(["status", "inactive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valkyrie: INACTIVE"));
    tap_cmd(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("valkyrie: INACTIVE"));

    surge(&dir);
    let output = tap_cmd(&dir).arg("evaluate").output().unwrap();
    let entry: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entry["outcome"], "SUPPRESSED");
}

#[test]
fn override_bypasses_policy() {
    let dir = TempDir::new().unwrap();
    let output = tap_cmd(&dir)
        .args(["override", "lockdown", "--target", "kasbah"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let entry: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entry["trigger"], "MANUAL");
    assert_eq!(entry["action"], "LOCKDOWN");
    assert_eq!(entry["target"], "kasbah");

    tap_cmd(&dir)
        .args(["log", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MANUAL"));
}

#[test]
fn override_rejects_unknown_action() {
    let dir = TempDir::new().unwrap();
    tap_cmd(&dir)
        .args(["override", "launch"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown action"));
}

#[test]
fn query_ranks_duplicate() {
    let dir = TempDir::new().unwrap();
    weave(&dir, "a", "kasbah", "Old cedar gate", 1_000);
    weave(&dir, "b", "coast", "Fish market", 2_000);
    weave(&dir, "c", "kasbah", "Old cedar gate", 3_000);

    let output = tap_cmd(&dir)
        .args(["query", "a", "--limit", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().unwrap();
    assert!(first.starts_with("100"), "got {first}");
    assert!(first.contains(" c "), "got {first}");
}

#[test]
fn query_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    tap_cmd(&dir)
        .args(["query", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no thread with id ghost"));
}

#[test]
fn verify_intact_chain() {
    let dir = TempDir::new().unwrap();
    weave(&dir, "one", "coast", "Waves", 1_000);
    weave(&dir, "two", "coast", "Gulls", 2_000);
    tap_cmd(&dir)
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("verified 2 threads"));
}

#[test]
fn export_clear_import() {
    let dir = TempDir::new().unwrap();
    weave(&dir, "one", "medina", "Lanterns", 1_000);
    weave(&dir, "two", "sahara", "Camels", 2_000);
    let scroll = dir.path().join("scroll.json");

    tap_cmd(&dir)
        .arg("export")
        .arg(&scroll)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported 2 threads"));

    tap_cmd(&dir)
        .args(["clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared 2 threads"));
    tap_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(ledger is empty)"));

    tap_cmd(&dir)
        .arg("import")
        .arg(&scroll)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 2 threads"));
    tap_cmd(&dir)
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("verified 2 threads"));
}

#[test]
fn import_rejects_tampered_scroll() {
    let dir = TempDir::new().unwrap();
    weave(&dir, "one", "medina", "Lanterns", 1_000);
    weave(&dir, "two", "sahara", "Camels", 2_000);
    let scroll = dir.path().join("scroll.json");
    tap_cmd(&dir).arg("export").arg(&scroll).assert().success();

    let tampered = std::fs::read_to_string(&scroll)
        .unwrap()
        .replace("Camels", "Horses");
    std::fs::write(&scroll, tampered).unwrap();

    tap_cmd(&dir)
        .arg("import")
        .arg(&scroll)
        .assert()
        .failure()
        .stderr(predicate::str::contains("scroll rejected"));
    tap_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Camels"));
}

#[test]
fn clear_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    weave(&dir, "keep", "coast", "Still here", 1_000);
    tap_cmd(&dir)
        .arg("clear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    tap_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("threads: 1"));
}

#[test]
fn invalid_policy_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("policy.toml"), "threshold = 9").unwrap();
    tap_cmd(&dir)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("policy.toml"));
}

#[test]
fn out_of_range_detector_threshold_is_fatal() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("policy.toml"),
        "threshold = 3\n\n[sentinel]\ncongestion_ratio = 1.5\n",
    )
    .unwrap();
    tap_cmd(&dir)
        .arg("assess")
        .assert()
        .failure()
        .stderr(predicate::str::contains("congestion_ratio"));
}
