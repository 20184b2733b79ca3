//! Smoke tests -- verify the binary runs and the subcommands work end to end.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("relipredict").unwrap();
    // Keep host configuration out of the tests.
    cmd.env("RELIPREDICT_CONFIG", "/nonexistent/relipredict.toml");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn csv_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const GROWTH_CSV: &str = "id,TBF\n1,5\n2,7\n3,9\n4,11\n5,13\n6,15\n7,17\n8,19\n9,21\n10,23\n11,25\n12,27\n";

#[test]
fn test_cli_help() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Software reliability prediction"));
}

#[test]
fn test_cli_version() {
    bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("relipredict"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["serve", "preprocess", "predict", "report"] {
        bin().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_preprocess_json() {
    let input = csv_file("tbf\n10\nNA\n14\n12\n");
    let output = bin()
        .args(["preprocess", "--missing", "drop", "--json"])
        .arg(input.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["stats"]["original_count"], 4);
    assert_eq!(json["stats"]["processed_count"], 3);
}

#[test]
fn test_preprocess_rejects_unknown_strategy() {
    let input = csv_file("tbf\n10\n12\n");
    bin()
        .args(["preprocess", "--missing", "guess"])
        .arg(input.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported value"));
}

#[test]
fn test_predict_table() {
    let input = csv_file(GROWTH_CSV);
    bin()
        .args(["predict", "--train-ratio", "0.75", "--algorithms", "Bayesian,Statistical"])
        .arg(input.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Laplace factor"))
        .stdout(predicate::str::contains("Bayesian (Gamma-Exponential)"));
}

#[test]
fn test_predict_walk_forward_json() {
    let input = csv_file(GROWTH_CSV);
    let output = bin()
        .args(["predict", "--json", "--algorithms", "BP,Statistical", "--walk-forward", "--interval-alpha", "0.05"])
        .arg(input.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let results = json["fit"]["results"].as_array().unwrap();
    assert_eq!(results[0]["model"], "BP");
    for result in results {
        // prefixes of 8 to 11 records
        assert_eq!(result["cross_validation"]["attempted"], 4);
        assert_eq!(result["interval"]["alpha"], 0.05);
    }
}

#[test]
fn test_predict_refuses_missing_values() {
    let input = csv_file("tbf,note\n10,a\n,b\n12,c\n");
    bin()
        .args(["predict", "--algorithms", "Bayesian"])
        .arg(input.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("record 2 is missing"));
}

#[test]
fn test_missing_column_is_reported() {
    let input = csv_file("time\n10\n12\n");
    bin()
        .arg("preprocess")
        .arg(input.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required column 'tbf'"));
}

#[test]
fn test_report_json_and_export() {
    let input = csv_file(GROWTH_CSV);
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("table.csv");

    let output = bin()
        .args(["report", "--json", "--algorithms", "GO,Bayesian", "--train-ratio", "0.75", "--export"])
        .arg(&export)
        .arg(input.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["train_len"], 9);
    assert_eq!(report["narrative_status"]["state"], "not_requested");
    assert!(report["best_model"]["rmse"].as_f64().unwrap() >= 0.0);

    let table = std::fs::read_to_string(&export).unwrap();
    assert!(table.starts_with("index,split,actual_cumulative_time"));
    assert_eq!(table.lines().count(), 13);
}

#[test]
fn test_explicit_config_must_exist() {
    let input = csv_file(GROWTH_CSV);
    bin()
        .args(["--config", "/nonexistent/explicit.toml", "preprocess"])
        .arg(input.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}
