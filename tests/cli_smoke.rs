use predicates::str::contains;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

const SMALL_VENUE: &str = r#"
seed = 5
service_means = { temperature_control = 1.0, ticket_purchase = 2.0, season_pass_gate = 1.0, ticket_gate = 1.0, credential_check = 1.0 }

[finite]
repetitions = 2
sample_interval = 50.0

[batch]
size = 16
count = 3

[[slots]]
duration = 100.0
arrival_rate = 1.0
servers = { temperature_control = 2, ticket_purchase = 3, season_pass_gate = 1, ticket_gate = 2, credential_check = 2 }

[[slots]]
duration = 100.0
arrival_rate = 2.0
servers = { temperature_control = 3, ticket_purchase = 5, season_pass_gate = 2, ticket_gate = 3, credential_check = 3 }

[[slots]]
duration = 100.0
arrival_rate = 0.5
servers = { temperature_control = 1, ticket_purchase = 2, season_pass_gate = 1, ticket_gate = 1, credential_check = 1 }
"#;

fn write_temp_config(contents: &str, extension: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be available")
        .as_nanos();
    path.push(format!("venue-smoke-{}.{}", nanos, extension));
    fs::write(&path, contents).expect("config write should succeed");
    path
}

#[test]
fn finite_human_report_lists_every_slot() {
    let path = write_temp_config(SMALL_VENUE, "toml");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("checkpoint-sim");
    cmd.args(["finite", "--config", path.to_str().unwrap()]);
    cmd.assert()
        .success()
        .stdout(contains("Finite horizon:\nseed: 5\nrepetitions: 2\n"))
        .stdout(contains("slot 0: response_time"))
        .stdout(contains("slot 2: response_time"))
        .stdout(contains("Samples:\nt=50 slot=0"));
}

#[test]
fn finite_csv_has_a_row_per_repetition_and_slot() {
    let path = write_temp_config(SMALL_VENUE, "toml");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("checkpoint-sim");
    cmd.args(["finite", "--config", path.to_str().unwrap(), "--format", "csv"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).expect("csv should be utf-8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 7);
    assert!(lines[0].starts_with("repetition,slot,start,end,arrivals"));
    assert!(lines[1].starts_with("0,0,0.000,100.000,"));
    assert!(lines[6].starts_with("1,2,200.000,"));
}

#[test]
fn infinite_json_report_has_requested_batches() {
    let path = write_temp_config(SMALL_VENUE, "toml");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("checkpoint-sim");
    cmd.args([
        "infinite",
        "--config",
        path.to_str().unwrap(),
        "--slot",
        "1",
        "--format",
        "json",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(report["slot"], 1);
    assert_eq!(report["batch_size"], 16);
    assert_eq!(report["batches"].as_array().map(Vec::len), Some(3));
    assert_eq!(report["response_time"]["samples"], 3);
    for batch in report["batches"].as_array().unwrap() {
        assert_eq!(batch["arrivals"], 16);
    }
}

#[test]
fn same_seed_reproduces_the_report() {
    let path = write_temp_config(SMALL_VENUE, "toml");
    let run = || {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("checkpoint-sim");
        cmd.args(["finite", "--config", path.to_str().unwrap(), "--format", "json"]);
        cmd.assert().success().get_output().stdout.clone()
    };
    assert_eq!(run(), run());
}
