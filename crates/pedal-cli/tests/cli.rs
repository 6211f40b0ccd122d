//! CLI command integration tests.
//! PEDAL_CONFIG is cleared per command so a developer's settings never leak in.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pedal_cmd() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("pedal").unwrap();
    cmd.env_remove("PEDAL_CONFIG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn trajectory_text_output() {
    pedal_cmd()
        .args(["trajectory", "--phase", "0.3", "--tau", "2.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("x:"))
        .stdout(predicate::str::contains("velocity:"))
        .stdout(predicate::str::contains("segment:"));
}

#[test]
fn trajectory_json_at_rest() {
    let stdout = stdout_of(pedal_cmd().args(["trajectory", "--phase", "0", "--tau", "0", "--json"]));
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(value["x"].as_f64().unwrap().abs() < 1e-12);
    assert_eq!(value["segment"], 0);
}

#[test]
fn trajectory_negative_phase_and_high_precision() {
    let stdout = stdout_of(pedal_cmd().args([
        "trajectory",
        "--phase",
        "-0.4",
        "--tau",
        "3",
        "--digits",
        "30",
        "--json",
    ]));
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    // Fixed values serialize as decimal strings.
    let x: f64 = value["x"].as_str().unwrap().parse().unwrap();
    assert!(x > 0.0);
}

#[test]
fn trajectory_rejects_out_of_range_phase() {
    pedal_cmd()
        .args(["trajectory", "--phase", "2.0", "--tau", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside"));
}

#[test]
fn trajectory_rejects_garbage() {
    pedal_cmd()
        .args(["trajectory", "--phase", "abc", "--tau", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid phase"));
}

#[test]
fn optimal_phase_json() {
    let stdout = stdout_of(pedal_cmd().args([
        "optimal-phase",
        "--tau",
        "5",
        "--grid",
        "61",
        "--multi-start",
        "4",
        "--json",
    ]));
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let c_star = value["c_star"].as_f64().unwrap();
    assert!((c_star - 0.474).abs() < 3e-3, "c_star = {c_star}");
}

#[test]
fn sweep_csv_to_stdout() {
    let stdout = stdout_of(pedal_cmd().args([
        "sweep",
        "--t-max",
        "4",
        "--points",
        "3",
        "--grid",
        "41",
        "--multi-start",
        "2",
    ]));
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "tau,c_star,x_star");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("0,"));
    assert!(lines[3].starts_with("4,"));
}

#[test]
fn sweep_to_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("curve.csv");
    pedal_cmd()
        .args([
            "sweep",
            "--t-max",
            "2",
            "--points",
            "3",
            "--spacing",
            "linear",
            "--grid",
            "41",
            "--multi-start",
            "2",
            "--output",
        ])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("wrote 3 rows"));
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.lines().nth(2).unwrap().starts_with("1,"));
}

#[test]
fn sweep_sized_by_time_budget() {
    let stdout = stdout_of(pedal_cmd().args([
        "sweep",
        "--t-max",
        "2",
        "--time-budget",
        "0.001",
        "--min-points",
        "3",
        "--max-points",
        "4",
        "--grid",
        "41",
        "--multi-start",
        "2",
    ]));
    let rows = stdout.lines().count() - 1;
    assert!((3..=4).contains(&rows), "{rows} rows");
}

#[test]
fn sweep_rejects_inverted_budget_range() {
    pedal_cmd()
        .args([
            "sweep",
            "--t-max",
            "1",
            "--time-budget",
            "1",
            "--min-points",
            "10",
            "--max-points",
            "5",
            "--grid",
            "21",
            "--multi-start",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid sweep budget"));
}

#[test]
fn objective_thirty_digits() {
    pedal_cmd()
        .args(["objective", "--phase", "0.5", "--digits", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.753792405691837011720384239675"));
}

#[test]
fn objective_short_plan_fails() {
    pedal_cmd()
        .args([
            "objective",
            "--phase",
            "0.5",
            "--digits",
            "30",
            "--series-terms",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("precision unattainable"));
}

#[test]
fn c_infinity_twenty_digits() {
    pedal_cmd()
        .args(["c-infinity", "--digits", "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.53960434045973786251"));
}

#[test]
fn config_file_sets_digits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pedal.toml");
    std::fs::write(&path, "[long_horizon]\ndigits = 18\n").unwrap();
    let stdout = stdout_of(pedal_cmd().args(["c-infinity", "--config"]).arg(&path));
    assert!(stdout.contains("c_inf:  0.539604340459737862\n"), "{stdout}");
}

#[test]
fn config_from_environment() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pedal.toml");
    std::fs::write(&path, "[long_horizon]\ndigits = 16\n").unwrap();
    let stdout = stdout_of(pedal_cmd().env("PEDAL_CONFIG", &path).args(["c-infinity"]));
    assert!(stdout.contains("c_inf:  0.5396043404597378\n"), "{stdout}");
}

#[test]
fn missing_config_fails() {
    pedal_cmd()
        .args(["c-infinity", "--config", "/nonexistent/pedal.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config"));
}

#[test]
fn verify_passes() {
    pedal_cmd()
        .args(["verify", "--tau", "5", "--digits", "16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}
