use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Reference timing with an integrating channel 0 seeded at y1 = 0x1145
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[acquisition]
channel_count = 8
lane_count = 4

[[channel]]
index = 0
input = 0x0141

[[coefficients]]
channel = 0
gain = 2048
integrator = 2048

[[state]]
channel = 0
slot = "y1"
value = 0x1145
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run"], 0, "run complete: 1 passes", "stdout")]
#[case(&["run", "--passes", "2"], 0, "pass 2 ch 0 profile 0: sample 321 -> output 5063", "stdout")]
#[case(&["run", "--overlap"], 0, "882 cycles/pass", "stdout")]
#[case(&["run", "--max-cycles", "100"], 3, "cycle limit of 100", "stderr")]
#[case(&["run", "--set-state", "9:0:x1=1"], 1, "channel 9 is out of range", "stderr")]
#[case(&["run", "--set-state", "0:0:q1=1"], 2, "unknown state slot", "stderr")]
#[case(&["timing"], 0, "948 cycles", "stdout")]
#[case(&["self-check"], 0, "self-check ok: 8 channels", "stdout")]
#[case(&["bogus"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("servo").unwrap();

    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn cli_reports_bad_coefficient_header() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let bad_csv = dir.path().join("coeffs.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "channel,gain").unwrap();
    writeln!(f, "0,2048").unwrap();

    let mut cmd = Command::cargo_bin("servo").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--coefficients")
        .arg(&bad_csv)
        .arg("self-check");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn coefficient_csv_overrides_the_toml_table() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    // Proportional only: the seeded y1 no longer contributes.
    let csv = dir.path().join("coeffs.csv");
    fs::write(
        &csv,
        "channel,profile,gain,integrator,zero,offset,set_point_input,set_point_output\n0,0,4096,0,0,0,0,0\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("servo").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--coefficients")
        .arg(&csv)
        .arg("run");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("sample 321 -> output 642"));
}

#[rstest]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[acquisition]\nchannel_count = 8\nlane_count = 3\n").unwrap();

    let mut cmd = Command::cargo_bin("servo").unwrap();
    cmd.arg("--config").arg(&cfg).arg("timing");
    cmd.assert().code(1).stderr(
        predicate::str::contains("Configuration is invalid")
            .and(predicate::str::contains("multiple of acquisition.lane_count")),
    );
}

#[rstest]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("servo").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("run");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Could not read the config file"));
}
