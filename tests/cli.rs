use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

/// The binary with credentials scrubbed from its environment.
fn era_interim(home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_era-interim"));
    cmd.env_remove("ECMWF_API_URL")
        .env_remove("ECMWF_API_KEY")
        .env_remove("ECMWF_API_EMAIL")
        .env_remove("RUST_LOG")
        .env("HOME", home.path())
        .env("ECMWF_API_RC_FILE", home.path().join("missing-rc"));
    cmd
}

#[test]
fn dry_run_prints_both_requests_without_workdir_or_credentials() {
    let home = tempfile::tempdir().unwrap();
    let workdir = home.path().join("not-created");

    era_interim(&home)
        .arg("--dry-run")
        .arg("--workdir")
        .arg(&workdir)
        .assert()
        .success()
        .stdout(predicate::str::contains("# request 1"))
        .stdout(predicate::str::contains("# request 2"))
        .stdout(predicate::str::contains("(30 day(s))"))
        .stdout(predicate::str::contains(
            "data/interim_2013-09-01-to-2013-09-30_00.grib",
        ))
        .stdout(predicate::str::contains(
            "interim_2mtemp_2015-01-01-to-2017-03-31.grib",
        ));

    assert!(!workdir.exists());
}

#[test]
fn dry_run_reads_request_files() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("t2m.json");
    fs::write(
        &file,
        json!({"dataset": "interim", "date": "2016-02-01/to/2016-02-29", "target": "feb.grib"})
            .to_string(),
    )
    .unwrap();

    era_interim(&home)
        .args(["--dry-run", "--request"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("(29 day(s))"))
        .stdout(predicate::str::contains("feb.grib"))
        .stdout(predicate::str::contains("interim_2mtemp").not());
}

#[test]
fn out_of_range_relative_date_exits_with_an_error() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("bad.json");
    fs::write(&file, json!({"dataset": "interim", "date": "-100000000"}).to_string()).unwrap();

    era_interim(&home)
        .args(["--dry-run", "--request"])
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("out of range"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn missing_workdir_fails_before_reading_credentials() {
    let home = tempfile::tempdir().unwrap();

    era_interim(&home)
        .arg("--workdir")
        .arg(home.path().join("absent"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("credentials").not());
}
