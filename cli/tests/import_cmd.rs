use std::io::Write;

use anyhow::Result;
use assert_cmd::Command;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;

fn write_ambre_csv(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("ambre.csv");
    let mut file = std::fs::File::create(&path).expect("create temp csv");
    file.write_all(
        b"Account_ID,CCY,Event_Num,RawLabel,SignedAmount,Operation_Date\n\
          P,EUR,E1,pivot row,100.00,2024-01-10\n\
          R,EUR,E1,receivable row,-100.00,2024-01-10\n",
    )
    .expect("write temp csv");
    path
}

fn write_dwings_csv(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("dwings.csv");
    let mut file = std::fs::File::create(&path).expect("create temp csv");
    file.write_all(b"InvoiceID,Status,BillingAmount,BillingCurrency\n").expect("write temp csv");
    path
}

#[test]
fn import_text_output_reports_success() -> Result<()> {
    let dir = TempDir::new()?;
    let ambre = write_ambre_csv(&dir);
    let dwings = write_dwings_csv(&dir);

    let mut cmd = Command::cargo_bin("reconcile")?;
    let output = cmd
        .args([
            "import",
            "--country-id",
            "FR",
            "--pivot-account",
            "P",
            "--receivable-account",
            "R",
            "--dwings-file",
        ])
        .arg(&dwings)
        .arg(&ambre)
        .output()?;

    assert!(output.status.success(), "exit status: {:?}", output.status.code());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("import succeeded"), "stdout: {stdout}");
    assert!(stdout.contains("2 new"), "stdout: {stdout}");
    Ok(())
}

#[test]
fn import_json_output_is_structured() -> Result<()> {
    let dir = TempDir::new()?;
    let ambre = write_ambre_csv(&dir);
    let dwings = write_dwings_csv(&dir);

    let mut cmd = Command::cargo_bin("reconcile")?;
    let output = cmd
        .args([
            "import",
            "--country-id",
            "FR",
            "--pivot-account",
            "P",
            "--receivable-account",
            "R",
            "--dwings-file",
        ])
        .arg(&dwings)
        .arg(&ambre)
        .args(["--format", "json"])
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let value: Value = serde_json::from_str(&stdout)?;
    assert_eq!(value["success"], Value::Bool(true));
    assert_eq!(value["new"], Value::from(2));
    Ok(())
}

#[test]
fn missing_account_side_fails_the_process() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("ambre.csv");
    std::fs::write(
        &path,
        b"Account_ID,CCY,Event_Num,RawLabel,SignedAmount,Operation_Date\n\
          P,EUR,E1,pivot only,100.00,2024-01-10\n",
    )?;
    let dwings = write_dwings_csv(&dir);

    let mut cmd = Command::cargo_bin("reconcile")?;
    let output = cmd
        .args([
            "import",
            "--country-id",
            "FR",
            "--pivot-account",
            "P",
            "--receivable-account",
            "R",
            "--dwings-file",
        ])
        .arg(&dwings)
        .arg(&path)
        .output()?;

    assert!(!output.status.success());
    Ok(())
}
