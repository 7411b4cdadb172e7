#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

const HEADER: &str = "op, store_id, out_trade_no, out_refund_no, channel, auth_code, title, total_fee, refund_fee";

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: pay and partially refund
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "{HEADER}").unwrap();
    writeln!(csv1, "pay, S1, O1, , , 286203470917515029, Coffee, 100,").unwrap();
    writeln!(csv1, "refund, S1, O1, O1_R1, , , , , 60").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("paygate"));
    cmd1.arg(csv1.path())
        .arg("--merchants")
        .arg("tests/fixtures/merchants.json")
        .arg("--db-path")
        .arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("pay,S1,SUCCESS,alipay,O1,,"));
    assert!(stdout1.contains("refund,S1,SUCCESS,,O1,O1_R1,"));

    // 2. Second run: the paid order and its refund total are recovered from disk
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "{HEADER}").unwrap();
    writeln!(csv2, "pay, S1, O1, , , 286203470917515029, Coffee, 100,").unwrap();
    writeln!(csv2, "refund, S1, O1, O1_R2, , , , , 50").unwrap();

    let ledger = tempfile::NamedTempFile::new().unwrap();
    let mut cmd2 = Command::new(cargo_bin!("paygate"));
    cmd2.arg(csv2.path())
        .arg("--merchants")
        .arg("tests/fixtures/merchants.json")
        .arg("--db-path")
        .arg(&db_path)
        .arg("--ledger")
        .arg(ledger.path());

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    // Answered from the ledger, no second payment
    assert!(stdout2.contains("pay,S1,SUCCESS,alipay,O1,,"));
    assert!(stdout2.contains("Refund.ExceedsRefundable"));

    let rows = std::fs::read_to_string(ledger.path()).unwrap();
    assert!(rows.contains("S1,O1,alipay,SUCCESS,100,0,60,"));
    assert!(rows.contains("S1,O1_R1,alipay,SUCCESS,-60,"));
    assert_eq!(rows.lines().count(), 3);
}
