use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const SOURCE: &str = "\
namespace calc;

struct Point { int x; int y; }

interface Calculator {
    Calculator(int precision);
    int add(int a, int b);
}
";

#[test]
fn generates_all_targets_by_default() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("calc.idl");
    fs::write(&input_path, SOURCE).expect("write input");
    let out_dir = dir.path().join("out");

    Command::cargo_bin("idlgen-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("calc_c_api.h"));

    assert!(out_dir.join("calc_c_api.h").is_file());
    assert!(out_dir.join("calc_client.hpp").is_file());
    assert!(out_dir.join("calc_wasm_bindings.cpp").is_file());
    assert!(out_dir.join("java/calc/Calculator.java").is_file());
}

#[test]
fn reads_source_from_stdin() {
    let dir = tempdir().expect("tempdir");
    let out_dir = dir.path().join("out");

    Command::cargo_bin("idlgen-cli")
        .expect("binary exists")
        .arg("--output-dir")
        .arg(&out_dir)
        .arg("--targets")
        .arg("c-abi")
        .write_stdin(SOURCE)
        .assert()
        .success();

    assert!(out_dir.join("calc_c_api.h").is_file());
    assert!(!out_dir.join("calc_client.hpp").exists());
}

#[test]
fn target_selection_limits_artifacts() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("calc.idl");
    fs::write(&input_path, SOURCE).expect("write input");
    let out_dir = dir.path().join("out");

    Command::cargo_bin("idlgen-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output-dir")
        .arg(&out_dir)
        .arg("--targets")
        .arg("c-abi,client")
        .assert()
        .success();

    assert!(out_dir.join("calc_c_api.h").is_file());
    assert!(out_dir.join("calc_client.hpp").is_file());
    assert!(!out_dir.join("calc_wasm_bindings.cpp").exists());
    assert!(!out_dir.join("java").exists());
}

#[test]
fn namespace_override_renames_artifacts() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("calc.idl");
    fs::write(&input_path, SOURCE).expect("write input");
    let out_dir = dir.path().join("out");

    Command::cargo_bin("idlgen-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output-dir")
        .arg(&out_dir)
        .arg("--namespace")
        .arg("engine")
        .arg("--targets")
        .arg("c-abi")
        .assert()
        .success();

    assert!(out_dir.join("engine_c_api.h").is_file());
}

#[test]
fn reports_syntax_errors_with_position() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("broken.idl");
    fs::write(&input_path, "namespace calc;\nstruct Point { int }\n").expect("write input");

    Command::cargo_bin("idlgen-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output-dir")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("syntax error"));
}

#[test]
fn rejects_unknown_target() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("calc.idl");
    fs::write(&input_path, SOURCE).expect("write input");

    Command::cargo_bin("idlgen-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output-dir")
        .arg(dir.path().join("out"))
        .arg("--targets")
        .arg("cobol")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown target: cobol"));
}

#[test]
fn failed_generation_writes_nothing() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("feed.idl");
    fs::write(
        &input_path,
        "namespace app;\n\
         callback OnData(bytes chunk, int len);\n\
         interface Feed { void subscribe(OnData sink); }\n",
    )
    .expect("write input");
    let out_dir = dir.path().join("out");

    Command::cargo_bin("idlgen-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output-dir")
        .arg(&out_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("generation failed"));

    assert!(!out_dir.exists());
}
