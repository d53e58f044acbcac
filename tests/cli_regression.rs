// Regression tests for the cmacro binary: output on stdout, miette
// diagnostics on stderr, exit status 1 on failure.

mod common;

use std::fs;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

use common::fixture;

fn cmacro() -> Command {
    let mut cmd = Command::cargo_bin("cmacro").unwrap();
    // Keep a stray cmacro.yaml in the working directory out of the picture.
    cmd.current_dir(fixture(""));
    cmd
}

#[test]
fn expand_prints_the_expanded_unit() {
    cmacro()
        .arg("expand")
        .arg(fixture("programs/lambda_toplevel.c"))
        .assert()
        .success()
        .stdout(contains("int cmacro_lambda_0(int x)").and(contains("lambda (").not()));
}

#[test]
fn expand_writes_to_an_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.c");
    cmacro()
        .arg("expand")
        .arg(fixture("programs/lazy.c"))
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("return (thunk)();"), "{text}");
}

#[test]
fn expand_uses_macro_files_from_the_command_line() {
    let dir = tempfile::tempdir().unwrap();
    let unit = dir.path().join("unit.c");
    fs::write(&unit, "int main(void) { return force(t); }\n").unwrap();
    cmacro()
        .arg("expand")
        .arg(&unit)
        .arg("--macros")
        .arg(fixture("macros/fn/lazy.c"))
        .assert()
        .success()
        .stdout(contains("return (t)();"));
}

#[test]
fn expand_reports_miette_diagnostics_on_error() {
    cmacro()
        .arg("expand")
        .arg(fixture("errors/no_case.c"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("cmacro::expand::no_matching_case").and(contains("case 1:")));
}

#[test]
fn max_steps_flag_overrides_the_ceiling() {
    cmacro()
        .arg("expand")
        .arg(fixture("errors/forever.c"))
        .arg("--max-steps")
        .arg("10")
        .assert()
        .failure()
        .stderr(contains("cmacro::expand::depth_exceeded").and(contains("10")));
}

#[test]
fn expand_directory_reports_each_file() {
    let out = tempfile::tempdir().unwrap();
    cmacro()
        .arg("expand")
        .arg(fixture("programs"))
        .arg("-o")
        .arg(out.path())
        .assert()
        .success();
    assert!(out.path().join("shapes.c").is_file());
    assert!(out.path().join("plain.c").is_file());
}

#[test]
fn check_accepts_the_bundled_libraries() {
    cmacro()
        .arg("check")
        .arg(fixture("macros/fn/lazy.c"))
        .arg(fixture("macros/type/adt.c"))
        .assert()
        .success()
        .stdout(contains("3 macro(s) OK").and(contains("4 macro(s) OK")));
}

#[test]
fn check_rejects_a_bad_definition() {
    cmacro()
        .arg("check")
        .arg(fixture("errors/bad_definition.c"))
        .assert()
        .failure()
        .stderr(contains("cmacro::definition::misplaced_rest"));
}

#[test]
fn list_macros_follows_imports() {
    cmacro()
        .arg("list-macros")
        .arg(fixture("macros/fn/lazy.c"))
        .assert()
        .success()
        .stdout(contains("delay").and(contains("force")).and(contains("lambda  2 cases")));
}

#[test]
fn list_macros_as_json() {
    let output = cmacro()
        .arg("list-macros")
        .arg("--json")
        .arg(fixture("macros/type/tuple.c"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["name"], "tup");
    assert_eq!(value[0]["cases"], 1);
}

#[test]
fn trace_as_json_lists_steps() {
    let output = cmacro()
        .arg("trace")
        .arg("--json")
        .arg(fixture("programs/lazy.c"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|step| step["macro_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["delay", "lambda", "force"]);
}

#[test]
fn trace_shows_diffs() {
    cmacro()
        .arg("trace")
        .arg(fixture("programs/lambda_toplevel.c"))
        .assert()
        .success()
        .stdout(contains("--- Step 1: lambda (case 2, toplevel) ---").and(contains("+int cmacro_lambda_0")));
}
