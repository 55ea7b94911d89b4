//! Integration tests for the dbc CLI
//!
//! These tests invoke the actual dbc-cli binary and verify:
//! - Exit codes (0 = success, 1 = violation or failed verification, 2 = error)
//! - stdout/stderr output
//! - JSON output format

use std::path::PathBuf;
use std::process::Command;

// ── Helpers ───────────────────────────────────────────────

fn dbc_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dbc-cli"))
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn run_dbc(args: &[&str]) -> std::process::Output {
    Command::new(dbc_bin())
        .args(args)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute dbc-cli")
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("should be valid JSON")
}

const MATMUL_ARGS: &str = r#"[{"shape": [3, 2]}, {"shape": [2, 4]}]"#;

// ── Version ───────────────────────────────────────────────

#[test]
fn test_version_command() {
    let output = run_dbc(&["version"]);
    assert!(output.status.success(), "version should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dbc"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_version_flag() {
    let output = run_dbc(&["--version"]);
    assert!(output.status.success(), "--version should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

// ── Check ─────────────────────────────────────────────────

#[test]
fn test_check_arguments_and_result() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&[
        "check",
        &matmul,
        "--args",
        MATMUL_ARGS,
        "--result",
        r#"{"shape": [3, 4]}"#,
    ]);
    assert!(output.status.success(), "satisfied contract should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("matmul: arguments and return value satisfy the contract"));
    assert!(stdout.contains("m = 3"));
    assert!(stdout.contains("n = 2"));
    assert!(stdout.contains("o = 4"));
}

#[test]
fn test_check_json_bindings() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&["check", &matmul, "--args", MATMUL_ARGS, "--json"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checked"], true);
    assert_eq!(json["bindings"]["m"], 3);
    assert_eq!(json["bindings"]["o"], 4);
}

#[test]
fn test_check_named_arguments() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&[
        "check",
        &matmul,
        "--args",
        r#"{"b": {"shape": [2, 4]}, "a": {"shape": [3, 2]}}"#,
        "--json",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["bindings"]["n"], 2);
}

#[test]
fn test_check_argument_violation() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&[
        "check",
        &matmul,
        "--args",
        r#"[{"shape": [3, 2]}, {"shape": [3, 4]}]"#,
    ]);
    assert_eq!(output.status.code(), Some(1), "violation should exit 1");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("slot `b`, predicate #1"), "{}", stderr);
    assert!(stderr.contains("ambiguity in variable `n`: [2, 3]"), "{}", stderr);
}

#[test]
fn test_check_return_violation_json() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&[
        "check",
        &matmul,
        "--args",
        MATMUL_ARGS,
        "--result",
        r#"{"shape": [4, 3]}"#,
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["status"], "violation");
    assert_eq!(json["site"], "slot `return`, predicate #1");
}

#[test]
fn test_check_derived_variable() {
    let derived = fixture("derived.json");
    let ok = run_dbc(&["check", &derived, "--args", "[[1, 2], 2]", "--result", "[1, 2, 1, 2]"]);
    assert!(ok.status.success());

    let bad = run_dbc(&["check", &derived, "--args", "[[1, 2, 3], 2]"]);
    assert_eq!(bad.status.code(), Some(1));
}

#[test]
fn test_check_circular_definition_error() {
    let circular = fixture("circular.json");
    let output = run_dbc(&["check", &circular, "--args", "[null]"]);
    assert_eq!(output.status.code(), Some(2), "definition error should exit 2");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("could not resolve all variables after 5 iterations: `A`, `B`"),
        "{}",
        stderr
    );
}

#[test]
fn test_check_disabled_contract() {
    let disabled = fixture("disabled.json");
    let output = run_dbc(&[
        "check",
        &disabled,
        "--args",
        r#"[{"shape": [3, 2]}, {"shape": [3, 4]}]"#,
        "--json",
    ]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["checked"], false);
}

#[test]
fn test_check_wrong_argument_count() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&["check", &matmul, "--args", r#"[{"shape": [3, 2]}]"#]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration error"), "{}", stderr);
}

#[test]
fn test_check_invalid_args_json() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&["check", &matmul, "--args", "[1,"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--args is not valid JSON"), "{}", stderr);
}

#[test]
fn test_check_quiet() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&["--quiet", "check", &matmul, "--args", MATMUL_ARGS]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty(), "quiet mode should produce no stdout");
}

#[test]
fn test_check_nonexistent_file() {
    let output = run_dbc(&["check", "nonexistent.json", "--args", "[]"]);
    assert_eq!(output.status.code(), Some(2), "missing file should exit 2");
}

// ── Describe ──────────────────────────────────────────────

#[test]
fn test_describe_text() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&["describe", &matmul]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("matmul(a, b)"), "{}", stdout);
    assert!(stdout.contains("b: |b, n, o| b.shape == (n, o)"), "{}", stdout);
    assert!(stdout.contains("return: |x, m, o| x.shape == (m, o)"), "{}", stdout);
}

#[test]
fn test_describe_json() {
    let derived = fixture("derived.json");
    let output = run_dbc(&["describe", "--json", &derived]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["name"], "repeat");
    assert_eq!(json["parameters"][1]["name"], "times");
    assert_eq!(json["definitions"]["total"], "|times| times * 2");
    assert_eq!(json["options"]["reserved"], "x");
}

// ── Verify ────────────────────────────────────────────────

#[test]
fn test_verify_valid_contract() {
    let matmul = fixture("matmul.json");
    let output = run_dbc(&["verify", &matmul]);
    assert!(output.status.success(), "verify valid should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("contract is valid"));
}

#[test]
fn test_verify_reports_warnings() {
    let loose = fixture("style_warnings.json");
    let output = run_dbc(&["verify", "--json", &loose]);
    assert!(output.status.success(), "warnings alone should exit 0");
    let json = stdout_json(&output);
    assert_eq!(json["valid"], true);
    let diagnostics = json["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics.iter().all(|d| d["severity"] == "warning"));
}

#[test]
fn test_verify_unknown_dependency() {
    let bad = fixture("unknown_dependency.json");
    let output = run_dbc(&["verify", &bad]);
    assert_eq!(output.status.code(), Some(1), "failed verification should exit 1");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown argument names `{'c'}`"), "{}", stderr);

    let checked = run_dbc(&["check", &bad, "--args", "[1, 2]"]);
    assert_eq!(checked.status.code(), Some(2));
}

#[test]
fn test_verify_bad_options() {
    let bad = fixture("bad_options.json");
    let output = run_dbc(&["verify", "--json", &bad]);
    assert_eq!(output.status.code(), Some(2));
    let json = stdout_json(&output);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("options must be given by name"));
}

#[test]
fn test_verify_parse_error() {
    let bad = fixture("bad_predicate.json");
    let output = run_dbc(&["verify", &bad]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Parse error"), "{}", stderr);
}
