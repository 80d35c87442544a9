use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEMP_NONCE: AtomicU64 = AtomicU64::new(0);

const CATALOGUE: &str = r#"{
    "formats": [{
        "name": "rows",
        "variables": [
            {"name": "tag", "type": "s", "signable": true},
            {"name": "size", "type": "i"}
        ]
    }],
    "actions": [{"name": "notify", "parameters": [{"name": "tag", "type": "s"}]}]
}"#;

fn olive_bin() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_olive") {
        return PathBuf::from(path);
    }

    let mut exe = std::env::current_exe().expect("test executable path should be known");
    exe.pop();
    if exe.file_name().and_then(|name| name.to_str()) == Some("deps") {
        exe.pop();
    }
    exe.join("olive")
}

fn temp_path(prefix: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    let counter = TEMP_NONCE.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("{prefix}-{timestamp}-{counter}.json"))
}

fn write_temp(prefix: &str, contents: &str) -> PathBuf {
    let path = temp_path(prefix);
    std::fs::write(&path, contents).expect("temp file write should succeed");
    path
}

/// One olive over `rows`: `Where <condition>` then `Run notify With tag = tag`.
fn program(condition: &str) -> String {
    format!(
        r#"{{"olives": [{{
            "span": {{"line": 1, "column": 1}},
            "node": {{
                "format": {{"node": "rows"}},
                "clauses": [{{"span": {{"line": 2, "column": 3}}, "node": {{"where": {condition}}}}}],
                "terminal": {{"span": {{"line": 3, "column": 3}}, "node": {{"run": {{
                    "action": {{"node": "notify"}},
                    "arguments": [{{"name": {{"node": "tag"}}, "value": {{"node": {{"variable": "tag"}}}}}}]
                }}}}}}
            }}
        }}]}}"#
    )
}

fn run_check(program_text: &str, extra: &[&str]) -> std::process::Output {
    let program = write_temp("olive-cli-program", program_text);
    let catalogue = write_temp("olive-cli-catalogue", CATALOGUE);

    let output = Command::new(olive_bin())
        .arg("check")
        .arg(&program)
        .arg("--catalogue")
        .arg(&catalogue)
        .args(extra)
        .output()
        .expect("olive check should execute");

    let _ = std::fs::remove_file(program);
    let _ = std::fs::remove_file(catalogue);
    output
}

#[test]
fn olive_check_accepts_a_valid_program() {
    let condition = r#"{"span": {"line": 2, "column": 9}, "node": {"binary": {
        "op": "greater",
        "left": {"node": {"variable": "size"}},
        "right": {"node": {"literal": {"integer": 3}}}
    }}}"#;
    let output = run_check(&program(condition), &[]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("ok: 1 olives checked, 0 warnings"),
        "unexpected stdout: {stdout}"
    );
}

#[test]
fn olive_check_reports_type_errors() {
    let condition = r#"{"span": {"line": 2, "column": 9}, "node": {"variable": "size"}}"#;
    let output = run_check(&program(condition), &[]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error[E0003]: 2:9: Expected boolean, but got integer."),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn olive_check_prints_summaries() {
    let condition = r#"{"node": {"literal": {"boolean": true}}}"#;
    let output = run_check(&program(condition), &["--summary"]);

    assert_eq!(output.status.code(), Some(0));
    let summaries: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary should be JSON");
    assert_eq!(summaries[0]["format"], "rows");
    assert_eq!(summaries[0]["signable"], serde_json::json!(["tag"]));
}

#[test]
fn olive_check_rejects_malformed_programs() {
    let output = run_check("{\"olives\": 3}", &[]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse"), "unexpected stderr: {stderr}");
}

#[test]
fn olive_explain_describes_codes() {
    let output = Command::new(olive_bin())
        .arg("explain")
        .arg("E0009")
        .output()
        .expect("olive explain should execute");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("E0009 (nondeterministic)"), "unexpected stdout: {stdout}");
}
