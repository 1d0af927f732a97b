use std::io::Write;
use std::process::{Command, Output};

fn rexpr() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rexpr"))
}

fn run(args: &[&str]) -> Output {
    rexpr().args(args).output().expect("failed to run rexpr")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

// --- eval ---

#[test]
fn eval_with_vars() {
    let out = run(&["eval", "(price * qty) >= 100", "--var", "price=25", "--var", "qty=4"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "true");

    let out = run(&["eval", "(price * qty) >= 100", "--var", "price=25", "--var", "qty=3"]);
    assert_eq!(stdout(&out), "false");
}

#[test]
fn eval_json_and_plain_string_vars() {
    let out = run(&["eval", "user.name + ' ' + greeting", "--var", r#"user={"name":"Ada"}"#, "--var", "greeting=hi there"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "Ada hi there");
}

#[test]
fn eval_scoped_var() {
    let out = run(&["eval", "Counter::value * 2", "--var", "Counter::value=21"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "42");
}

#[test]
fn eval_repeat_with_stats() {
    let out = run(&["eval", "math_max(a, 3)", "--var", "a=7", "--repeat", "5", "--stats"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "7");
    let err = stderr(&out);
    assert!(err.contains("entries:   1 / 1024"), "stats: {err}");
    // One compile miss, then memo hits for the pure expression.
    assert!(err.contains("misses:    1"), "stats: {err}");
    assert!(err.contains("hits:      4"), "stats: {err}");
}

// --- run ---

#[test]
fn run_statement_block() {
    let src = "total = 0; for (x in xs) { total += x }; return total";
    let out = run(&["run", src, "--var", "xs=[1,2,3,4]"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "10");
}

// --- ast / disasm ---

#[test]
fn ast_prints_json_tree() {
    let out = run(&["ast", "a.b + 1"]);
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("AST JSON");
    assert_eq!(v["kind"], "binary");
    assert_eq!(v["op"], "add");
    assert_eq!(v["left"]["kind"], "member");
}

#[test]
fn ast_file_round_trip() {
    let ast = run(&["ast", "(price * qty) >= 100"]);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&ast.stdout).unwrap();
    let path = file.path().to_str().unwrap();

    let out = run(&["eval", "--ast-file", path, "--var", "price=25", "--var", "qty=4"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "true");
}

#[test]
fn fmt_normalizes_spacing() {
    let out = run(&["fmt", "(a+b)*c>=limit?'hi':null"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), r#"(a + b) * c >= limit ? "hi" : null"#);
}

#[test]
fn disasm_lists_opcodes() {
    let out = run(&["disasm", "x > 1 && y"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("LOAD_VAR"), "{text}");
    assert!(text.contains("JUMP_IF_FALSE"), "{text}");
    assert!(text.ends_with("HALT"), "{text}");
}

#[test]
fn disasm_no_fold_keeps_arithmetic() {
    let folded = stdout(&run(&["disasm", "2 * 3"]));
    assert!(!folded.contains("MUL"), "{folded}");
    let plain = stdout(&run(&["disasm", "2 * 3", "--no-fold"]));
    assert!(plain.contains("MUL"), "{plain}");
}

#[test]
fn config_file_is_applied() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{"compile": {"fold_constants": false}}"#).unwrap();
    let out = run(&["disasm", "2 * 3", "--config", file.path().to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("MUL"));
}

#[test]
fn builtins_are_listed() {
    let out = run(&["builtins"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.lines().any(|l| l.starts_with("math_clamp") && l.ends_with('3')), "{text}");
    assert!(text.lines().any(|l| l.starts_with("math_random") && l.ends_with("(impure)")), "{text}");
}

// --- Errors ---

#[test]
fn division_by_zero_fails() {
    let out = run(&["eval", "10 / 0"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("division by zero"), "stderr: {}", stderr(&out));
}

#[test]
fn parse_error_points_at_source() {
    let out = run(&["eval", "a + * b"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("error[P"), "{err}");
    assert!(err.contains("a + * b"), "{err}");
    assert!(err.contains('^'), "{err}");
}

#[test]
fn deeply_nested_input_fails_cleanly() {
    let src = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
    let out = run(&["eval", &src, "--json-errors"]);
    assert_eq!(out.status.code(), Some(1), "stderr: {}", stderr(&out));
    let v: serde_json::Value = serde_json::from_str(stderr(&out).trim()).expect("JSON diagnostic");
    assert_eq!(v["code"], "P015");
}

#[test]
fn json_errors_mode() {
    let out = run(&["eval", "missing + 1", "--json-errors"]);
    assert!(!out.status.success());
    let v: serde_json::Value = serde_json::from_str(stderr(&out).trim()).expect("JSON diagnostic");
    assert_eq!(v["severity"], "error");
    assert_eq!(v["message"], "undefined variable: missing");
    assert_eq!(v["code"], "R001");
}

#[test]
fn missing_input_is_an_error() {
    let out = run(&["eval"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("no input"));
}

#[test]
fn bad_var_binding() {
    let out = run(&["eval", "1", "--var", "novalue"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("invalid --var"));
}
