use pretty_assertions::assert_eq;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};
use tempfile::TempDir;

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_midas")
}

fn write_script(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).expect("failed to write script");
    path
}

fn midas(args: &[&str], script: Option<&Path>) -> Output {
    let mut cmd = Command::new(bin_path());
    cmd.args(args)
        .env_remove("MIDAS_LOG")
        .env_remove("MIDAS_MAX_CALL_DEPTH")
        .env_remove("MIDAS_GC_THRESHOLD")
        .stdin(Stdio::null());
    if let Some(script) = script {
        cmd.arg(script);
    }
    cmd.output().expect("failed to run midas")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn run_prints_program_output() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "hello.midas",
        "var greeting = \"hello\";\nprint greeting ++ \" world\";\nprint 1 / 4;\n",
    );
    let output = midas(&["run"], Some(&script));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "hello world\n0.25\n");
}

#[test]
fn runtime_errors_exit_with_failure_and_a_line() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "boom.midas", "print 1;\nprint 1 // 0;\nprint 2;\n");
    let output = midas(&["run"], Some(&script));
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "1\n");
    assert!(stderr(&output).contains("[line 2] Division by zero"));
}

#[test]
fn check_reports_resolution_errors_without_running() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "bad.midas", "print \"ran\";\ndo var x = x; end\n");
    let output = midas(&["check"], Some(&script));
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "");
    assert!(stderr(&output).contains("own initializer"));

    let good = write_script(&dir, "good.midas", "print 1;\n");
    let output = midas(&["check"], Some(&good));
    assert!(output.status.success());
    assert!(stdout(&output).ends_with(": ok\n"));
}

#[test]
fn max_depth_flag_limits_recursion() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "deep.midas",
        "fun down(n) do if (n == 0) return 0; end return down(n - 1); end\nprint down(50);\n",
    );
    let output = midas(&["run", "--max-depth", "10"], Some(&script));
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Stack overflow"));

    let output = midas(&["run", "--max-depth=100"], Some(&script));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "0\n");
}

#[test]
fn usage_errors_exit_with_two() {
    let output = midas(&["frobnicate", "x", "y"], None);
    assert_eq!(output.status.code(), Some(2));
    let output = midas(&["run", "--max-depth", "many", "x.midas"], None);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.midas");
    let output = midas(&["run"], Some(&missing));
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to access"));
}

#[test]
fn repl_keeps_state_between_lines() {
    let mut child = Command::new(bin_path())
        .arg("repl")
        .env_remove("MIDAS_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start repl");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(b"var a = 40;\nprint oops;\nprint a + 2;\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("42\n"));
    assert!(stderr(&output).contains("Undefined variable `oops`"));
}
