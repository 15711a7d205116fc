//! Command line integration tests
//!
//! Run the built `pydiff` binary against files written to a temporary
//! directory and check stdout, stderr and the exit status.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn write(temp_dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = temp_dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn run(args: &[&std::ffi::OsStr]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pydiff"))
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn run_files(a: &PathBuf, b: &PathBuf, extra: &[&str]) -> Output {
    let mut args = vec![a.as_os_str(), b.as_os_str()];
    args.extend(extra.iter().map(std::ffi::OsStr::new));
    run(&args)
}

#[test]
fn test_cli_version() {
    let output = run(&["--version".as_ref()]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "pydiff 0.1.0");
}

#[test]
fn test_cli_identical_behaviour() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(&temp_dir, "a.py", b"x = 1\n");
    let b = write(&temp_dir, "b.py", b"x=1  # same\r\n");

    let output = run_files(&a, &b, &[]);

    assert_eq!(
        output.status.code(),
        Some(0),
        "Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cli_prints_diff() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(&temp_dir, "a.py", b"x = 1\n");
    let b = write(&temp_dir, "b.py", b"x = 2\n");

    let output = run_files(&a, &b, &[]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with(&format!("--- {}\n+++ {}\n@@ ", a.display(), b.display())));
    assert!(stdout.contains("\n-        1,\n+        2,\n"));
    assert!(stdout.ends_with("\n\n"), "diff should end with a blank line");
}

#[test]
fn test_cli_context_option() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(&temp_dir, "a.py", b"x = 1\n");
    let b = write(&temp_dir, "b.py", b"x = 2\n");

    let output = run_files(&a, &b, &["-U", "0"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 5 + 1);
}

#[test]
fn test_cli_syntax_error() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(&temp_dir, "a.py", b"x = 1\n");
    let b = write(&temp_dir, "broken.py", b"x = 1\ndef f(:\n    pass\n");

    let output = run_files(&a, &b, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr,
        format!("{}:2 invalid syntax\ndef f(:\n      ^\n", b.display())
    );
}

#[test]
fn test_cli_deeply_nested_source_is_a_syntax_error() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(&temp_dir, "a.py", b"x = 1\n");
    let source = format!("x = {}1\n", "-".repeat(3000));
    let b = write(&temp_dir, "deep.py", source.as_bytes());

    let output = run_files(&a, &b, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with(&format!("{}:1 invalid syntax\n", b.display())), "{stderr}");
}

#[test]
fn test_cli_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(&temp_dir, "a.py", b"x = 1\n");
    let missing = temp_dir.path().join("missing.py");

    let output = run_files(&a, &missing, &[]);

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error: "), "Stderr: {stderr}");
    assert!(stderr.contains("missing.py"));
    assert_eq!(stderr.matches("(os error 2)").count(), 1, "Stderr: {stderr}");
}

#[test]
fn test_cli_missing_argument() {
    let output = run(&["only_one.py".as_ref()]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cli_latin1_source() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(&temp_dir, "a.py", b"# coding: latin-1\ns = '\xe9'\n");
    let b = write(&temp_dir, "b.py", "s = 'é'\n".as_bytes());

    let output = run_files(&a, &b, &[]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cli_verbose_logs_to_stderr() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(&temp_dir, "a.py", b"x = 1\n");

    let output = run_files(&a, &a, &["-vv"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("compared"), "Stderr: {stderr}");
}
