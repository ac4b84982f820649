//! Exit behavior of the `cordon` binary

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};

fn cordon(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cordon"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn long_help_exits_zero() {
    let output = cordon(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("--writable"));
    assert!(text.contains("--hide"));
}

#[test]
fn no_arguments_is_a_usage_error() {
    assert_eq!(cordon(&[]).status.code(), Some(1));
}

#[test]
fn missing_command_is_a_usage_error() {
    let output = cordon(&["browser", "-w", "Downloads"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing command"));
}

#[test]
fn nx_after_directive_is_a_usage_error() {
    let output = cordon(&["browser", "-w", "Downloads", "--nx", "true"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--nx must be specified before"));
}

#[test]
fn flags_before_name_are_a_usage_error() {
    let output = cordon(&["-w", "Downloads", "browser", "true"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("NAME must be the first argument"));
}

#[test]
fn traversal_in_container_name_aborts() {
    let output = cordon(&["..", "true"]);
    assert_eq!(output.status.signal(), Some(libc::SIGABRT));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(".."));
    assert!(stderr.contains("backtrace:"));
}

#[test]
fn traversal_in_directive_aborts() {
    let output = cordon(&["browser", "-r", "../.ssh", "true"]);
    assert_eq!(output.status.signal(), Some(libc::SIGABRT));
}
