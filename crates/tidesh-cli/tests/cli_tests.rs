//! End-to-end checks of the `tidesh` binary

use std::process::{Command, Output};

fn tidesh(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tidesh"))
        .args(args)
        .output()
        .expect("failed to run tidesh")
}

#[test]
fn command_string_with_operands() {
    let out = tidesh(&["-c", "echo $0 $1", "zero", "one"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "zero one\n");
}

#[test]
fn exit_status_is_propagated() {
    let out = tidesh(&["-c", "exit 4"]);
    assert_eq!(out.status.code(), Some(4));
}

#[test]
fn errexit_flag() {
    let out = tidesh(&["-e", "-c", "false; echo no"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
}

#[test]
fn json_output() {
    let out = tidesh(&["--json", "-c", "echo hi; echo oops >&2; exit 2"]);
    assert_eq!(out.status.code(), Some(2));
    let text = String::from_utf8_lossy(&out.stdout);
    assert_eq!(text.trim(), r#"{"stdout":"hi\n","stderr":"oops\n","exit_code":2}"#);
}

#[test]
fn script_file_with_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greet.sh");
    std::fs::write(&path, "echo \"hello $1 from ${0##*/}\"\n").unwrap();
    let out = tidesh(&[path.to_str().unwrap(), "there"]);
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hello there from greet.sh\n");
}

#[test]
fn invalid_option_name_fails() {
    let out = tidesh(&["-o", "bogus", "-c", "true"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("bogus: invalid option name"));
}
