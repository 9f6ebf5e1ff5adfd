//! Process-level integration tests: spawn the built `esh` binary, feed it
//! a piped script on stdin, and assert on stdout/stderr/exit status, rather
//! than calling library functions directly.

use std::io::Write;
use std::process::{Command, Stdio};

fn run_script(script: &str) -> (String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_esh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn esh");

    child.stdin.take().unwrap().write_all(script.as_bytes()).unwrap();
    let output = child.wait_with_output().expect("esh did not exit cleanly");
    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

#[test]
fn echo_prints_its_arguments() {
    let (stdout, _stderr) = run_script("echo hello world\nexit\n");
    assert!(stdout.contains("hello world"));
}

#[test]
fn pwd_prints_the_current_directory() {
    let expected = std::env::current_dir().unwrap();
    let (stdout, _stderr) = run_script("pwd\nexit\n");
    assert!(stdout.contains(&expected.display().to_string()));
}

#[test]
fn pipeline_with_output_redirection_writes_uppercased_file() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.txt");
    let script = format!("echo hello | tr a-z A-Z > {}\nexit\n", out_path.display());

    run_script(&script);
    let contents = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(contents.trim(), "HELLO");
}

#[test]
fn background_job_is_listed_and_then_reaped() {
    let script = "sleep 1 &\njobs\nexit\n";
    let (stdout, _stderr) = run_script(script);
    assert!(stdout.contains("[1]"));
    assert!(stdout.contains("Running") || stdout.contains("Done"));
}

#[test]
fn unknown_job_id_reports_not_found() {
    let (_stdout, stderr) = run_script("fg %99\nexit\n");
    assert!(stderr.contains("No job with job id 99 found"));
}

#[test]
fn end_of_file_terminates_the_shell_cleanly() {
    let (stdout, stderr) = run_script("");
    assert!(stdout.is_empty());
    assert!(stderr.is_empty());
}

#[test]
fn malformed_redirection_is_a_user_error_not_a_crash() {
    let (_stdout, stderr) = run_script("echo hi >\nexit\n");
    assert!(stderr.contains("syntax error"));
}

#[test]
fn empty_pipe_stage_is_a_user_error() {
    let (_stdout, stderr) = run_script("echo hi | | wc\nexit\n");
    assert!(stderr.contains("syntax error"));
}

#[test]
fn unknown_command_reports_not_found_and_keeps_the_shell_alive() {
    let (stdout, stderr) = run_script("nosuchcommand123\necho still alive\nexit\n");
    assert!(stderr.contains("nosuchcommand123"));
    assert!(stderr.contains("command not found"));
    assert!(stdout.contains("still alive"));
}
