//! End-to-end job-control scenarios, driven against the real binary over a
//! piped (non-tty) stdin. Terminal handoff is skipped in this mode
//! (`tty_fd` is `None`), but process-group assignment, signal delivery,
//! and the status reactor's state machine are exercised exactly as they
//! would be interactively.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

fn run_script(script: &str) -> (String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_esh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn esh");

    // Feed the script line by line with small pauses so the async SIGCHLD
    // self-pipe has a chance to drain between commands, mirroring how a
    // human typing at a prompt would naturally interleave with reaping.
    let mut stdin = child.stdin.take().unwrap();
    for line in script.lines() {
        writeln!(stdin, "{line}").unwrap();
        std::thread::sleep(Duration::from_millis(150));
    }
    drop(stdin);

    let output = child.wait_with_output().expect("esh did not exit cleanly");
    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

#[test]
fn background_launch_then_completion_reports_done() {
    let (stdout, _stderr) = run_script("sleep 0 &\nsleep 1\njobs\nexit");
    assert!(stdout.contains("[1] "));
    assert!(stdout.contains("Done"));
}

#[test]
fn stop_then_bg_resumes_a_stopped_pipeline_in_the_background() {
    let (stdout, _stderr) = run_script("sleep 5 &\nstop %1\njobs\nbg %1\njobs\nkill %1\nsleep 0.3\njobs\nexit");
    assert!(stdout.contains("Stopped"));
    assert!(stdout.matches("[1]").count() >= 2);
}

#[test]
fn jid_counter_resets_after_table_empties() {
    let (stdout, _stderr) = run_script("sleep 0 &\nsleep 1\nsleep 0 &\nsleep 1\njobs\nexit");
    // The second background job reuses jid 1 because the table emptied
    // after the first one was reaped.
    assert!(stdout.contains("[1] "));
    assert!(!stdout.contains("[2] "));
}

#[test]
fn kill_terminates_a_background_job_silently() {
    let (stdout, stderr) = run_script("sleep 5 &\nkill %1\nsleep 0.3\njobs\nexit");
    assert!(!stdout.contains("Stopped"));
    assert!(stderr.is_empty());
}
