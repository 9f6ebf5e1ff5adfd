//! Pipeline launcher and foreground wait.
//!
//! Built on `std::process::Command` + `pre_exec` rather than raw
//! `libc::fork`: `pre_exec` gives the child-side hook point the
//! process-group join needs while keeping the parent-side bookkeeping in
//! safe Rust. `os_pipe` supplies the inter-stage pipes; because each pipe
//! end is *moved* into a `Stdio` and dropped the instant `spawn()`
//! duplicates it, the parent never retains a stray fd past the iteration
//! that created it — no pipe fds leak, without an explicit close() pass.

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::Stdio;

use crate::ast::{Pipeline, PipelineStatus};
use crate::error::Error;
use crate::jobs::JobTable;
use crate::plugin::PluginRegistry;
use crate::status::react_to_status_change;

#[cfg(unix)]
fn stdin_for_stage(command: &crate::ast::Command, upstream: Option<os_pipe::PipeReader>) -> Result<Stdio, Error> {
    if let Some(path) = &command.input_redirect {
        std::fs::File::open(path).map(Stdio::from).map_err(|e| Error::child(format!("{path}: {e}")))
    } else if let Some(reader) = upstream {
        Ok(reader.into())
    } else {
        Ok(Stdio::inherit())
    }
}

#[cfg(unix)]
fn stdout_for_stage(command: &crate::ast::Command, downstream_writer: Option<os_pipe::PipeWriter>) -> Result<Stdio, Error> {
    if let Some((path, append)) = &command.output_redirect {
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).mode(0o600);
        if *append {
            opts.append(true);
        } else {
            opts.truncate(true);
        }
        opts.open(path).map(Stdio::from).map_err(|e| Error::child(format!("{path}: {e}")))
    } else if let Some(writer) = downstream_writer {
        Ok(writer.into())
    } else {
        Ok(Stdio::inherit())
    }
}

/// Classify a failed `spawn()` the way a shell reports a bad command line:
/// a missing executable is "command not found", everything else keeps the
/// OS's own message.
#[cfg(unix)]
fn spawn_error(program: &str, e: &std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::child(format!("{program}: command not found"))
    } else {
        Error::child(format!("{program}: {e}"))
    }
}

/// Child-side setup run after fork, before exec: join the pipeline's
/// process group (or become its leader) and restore default dispositions
/// for the job-control signals the shell customized, so the exec'd program
/// behaves like any ordinary Unix process.
#[cfg(unix)]
fn join_pipeline_group(target_pgrp: Option<u32>) -> std::io::Result<()> {
    let target = target_pgrp.map(|p| p as libc::pid_t).unwrap_or(0);
    if unsafe { libc::setpgid(0, target) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for sig in [libc::SIGINT, libc::SIGQUIT, libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU] {
        unsafe { libc::signal(sig, libc::SIG_DFL) };
    }
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGCHLD);
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
    }
    Ok(())
}

/// Fork, wire redirections/pipes, and place every stage into a shared
/// process group. Leaves the pipeline unregistered; the caller decides
/// whether to insert it as foreground or background and does so before
/// waiting, so the job table never has a `jid`-less live pipeline visible
/// to `jobs`.
#[cfg(unix)]
fn fork_stages(registry: &mut PluginRegistry, pipeline: &mut Pipeline) -> Result<(), Error> {
    let _signal_guard = crate::job_control::ChildSignalBlock::new()?;

    let stage_count = pipeline.commands.len();
    let mut upstream: Option<os_pipe::PipeReader> = None;

    for i in 0..stage_count {
        let is_last = i + 1 == stage_count;
        let (downstream_reader, downstream_writer) = if is_last {
            (None, None)
        } else {
            let (r, w) = os_pipe::pipe().map_err(|e| Error::fatal(format!("pipe: {e}")))?;
            (Some(r), Some(w))
        };

        let stdin = stdin_for_stage(&pipeline.commands[i], upstream.take())?;
        let stdout = stdout_for_stage(&pipeline.commands[i], downstream_writer)?;

        let target_pgrp = pipeline.pgrp;
        let program = pipeline.commands[i].program().to_string();
        let mut cmd = std::process::Command::new(&program);
        cmd.args(&pipeline.commands[i].argv[1..]);
        cmd.stdin(stdin).stdout(stdout).stderr(Stdio::inherit());
        unsafe {
            cmd.pre_exec(move || join_pipeline_group(target_pgrp));
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                // Earlier stages are already running and piping into a
                // stage that will never exist; tear the partial pipeline
                // down rather than leaving it to run to a dangling pipe.
                if let Some(pgrp) = pipeline.pgrp {
                    let _ = crate::job_control::send_terminate_to_group(pgrp as libc::pid_t);
                }
                return Err(spawn_error(&program, &e));
            }
        };
        let pid = child.id();
        // We reap via our own raw `waitpid` calls (job control needs
        // WUNTRACED/WCONTINUED, which `std::process::Child` never exposes),
        // so the `Child` handle itself is just a pid carrier; dropping it
        // here does not reap or signal anything.
        drop(child);

        pipeline.commands[i].pid = Some(pid);
        if pipeline.pgrp.is_none() {
            pipeline.pgrp = Some(pid);
        }
        let pgrp = pipeline.pgrp.unwrap();
        crate::job_control::set_process_group(pid as libc::pid_t, pgrp as libc::pid_t)?;

        upstream = downstream_reader;
    }

    registry.pipeline_forked(pipeline);
    Ok(())
}

/// Up to N blocking waits restricted to the pipeline's pgrp. Stops early if
/// the reactor moves the pipeline out of foreground (it was stopped) or
/// removes it (it finished or was killed). Reused by the `fg` builtin,
/// which re-enters the wait after resuming a stopped pipeline.
///
/// When a member stops, snapshots the controlling terminal's attributes
/// into the pipeline's `saved_tty` (while the terminal is still owned by
/// the pipeline's process group) so `fg` can reapply them on resume.
#[cfg(unix)]
pub(crate) fn foreground_wait(
    jobs: &mut JobTable,
    registry: &mut PluginRegistry,
    jid: usize,
    pgrp: u32,
    stage_count: usize,
    tty_fd: Option<libc::c_int>,
) -> Result<Vec<String>, Error> {
    let mut messages = Vec::new();
    for _ in 0..stage_count {
        let (pid, event) = crate::job_control::wait_for_group_event(pgrp as libc::pid_t)?;
        messages.extend(react_to_status_change(jobs, registry, pid as u32, event));
        match jobs.get_mut(jid) {
            Some(p) if p.status == PipelineStatus::Foreground => continue,
            Some(p) if p.status == PipelineStatus::Stopped => {
                if let Some(fd) = tty_fd {
                    if let Ok(state) = crate::job_control::snapshot_terminal(fd) {
                        p.saved_tty = Some(state);
                    }
                }
                break;
            }
            _ => break,
        }
    }
    Ok(messages)
}

/// Launch a freshly parsed pipeline: fork every stage, register it in the
/// job table, and either print the background-launch line or perform the
/// foreground wait. Returns every user-visible line produced along the
/// way, for the REPL driver to print.
#[cfg(unix)]
pub fn launch_pipeline(jobs: &mut JobTable, registry: &mut PluginRegistry, tty_fd: Option<libc::c_int>, mut pipeline: Pipeline) -> Result<Vec<String>, Error> {
    let bg_requested = pipeline.bg_requested;
    let stage_count = pipeline.commands.len();

    fork_stages(registry, &mut pipeline)?;

    let pgrp = pipeline.pgrp.expect("at least one command was forked");
    let mut messages = Vec::new();

    if bg_requested {
        let last_pid = pipeline.last_command().pid.expect("last command was forked");
        let jid = jobs.insert(pipeline);
        messages.push(format!("[{jid}] {last_pid}\n"));
    } else {
        if let Some(fd) = tty_fd {
            crate::job_control::give_terminal_to(fd, pgrp as libc::pid_t, None)?;
        }
        let jid = jobs.insert(pipeline);
        messages.extend(foreground_wait(jobs, registry, jid, pgrp, stage_count, tty_fd)?);
        if let Some(fd) = tty_fd {
            let shell_pgrp = unsafe { libc::getpgrp() };
            crate::job_control::give_terminal_to(fd, shell_pgrp, None)?;
        }
    }

    Ok(messages)
}

#[cfg(not(unix))]
pub fn launch_pipeline(_jobs: &mut JobTable, _registry: &mut PluginRegistry, _tty_fd: Option<i32>, pipeline: Pipeline) -> Result<Vec<String>, Error> {
    // Job control is inherently POSIX; on other targets run stages
    // sequentially (via ordinary pipes) without process-group semantics.
    let mut previous_stdout: Option<std::process::ChildStdout> = None;
    let stage_count = pipeline.commands.len();
    for (i, command) in pipeline.commands.into_iter().enumerate() {
        let mut cmd = std::process::Command::new(command.program());
        cmd.args(&command.argv[1..]);
        if let Some(stdout) = previous_stdout.take() {
            cmd.stdin(Stdio::from(stdout));
        }
        if i + 1 < stage_count {
            cmd.stdout(Stdio::piped());
        }
        let mut child = cmd.spawn().map_err(|e| Error::fatal(e.to_string()))?;
        previous_stdout = child.stdout.take();
        child.wait().map_err(|e| Error::fatal(e.to_string()))?;
    }
    Ok(Vec::new())
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::ast::Command;

    #[test]
    fn single_stage_foreground_pipeline_runs_and_is_reaped() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let pipeline = Pipeline::new(vec![Command::new(vec!["true".to_string()])], false);

        let messages = launch_pipeline(&mut jobs, &mut registry, None, pipeline).unwrap();
        assert!(messages.is_empty());
        assert!(jobs.is_empty());
    }

    #[test]
    fn background_pipeline_prints_launch_line_and_stays_in_table_until_reaped() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let pipeline = Pipeline::new(vec![Command::new(vec!["sleep".to_string(), "0.2".to_string()])], true);

        let messages = launch_pipeline(&mut jobs, &mut registry, None, pipeline).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("[1] "));
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn pipeline_with_redirected_output_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");

        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let mut command = Command::new(vec!["echo".to_string(), "hello".to_string()]);
        command.output_redirect = Some((out_path.to_string_lossy().into_owned(), false));
        let pipeline = Pipeline::new(vec![command], false);

        launch_pipeline(&mut jobs, &mut registry, None, pipeline).unwrap();
        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(contents.trim(), "hello");
    }

    #[test]
    fn two_stage_pipeline_connects_stdout_to_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("piped.txt");

        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let first = Command::new(vec!["echo".to_string(), "hello".to_string()]);
        let mut second = Command::new(vec!["tr".to_string(), "a-z".to_string(), "A-Z".to_string()]);
        second.output_redirect = Some((out_path.to_string_lossy().into_owned(), false));
        let pipeline = Pipeline::new(vec![first, second], false);

        launch_pipeline(&mut jobs, &mut registry, None, pipeline).unwrap();
        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(contents.trim(), "HELLO");
    }

    #[test]
    fn missing_program_is_a_child_error_not_a_fatal_one() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let pipeline = Pipeline::new(vec![Command::new(vec!["nosuchcommand123".to_string()])], false);

        let err = launch_pipeline(&mut jobs, &mut registry, None, pipeline).unwrap_err();
        assert!(matches!(err, Error::Child(_)));
        assert!(err.to_string().contains("command not found"));
        assert!(jobs.is_empty());
    }

    #[test]
    fn unreadable_input_redirect_is_a_child_error() {
        let mut jobs = JobTable::new();
        let mut registry = PluginRegistry::new();
        let mut command = Command::new(vec!["cat".to_string()]);
        command.input_redirect = Some("/no/such/path/for/esh/tests".to_string());
        let pipeline = Pipeline::new(vec![command], false);

        let err = launch_pipeline(&mut jobs, &mut registry, None, pipeline).unwrap_err();
        assert!(matches!(err, Error::Child(_)));
    }
}
