//! Built-in command dispatcher: the job-control verbs (`exit`, `jobs`,
//! `fg`, `bg`, `kill`, `stop`) plus ambient builtins an external process
//! could never implement on the shell's behalf (`cd`, `pwd`, `echo`,
//! `export`, `unset`, `type`). The ambient verbs never touch job-control
//! state and always run in the foreground.

use crate::ast::PipelineStatus;
use crate::error::Error;
use crate::jobs::JobTable;
use crate::plugin::PluginRegistry;

const JOB_CONTROL_VERBS: &[&str] = &["exit", "jobs", "fg", "bg", "kill", "stop"];
const AMBIENT_VERBS: &[&str] = &["cd", "pwd", "echo", "export", "unset", "type"];

pub fn is_builtin(name: &str) -> bool {
    JOB_CONTROL_VERBS.contains(&name) || AMBIENT_VERBS.contains(&name)
}

/// Resolve a `fg`/`bg`/`kill`/`stop` argument (`%3`, `3`, or absent) to a
/// job id, defaulting to the most-recently-inserted pipeline when no
/// argument is given. Both `%3` and `3` select jid 3.
fn resolve_jid(jobs: &JobTable, arg: Option<&str>) -> Result<usize, Error> {
    match arg {
        None => jobs
            .most_recent_jid()
            .ok_or_else(|| Error::user("esh: no current job")),
        Some(raw) => {
            let digits = raw.strip_prefix('%').unwrap_or(raw);
            digits
                .parse::<usize>()
                .map_err(|_| Error::user(format!("esh: {raw}: invalid job id")))
        }
    }
}

fn no_such_job(jid: usize) -> Error {
    Error::user(format!("No job with job id {jid} found"))
}

/// Execute a built-in verb. Returns `None` if `argv[0]` isn't a built-in at
/// all, so the caller falls through to the Pipeline Launcher.
#[cfg(unix)]
pub fn dispatch(
    jobs: &mut JobTable,
    registry: &mut PluginRegistry,
    tty_fd: Option<libc::c_int>,
    argv: &[String],
) -> Option<Result<Vec<String>, Error>> {
    let verb = argv.first()?.as_str();
    if !is_builtin(verb) {
        return None;
    }
    let args = &argv[1..];
    Some(run(jobs, registry, tty_fd, verb, args))
}

#[cfg(unix)]
fn run(
    jobs: &mut JobTable,
    registry: &mut PluginRegistry,
    tty_fd: Option<libc::c_int>,
    verb: &str,
    args: &[String],
) -> Result<Vec<String>, Error> {
    match verb {
        "exit" => std::process::exit(0),
        "jobs" => Ok(list_jobs(jobs)),
        "fg" => fg(jobs, registry, tty_fd, args.first().map(String::as_str)),
        "bg" => bg(jobs, args.first().map(String::as_str)),
        "kill" => send_to_job(jobs, args.first().map(String::as_str), crate::job_control::send_terminate_to_group),
        "stop" => send_to_job(jobs, args.first().map(String::as_str), crate::job_control::send_stop_to_group),
        "cd" => cd(args.first().map(String::as_str)),
        "pwd" => pwd(),
        "echo" => Ok(vec![format!("{}\n", args.join(" "))]),
        "export" => export(args),
        "unset" => unset(args),
        "type" => type_of(args.first().map(String::as_str)),
        _ => unreachable!("is_builtin/run verb lists are out of sync"),
    }
}

fn list_jobs(jobs: &JobTable) -> Vec<String> {
    jobs.iter()
        .map(|p| format!("[{}]   {:<15} ({})\n", p.jid, p.status.label(), p.display()))
        .collect()
}

#[cfg(unix)]
fn fg(jobs: &mut JobTable, registry: &mut PluginRegistry, tty_fd: Option<libc::c_int>, arg: Option<&str>) -> Result<Vec<String>, Error> {
    let jid = resolve_jid(jobs, arg)?;
    let (pgrp, stage_count, text) = {
        let pipeline = jobs.get_mut(jid).ok_or_else(|| no_such_job(jid))?;
        pipeline.status = PipelineStatus::Foreground;
        (pipeline.pgrp.expect("live job has a pgrp"), pipeline.commands.len(), pipeline.display())
    };

    crate::job_control::send_continue_to_group(pgrp as libc::pid_t)?;
    if let Some(fd) = tty_fd {
        let saved = jobs.get(jid).and_then(|p| p.saved_tty.clone());
        crate::job_control::give_terminal_to(fd, pgrp as libc::pid_t, saved.as_ref())?;
    }

    let mut messages = vec![format!("({text})\n")];
    messages.extend(crate::executor::foreground_wait(jobs, registry, jid, pgrp, stage_count, tty_fd)?);

    if let Some(fd) = tty_fd {
        let shell_pgrp = unsafe { libc::getpgrp() };
        crate::job_control::give_terminal_to(fd, shell_pgrp, None)?;
    }
    Ok(messages)
}

#[cfg(unix)]
fn bg(jobs: &mut JobTable, arg: Option<&str>) -> Result<Vec<String>, Error> {
    let jid = resolve_jid(jobs, arg)?;
    let (pgrp, text) = {
        let pipeline = jobs.get_mut(jid).ok_or_else(|| no_such_job(jid))?;
        pipeline.status = PipelineStatus::Background;
        pipeline.bg_requested = true;
        (pipeline.pgrp.expect("live job has a pgrp"), pipeline.display())
    };
    crate::job_control::send_continue_to_group(pgrp as libc::pid_t)?;
    Ok(vec![format!("[{jid}] ({text})\n")])
}

#[cfg(unix)]
fn send_to_job(jobs: &mut JobTable, arg: Option<&str>, send: fn(libc::pid_t) -> std::io::Result<()>) -> Result<Vec<String>, Error> {
    let jid = resolve_jid(jobs, arg)?;
    let pgrp = jobs.get(jid).ok_or_else(|| no_such_job(jid))?.pgrp.expect("live job has a pgrp");
    send(pgrp as libc::pid_t)?;
    Ok(Vec::new())
}

fn cd(arg: Option<&str>) -> Result<Vec<String>, Error> {
    let target = match arg {
        Some("-") => std::env::var("OLDPWD").map_err(|_| Error::user("esh: cd: OLDPWD not set"))?,
        Some(path) => path.to_string(),
        None => std::env::var("HOME").map_err(|_| Error::user("esh: cd: HOME not set"))?,
    };
    let previous = std::env::current_dir().map_err(|e| Error::user(format!("esh: cd: {e}")))?;
    std::env::set_current_dir(&target).map_err(|e| Error::user(format!("esh: cd: {target}: {e}")))?;
    // SAFETY: single-threaded REPL; no concurrent env access.
    unsafe { std::env::set_var("OLDPWD", &previous) };
    Ok(Vec::new())
}

fn pwd() -> Result<Vec<String>, Error> {
    let dir = std::env::current_dir().map_err(|e| Error::user(format!("esh: pwd: {e}")))?;
    Ok(vec![format!("{}\n", dir.display())])
}

fn export(args: &[String]) -> Result<Vec<String>, Error> {
    for arg in args {
        if let Some((name, value)) = arg.split_once('=') {
            unsafe { std::env::set_var(name, value) };
        }
    }
    Ok(Vec::new())
}

fn unset(args: &[String]) -> Result<Vec<String>, Error> {
    for name in args {
        unsafe { std::env::remove_var(name) };
    }
    Ok(Vec::new())
}

fn type_of(arg: Option<&str>) -> Result<Vec<String>, Error> {
    let name = arg.ok_or_else(|| Error::user("esh: type: usage: type NAME"))?;
    if is_builtin(name) {
        return Ok(vec![format!("{name} is a shell builtin\n")]);
    }
    if let Some(path) = find_in_path(name) {
        return Ok(vec![format!("{name} is {}\n", path.display())]);
    }
    Err(Error::user(format!("esh: type: {name}: not found")))
}

fn find_in_path(name: &str) -> Option<std::path::PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(name)).find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_builtin_covers_job_control_and_ambient_verbs() {
        for verb in ["exit", "jobs", "fg", "bg", "kill", "stop", "cd", "pwd", "echo", "export", "unset", "type"] {
            assert!(is_builtin(verb), "{verb} should be recognized as a builtin");
        }
        assert!(!is_builtin("sleep"));
    }

    #[test]
    fn resolve_jid_accepts_percent_and_bare_forms() {
        let mut jobs = JobTable::new();
        let jid = jobs.insert(crate::ast::Pipeline::new(vec![crate::ast::Command::new(vec!["a".into()])], false));
        assert_eq!(resolve_jid(&jobs, Some(&format!("%{jid}"))).unwrap(), jid);
        assert_eq!(resolve_jid(&jobs, Some(&jid.to_string())).unwrap(), jid);
    }

    #[test]
    fn resolve_jid_defaults_to_most_recent() {
        let mut jobs = JobTable::new();
        jobs.insert(crate::ast::Pipeline::new(vec![crate::ast::Command::new(vec!["a".into()])], false));
        let second = jobs.insert(crate::ast::Pipeline::new(vec![crate::ast::Command::new(vec!["b".into()])], false));
        assert_eq!(resolve_jid(&jobs, None).unwrap(), second);
    }

    #[test]
    fn missing_job_message_has_no_baked_in_newline() {
        // The caller adds the trailing newline when printing; the message
        // text itself carries none.
        let err = no_such_job(99);
        assert_eq!(err.to_string(), "No job with job id 99 found");
    }

    #[test]
    fn list_jobs_preserves_insertion_order() {
        let mut jobs = JobTable::new();
        jobs.insert(crate::ast::Pipeline::new(vec![crate::ast::Command::new(vec!["a".into()])], false));
        jobs.insert(crate::ast::Pipeline::new(vec![crate::ast::Command::new(vec!["b".into()])], true));
        let lines = list_jobs(&jobs);
        assert!(lines[0].starts_with("[1]"));
        assert!(lines[1].starts_with("[2]"));
    }
}
