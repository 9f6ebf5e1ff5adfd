//! REPL driver and CLI entry point.
//!
//! Ties every other component together: read a line, let plugins mutate
//! it, parse, run a built-in or launch a pipeline, and on foreground jobs
//! wait synchronously. The async child-reaper is realized by draining the
//! `SIGCHLD` self-pipe once per loop iteration rather than mid-read, since
//! a reaped background job only ever needs to surface on the next prompt.

mod ast;
mod builtins;
mod editor;
mod error;
mod executor;
mod job_control;
mod jobs;
mod logging;
mod parser;
mod plugin;
mod redirect;
mod status;

use std::io::IsTerminal;
use std::path::PathBuf;

use error::Error;
use jobs::JobTable;
use plugin::{PluginRegistry, ShellApi};

fn main() {
    logging::init();

    let mut plugin_dirs = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-p" => match args.next() {
                Some(dir) => plugin_dirs.push(PathBuf::from(dir)),
                None => {
                    eprintln!("esh: -p requires a directory argument");
                    std::process::exit(1);
                }
            },
            other => {
                eprintln!("esh: unrecognized argument '{other}'");
                std::process::exit(1);
            }
        }
    }

    if let Err(err) = run(plugin_dirs) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("usage: esh [-h] [-p <plugindir>]");
}

#[cfg(unix)]
fn run(plugin_dirs: Vec<PathBuf>) -> Result<(), Error> {
    let tty_fd = if std::io::stdin().is_terminal() {
        Some(libc::STDIN_FILENO)
    } else {
        None
    };

    if let Some(fd) = tty_fd {
        let shell_pid = unsafe { libc::getpid() };
        job_control::set_process_group(shell_pid, shell_pid)?;
        job_control::give_terminal_to(fd, shell_pid, None)?;
    }

    // The shell must never be stopped or suspended by the signals it relies
    // on delivering to foreground children.
    for sig in [libc::SIGINT, libc::SIGQUIT, libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU] {
        unsafe { libc::signal(sig, libc::SIG_IGN) };
    }

    let signal_hub = job_control::SignalHub::install()?;

    let mut jobs = JobTable::new();
    let mut registry = PluginRegistry::new();
    for dir in &plugin_dirs {
        let shell_api = ShellApi::new(&jobs);
        registry.load_dir(dir, &shell_api);
    }

    loop {
        drain_reaped_children(&mut jobs, &mut registry, &signal_hub);

        let prompt = registry.make_prompt("esh> ");
        let Some(mut line) = editor::read_line(&prompt) else {
            break;
        };
        registry.process_raw_cmdline(&mut line);

        let command_line = match parser::parse_command_line(&line) {
            Ok(Some(cline)) if !cline.is_empty() => cline,
            Ok(_) => continue,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };

        if command_line.pipelines.len() > 1 {
            tracing::debug!(
                dropped = command_line.pipelines.len() - 1,
                "discarding extra pipelines after the first on this line"
            );
        }
        let mut pipeline = command_line.pipelines.into_iter().next().unwrap();
        registry.process_pipeline(&mut pipeline);

        let argv = pipeline.commands.first().map(|c| c.argv.clone()).unwrap_or_default();
        if registry.process_builtin(&argv) {
            continue;
        }

        let result = match builtins::dispatch(&mut jobs, &mut registry, tty_fd, &argv) {
            Some(result) => result,
            None => executor::launch_pipeline(&mut jobs, &mut registry, tty_fd, pipeline),
        };
        // Fatal means the shell itself can no longer be trusted to manage
        // job control (a setpgid/tcsetpgrp/kill call on its own process
        // group failed); propagate out of the loop instead of printing and
        // carrying on like an ordinary per-command error.
        match result {
            Err(err @ Error::Fatal(_)) => return Err(err),
            other => print_result(other),
        }
    }

    Ok(())
}

#[cfg(unix)]
fn drain_reaped_children(jobs: &mut JobTable, registry: &mut PluginRegistry, signal_hub: &job_control::SignalHub) {
    signal_hub.drain();
    match job_control::reap_available() {
        Ok(events) => {
            for (pid, event) in events {
                for line in status::react_to_status_change(jobs, registry, pid as u32, event) {
                    print!("{line}");
                }
            }
        }
        Err(err) => tracing::warn!(%err, "failed to reap children"),
    }
}

fn print_result(result: Result<Vec<String>, Error>) {
    match result {
        Ok(lines) => {
            for line in lines {
                print!("{line}");
            }
        }
        Err(Error::User(message)) => eprintln!("{message}"),
        Err(err) => eprintln!("{err}"),
    }
}

#[cfg(not(unix))]
fn run(_plugin_dirs: Vec<PathBuf>) -> Result<(), Error> {
    let mut jobs = JobTable::new();
    let mut registry = PluginRegistry::new();
    loop {
        let Some(line) = editor::read_line("esh> ") else {
            break;
        };
        let command_line = match parser::parse_command_line(&line) {
            Ok(Some(cline)) if !cline.is_empty() => cline,
            Ok(_) => continue,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        let pipeline = command_line.pipelines.into_iter().next().unwrap();
        if pipeline.commands.first().map(|c| c.program()) == Some("exit") {
            break;
        }
        let result = executor::launch_pipeline(&mut jobs, &mut registry, None, pipeline);
        print_result(result);
    }
    Ok(())
}
