//! Core data model: the types the parser produces and the job table tracks.
//!
//! A single `Pipeline` value is reused both as the parser's output and, once
//! launched, as the job table's entry — there is no separate "parsed" vs.
//! "runtime" pipeline type.

#[cfg(unix)]
use crate::job_control::TerminalState;

/// A single program invocation within a pipeline.
#[derive(Debug, Clone)]
pub struct Command {
    /// `argv[0]` is the program name; the rest are its arguments.
    pub argv: Vec<String>,
    /// `< path`, if present.
    pub input_redirect: Option<String>,
    /// `(path, append)` from `> path` (append=false) or `>> path` (append=true).
    pub output_redirect: Option<(String, bool)>,
    /// Filled in by the launcher once this command has been forked.
    pub pid: Option<u32>,
}

impl Command {
    pub fn new(argv: Vec<String>) -> Self {
        Command {
            argv,
            input_redirect: None,
            output_redirect: None,
            pid: None,
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// Render as `prog arg1 arg2` — used for job-table status lines.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Lifecycle state of a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    Foreground,
    Background,
    Stopped,
    /// Carries the process's exit code (or `128 + signal` for a signalled
    /// death) for the instant between reacting to the terminal event and
    /// removing the pipeline from the job table.
    Done(i32),
}

impl PipelineStatus {
    /// The word used in `jobs` / status-change output lines.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStatus::Foreground | PipelineStatus::Background => "Running",
            PipelineStatus::Stopped => "Stopped",
            PipelineStatus::Done(_) => "Done",
        }
    }
}

/// An ordered chain of [`Command`]s sharing one process group.
#[derive(Debug)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    /// Set once inserted into the job table; `0` beforehand.
    pub jid: usize,
    /// Process-group id, equal to the pid of the first forked command.
    pub pgrp: Option<u32>,
    pub status: PipelineStatus,
    /// Copied from the parser's "&" suffix; promoted to `true` whenever a
    /// member stops, so a later completion is reported instead of silent.
    pub bg_requested: bool,
    /// Terminal attributes captured the last time this pipeline relinquished
    /// the controlling terminal while stopped; reapplied on resume.
    #[cfg(unix)]
    pub saved_tty: Option<TerminalState>,
}

impl Pipeline {
    pub fn new(commands: Vec<Command>, bg_requested: bool) -> Self {
        Pipeline {
            commands,
            jid: 0,
            pgrp: None,
            status: if bg_requested {
                PipelineStatus::Background
            } else {
                PipelineStatus::Foreground
            },
            bg_requested,
            #[cfg(unix)]
            saved_tty: None,
        }
    }

    pub fn last_command(&self) -> &Command {
        self.commands.last().expect("pipeline has at least one command")
    }

    pub fn contains_pid(&self, pid: u32) -> bool {
        self.commands.iter().any(|c| c.pid == Some(pid))
    }

    pub fn is_last_command(&self, pid: u32) -> bool {
        self.last_command().pid == Some(pid)
    }

    /// Render as `cmd1 arg | cmd2 arg` for status/jobs output.
    pub fn display(&self) -> String {
        self.commands
            .iter()
            .map(Command::display)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// A batch of one or more [`Pipeline`]s produced by a single parse.
///
/// Only the first pipeline is ever launched; additional pipelines are
/// discarded by the caller.
#[derive(Debug, Default)]
pub struct CommandLine {
    pub pipelines: Vec<Pipeline>,
}

impl CommandLine {
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
