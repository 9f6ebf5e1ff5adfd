//! Typed error categories.
//!
//! A small, closed error enum rather than a message-string convention: call
//! sites match on `Error::Fatal`/`Error::User`/etc. instead of inspecting
//! text.

use thiserror::Error;

/// Fatal, per-child, user-facing, and plugin error categories. `Plugin` is
/// for init failures that merely drop a plugin from the registry rather
/// than propagating.
#[derive(Debug, Error)]
pub enum Error {
    /// A system call the shell cannot proceed without (fork, setpgid,
    /// tcsetpgrp, kill) failed. The caller should print this and abort the
    /// process.
    #[error("esh: fatal: {0}")]
    Fatal(String),

    /// A single pipeline stage failed to launch (unknown command, unreadable
    /// redirection target) or ran and exited non-zero. Scoped to that one
    /// command line; the REPL prints it and keeps going.
    #[error("esh: {0}")]
    Child(String),

    /// A one-line, REPL-continues user error: malformed command line,
    /// unknown job id, bad builtin arguments.
    #[error("{0}")]
    User(String),

    /// A plugin failed to initialize or load; the plugin is dropped from
    /// the registry and the shell continues.
    #[error("esh: plugin error: {0}")]
    Plugin(String),
}

impl Error {
    pub fn fatal(message: impl Into<String>) -> Self {
        Error::Fatal(message.into())
    }

    pub fn user(message: impl Into<String>) -> Self {
        Error::User(message.into())
    }

    pub fn child(message: impl Into<String>) -> Self {
        Error::Child(message.into())
    }

    pub fn plugin(message: impl Into<String>) -> Self {
        Error::Plugin(message.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Fatal(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
