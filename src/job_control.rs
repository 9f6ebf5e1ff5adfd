//! Terminal arbiter and signal hub.
//!
//! Low-level Unix primitives: process-group assignment, controlling
//! terminal handoff, terminal-attribute snapshot/restore, and the
//! self-pipe that turns `SIGCHLD` into an event the REPL loop can poll for
//! instead of reacting from signal context. `setpgid`/`tcsetpgrp`/`waitpid`
//! calls are wrapped in EINTR-retrying loops throughout; the self-pipe adds
//! real `termios` snapshot/restore on top of that.

#[cfg(unix)]
use std::io::{self, Read, Write};
#[cfg(unix)]
use std::os::unix::io::{FromRawFd, RawFd};
#[cfg(unix)]
use std::sync::atomic::{AtomicI32, Ordering};

/// A decoded `waitpid` status, independent of whether it came from the
/// blocking Foreground Wait or the non-blocking async reap.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    /// Normal exit, carrying the exit code.
    Exited(i32),
    /// Killed by a signal; carries `128 + signal` per shell convention.
    Signalled(i32),
    /// Stopped by a stop signal (e.g. `SIGTSTP`, `SIGSTOP`).
    Stopped,
    /// Resumed after being stopped (`SIGCONT`).
    Continued,
}

#[cfg(unix)]
fn classify(raw_status: libc::c_int) -> Option<ChildEvent> {
    if unsafe { libc::WIFEXITED(raw_status) } {
        Some(ChildEvent::Exited(unsafe { libc::WEXITSTATUS(raw_status) }))
    } else if unsafe { libc::WIFSIGNALED(raw_status) } {
        Some(ChildEvent::Signalled(128 + unsafe { libc::WTERMSIG(raw_status) }))
    } else if unsafe { libc::WIFSTOPPED(raw_status) } {
        Some(ChildEvent::Stopped)
    } else if unsafe { libc::WIFCONTINUED(raw_status) } {
        Some(ChildEvent::Continued)
    } else {
        None
    }
}

#[cfg(unix)]
pub fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; caller can proceed with best-effort behavior.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

#[cfg(unix)]
fn send_signal_to_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid process group id"));
    }
    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

#[cfg(unix)]
pub fn send_continue_to_group(pgid: libc::pid_t) -> io::Result<()> {
    send_signal_to_group(pgid, libc::SIGCONT)
}

#[cfg(unix)]
pub fn send_terminate_to_group(pgid: libc::pid_t) -> io::Result<()> {
    send_signal_to_group(pgid, libc::SIGTERM)
}

#[cfg(unix)]
pub fn send_stop_to_group(pgid: libc::pid_t) -> io::Result<()> {
    send_signal_to_group(pgid, libc::SIGSTOP)
}

// ── Terminal attribute snapshot/restore ────────────────────────────────────

/// A snapshot of `libc::termios` for the shell's controlling terminal,
/// captured when a pipeline relinquishes the terminal while stopped and
/// reapplied when it is continued.
#[cfg(unix)]
#[derive(Clone)]
pub struct TerminalState(libc::termios);

#[cfg(unix)]
impl std::fmt::Debug for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TerminalState(..)")
    }
}

#[cfg(unix)]
pub fn snapshot_terminal(fd: libc::c_int) -> io::Result<TerminalState> {
    let mut raw: libc::termios = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::tcgetattr(fd, &mut raw) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(TerminalState(raw))
}

#[cfg(unix)]
pub fn restore_terminal(fd: libc::c_int, state: &TerminalState) -> io::Result<()> {
    let rc = unsafe { libc::tcsetattr(fd, libc::TCSADRAIN, &state.0) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// ── Controlling-terminal handoff ───────────────────────────────────────────

#[cfg(unix)]
fn set_terminal_foreground(fd: libc::c_int, pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid process group id"));
    }

    // Block SIGTTOU for the duration of the call: the shell itself is in
    // the background relative to the terminal while a foreground pipeline
    // owns it, and tcsetpgrp() from a background process group would
    // otherwise stop the shell.
    let _guard = SignalBlockGuard::block(libc::SIGTTOU)?;
    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Give the controlling terminal to process group `pgrp`, optionally
/// reapplying a saved `termios` snapshot afterwards.
///
/// Failure here is fatal: the shell cannot proceed without clear ownership
/// of the terminal.
#[cfg(unix)]
pub fn give_terminal_to(fd: libc::c_int, pgrp: libc::pid_t, restore_state: Option<&TerminalState>) -> io::Result<()> {
    set_terminal_foreground(fd, pgrp)?;
    if let Some(state) = restore_state {
        restore_terminal(fd, state)?;
    }
    Ok(())
}

/// RAII guard: hands the terminal to `target_pgid` on construction, and
/// returns it to the shell's own process group on drop.
#[cfg(unix)]
pub struct ForegroundTerminalGuard {
    tty_fd: Option<libc::c_int>,
    shell_pgid: libc::pid_t,
}

#[cfg(unix)]
impl ForegroundTerminalGuard {
    pub fn new(tty_fd: Option<libc::c_int>, target_pgid: libc::pid_t, restore_state: Option<&TerminalState>) -> io::Result<Self> {
        let shell_pgid = unsafe { libc::getpgrp() };
        if let Some(fd) = tty_fd {
            give_terminal_to(fd, target_pgid, restore_state)?;
        }
        Ok(Self { tty_fd, shell_pgid })
    }
}

#[cfg(unix)]
impl Drop for ForegroundTerminalGuard {
    fn drop(&mut self) {
        if let Some(fd) = self.tty_fd {
            let _ = give_terminal_to(fd, self.shell_pgid, None);
        }
    }
}

// ── waitpid wrappers ────────────────────────────────────────────────────────

/// `waitpid(-pgid, ..., WUNTRACED)`: wait for any member of `pgid` to stop
/// or exit. Used by the foreground wait across an entire pipeline's process
/// group; continued events are irrelevant here since a pipeline the shell
/// just launched into the foreground cannot already be stopped.
#[cfg(unix)]
pub fn wait_for_group_event(pgid: libc::pid_t) -> io::Result<(libc::pid_t, ChildEvent)> {
    let mut raw_status: libc::c_int = 0;
    loop {
        let pid = unsafe { libc::waitpid(-pgid, &mut raw_status, libc::WUNTRACED) };
        if pid < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        if let Some(event) = classify(raw_status) {
            return Ok((pid, event));
        }
    }
}

/// Non-blocking drain of every currently reapable child across the whole
/// process (`waitpid(-1, WNOHANG | WUNTRACED | WCONTINUED)`), used by the
/// async reap triggered by the `SIGCHLD` self-pipe.
#[cfg(unix)]
pub fn reap_available() -> io::Result<Vec<(libc::pid_t, ChildEvent)>> {
    let mut events = Vec::new();
    loop {
        let mut raw_status: libc::c_int = 0;
        let pid = unsafe {
            libc::waitpid(
                -1,
                &mut raw_status,
                libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED,
            )
        };
        if pid == 0 {
            break; // nothing left to reap right now
        }
        if pid < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code) if code == libc::EINTR => continue,
                // ECHILD: no children left at all, not an error worth surfacing.
                Some(code) if code == libc::ECHILD => break,
                _ => return Err(err),
            }
        }
        if let Some(event) = classify(raw_status) {
            events.push((pid, event));
        }
    }
    Ok(events)
}

// ── Signal blocking (critical-section bracket around launch bookkeeping) ──

#[cfg(unix)]
pub fn block(signal: libc::c_int) -> io::Result<()> {
    sigprocmask(libc::SIG_BLOCK, signal)
}

#[cfg(unix)]
pub fn unblock(signal: libc::c_int) -> io::Result<()> {
    sigprocmask(libc::SIG_UNBLOCK, signal)
}

#[cfg(unix)]
fn sigprocmask(how: libc::c_int, signal: libc::c_int) -> io::Result<()> {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, signal);
        if libc::pthread_sigmask(how, &set, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// RAII: blocks a signal until dropped. Used where the existing `block`/
/// `unblock` pair would otherwise need a manual early-return-safe bracket.
#[cfg(unix)]
struct SignalBlockGuard {
    signal: libc::c_int,
}

#[cfg(unix)]
impl SignalBlockGuard {
    fn block(signal: libc::c_int) -> io::Result<Self> {
        block(signal)?;
        Ok(Self { signal })
    }
}

#[cfg(unix)]
impl Drop for SignalBlockGuard {
    fn drop(&mut self) {
        let _ = unblock(self.signal);
    }
}

/// A critical-section bracket around pipeline-launch bookkeeping: blocks
/// `SIGCHLD` on construction and unblocks it on drop, even if the launch
/// returns early on error.
#[cfg(unix)]
pub struct ChildSignalBlock(SignalBlockGuard);

#[cfg(unix)]
impl ChildSignalBlock {
    pub fn new() -> io::Result<Self> {
        Ok(Self(SignalBlockGuard::block(libc::SIGCHLD)?))
    }
}

// ── Self-pipe: SIGCHLD -> pollable byte stream ─────────────────────────────

#[cfg(unix)]
static SIGCHLD_PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// Async-signal-safe `SIGCHLD` handler: writes one byte to the self-pipe.
/// Only `write()` (and reading the atomic) is used, both signal-safe.
#[cfg(unix)]
extern "C" fn sigchld_relay(_sig: libc::c_int) {
    let fd = SIGCHLD_PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte: [u8; 1] = [0];
        unsafe {
            libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
        }
    }
}

/// Cosmetic `SIGTSTP` handler: erases the terminal's own `^Z` echo. Does
/// not touch job state — the kernel delivers the actual stop to the
/// foreground process group, never to the shell.
#[cfg(unix)]
extern "C" fn sigtstp_echo_erase(_sig: libc::c_int) {
    let erase = b"\x08\x08  \x08\x08";
    unsafe {
        libc::write(libc::STDOUT_FILENO, erase.as_ptr() as *const libc::c_void, erase.len());
    }
}

#[cfg(unix)]
fn install_handler(signal: libc::c_int, handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Owns the read end of the `SIGCHLD` self-pipe and installs both the
/// `SIGCHLD` relay and the `SIGTSTP` echo-erase handler.
#[cfg(unix)]
pub struct SignalHub {
    read_fd: RawFd,
}

#[cfg(unix)]
impl SignalHub {
    /// Install handlers and open the self-pipe. Must be called once, before
    /// any child is forked.
    pub fn install() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let [read_fd, write_fd] = fds;

        // Non-blocking write end: a handler that can't write (pipe full)
        // must never block inside signal context.
        let flags = unsafe { libc::fcntl(write_fd, libc::F_GETFL) };
        unsafe { libc::fcntl(write_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };

        SIGCHLD_PIPE_WRITE_FD.store(write_fd, Ordering::Relaxed);
        install_handler(libc::SIGCHLD, sigchld_relay)?;
        install_handler(libc::SIGTSTP, sigtstp_echo_erase)?;

        Ok(Self { read_fd })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    /// Drain every pending notification byte without blocking. Call after a
    /// poll indicates the self-pipe is readable, before re-checking the job
    /// table.
    pub fn drain(&self) {
        let mut file = unsafe { std::fs::File::from_raw_fd(self.read_fd) };
        let mut buf = [0u8; 256];
        loop {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        std::mem::forget(file); // we don't own read_fd's lifetime via File
    }
}

#[cfg(unix)]
impl Drop for SignalHub {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
        }
    }
}

// ── Non-Unix stand-ins ──────────────────────────────────────────────────────
//
// The job-control engine this crate implements is inherently POSIX (process
// groups, tcsetpgrp, WUNTRACED); on non-Unix targets the shell still builds
// and runs commands, just without job control. These stubs keep the rest of
// the crate's `#[cfg(unix)]` boundaries narrow.

#[cfg(not(unix))]
pub struct SignalHub;

#[cfg(not(unix))]
impl SignalHub {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self)
    }
    pub fn drain(&self) {}
}
