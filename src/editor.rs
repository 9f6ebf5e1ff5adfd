//! Line reader. Kept narrow — basic Emacs-style editing plus a per-session
//! history ring, no expansion features. The contract is just "produce the
//! next line (or end-of-file) given an optional prompt string." Raw-mode
//! handling via `crossterm`.

use std::io::{self, IsTerminal, Write};

use crossterm::cursor;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, ClearType};
use crossterm::{queue, style};

/// In-session command history, most recent last. No persistence to disk,
/// and no `!!`-style expansion — plain up/down browsing is just editor
/// ergonomics, not a shell feature.
#[derive(Default)]
struct History {
    entries: Vec<String>,
    cursor: Option<usize>,
}

impl History {
    fn push(&mut self, line: &str) {
        if !line.is_empty() && self.entries.last().map(String::as_str) != Some(line) {
            self.entries.push(line.to_string());
        }
        self.cursor = None;
    }

    fn previous(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = match self.cursor {
            Some(0) => 0,
            Some(i) => i - 1,
            None => self.entries.len() - 1,
        };
        self.cursor = Some(idx);
        Some(&self.entries[idx])
    }

    fn next(&mut self) -> Option<&str> {
        let idx = self.cursor?;
        if idx + 1 < self.entries.len() {
            self.cursor = Some(idx + 1);
            Some(&self.entries[idx + 1])
        } else {
            self.cursor = None;
            None
        }
    }
}

thread_local! {
    static HISTORY: std::cell::RefCell<History> = std::cell::RefCell::new(History::default());
}

/// Produce the next line given an optional prompt, or `None` on
/// end-of-file (Ctrl-D on an empty line, or stdin closed).
pub fn read_line(prompt: &str) -> Option<String> {
    if io::stdin().is_terminal() {
        read_line_interactive(prompt)
    } else {
        read_line_piped()
    }
}

fn read_line_piped() -> Option<String> {
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) => None,
        Ok(_) => {
            if buf.ends_with('\n') {
                buf.pop();
                if buf.ends_with('\r') {
                    buf.pop();
                }
            }
            Some(buf)
        }
        Err(_) => None,
    }
}

fn read_line_interactive(prompt: &str) -> Option<String> {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "{prompt}");
    let _ = stdout.flush();

    if terminal::enable_raw_mode().is_err() {
        // Not actually a usable tty despite is_terminal(); fall back.
        return read_line_piped();
    }
    let result = edit_loop(&mut stdout);
    let _ = terminal::disable_raw_mode();
    let _ = write!(stdout, "\r\n");
    let _ = stdout.flush();
    result
}

fn edit_loop(stdout: &mut io::Stdout) -> Option<String> {
    let mut buffer: Vec<char> = Vec::new();
    let mut pos = 0usize;

    loop {
        redraw(stdout, &buffer, pos);

        let event = match event::read() {
            Ok(ev) => ev,
            Err(_) => return None,
        };
        let Event::Key(KeyEvent { code, modifiers, kind, .. }) = event else {
            continue;
        };
        if kind == KeyEventKind::Release {
            continue;
        }

        match (code, modifiers) {
            (KeyCode::Enter, _) => {
                let line: String = buffer.into_iter().collect();
                HISTORY.with(|h| h.borrow_mut().push(&line));
                return Some(line);
            }
            (KeyCode::Char('d'), KeyModifiers::CONTROL) if buffer.is_empty() => return None,
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                buffer.clear();
                pos = 0;
            }
            (KeyCode::Char(c), m) if !m.contains(KeyModifiers::CONTROL) && !m.contains(KeyModifiers::ALT) => {
                buffer.insert(pos, c);
                pos += 1;
            }
            (KeyCode::Backspace, _) => {
                if pos > 0 {
                    pos -= 1;
                    buffer.remove(pos);
                }
            }
            (KeyCode::Delete, _) => {
                if pos < buffer.len() {
                    buffer.remove(pos);
                }
            }
            (KeyCode::Left, _) => pos = pos.saturating_sub(1),
            (KeyCode::Right, _) => pos = (pos + 1).min(buffer.len()),
            (KeyCode::Home, _) => pos = 0,
            (KeyCode::End, _) => pos = buffer.len(),
            (KeyCode::Up, _) => {
                if let Some(entry) = HISTORY.with(|h| h.borrow_mut().previous().map(str::to_string)) {
                    buffer = entry.chars().collect();
                    pos = buffer.len();
                }
            }
            (KeyCode::Down, _) => {
                let entry = HISTORY.with(|h| h.borrow_mut().next().map(str::to_string));
                buffer = entry.unwrap_or_default().chars().collect();
                pos = buffer.len();
            }
            _ => {}
        }
    }
}

fn redraw(stdout: &mut io::Stdout, buffer: &[char], pos: usize) {
    let line: String = buffer.iter().collect();
    let _ = queue!(
        stdout,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::UntilNewLine),
        style::Print(&line),
        cursor::MoveToColumn(pos as u16),
    );
    let _ = stdout.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_previous_walks_back_from_most_recent() {
        let mut history = History::default();
        history.push("echo a");
        history.push("echo b");
        assert_eq!(history.previous(), Some("echo b"));
        assert_eq!(history.previous(), Some("echo a"));
        assert_eq!(history.previous(), Some("echo a"));
    }

    #[test]
    fn history_next_returns_to_empty_after_most_recent() {
        let mut history = History::default();
        history.push("echo a");
        history.push("echo b");
        history.previous();
        history.previous();
        assert_eq!(history.next(), Some("echo b"));
        assert_eq!(history.next(), None);
    }

    #[test]
    fn history_skips_consecutive_duplicates() {
        let mut history = History::default();
        history.push("echo a");
        history.push("echo a");
        assert_eq!(history.entries.len(), 1);
    }
}
