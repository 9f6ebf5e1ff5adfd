//! Tokenizer and command-line parser.
//!
//! Yields an already-structured [`CommandLine`] and is kept intentionally
//! narrow — no variable substitution, tilde expansion, or globbing.

use crate::ast::{Command, CommandLine, Pipeline};
use crate::redirect;

/// States for the tokenizer state machine.
enum State {
    Normal,
    InWord,
    InDoubleQuote,
    InSingleQuote,
}

/// Tokenize a shell input line into a list of words.
///
/// Handles unquoted words split by whitespace, double- and single-quoted
/// strings, and backslash escapes. `;`, `|`, and `&` are themselves
/// tokenized as standalone words so the pipeline/command-line splitter can
/// recognize them positionally.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match (&state, ch) {
            (State::Normal, ' ' | '\t') => {}
            (State::Normal, '"') => state = State::InDoubleQuote,
            (State::Normal, '\'') => state = State::InSingleQuote,
            (State::Normal, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                state = State::InWord;
            }
            // `;`, `|`, and standalone `&` are single-character operator
            // tokens even when not separated from neighbours by whitespace.
            (State::Normal, c @ (';' | '|' | '&')) => {
                tokens.push(c.to_string());
            }
            (State::Normal, c) => {
                current.push(c);
                state = State::InWord;
            }

            (State::InWord, ' ' | '\t') => {
                tokens.push(std::mem::take(&mut current));
                state = State::Normal;
            }
            (State::InWord, c @ (';' | '|' | '&')) => {
                tokens.push(std::mem::take(&mut current));
                tokens.push(c.to_string());
                state = State::Normal;
            }
            (State::InWord, '"') => state = State::InDoubleQuote,
            (State::InWord, '\'') => state = State::InSingleQuote,
            (State::InWord, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (State::InWord, c) => current.push(c),

            (State::InDoubleQuote, '"') => state = State::InWord,
            (State::InDoubleQuote, '\\') => match chars.peek() {
                Some(&('"' | '\\' | '$' | '`')) => current.push(chars.next().unwrap()),
                _ => current.push('\\'),
            },
            (State::InDoubleQuote, c) => current.push(c),

            (State::InSingleQuote, '\'') => state = State::InWord,
            (State::InSingleQuote, c) => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Parse a raw input line into a [`CommandLine`].
///
/// Returns `Ok(None)` for an empty-but-valid line. Returns `Err` for a
/// syntax error (e.g. an empty pipeline stage, or a dangling redirection
/// operator).
pub fn parse_command_line(input: &str) -> Result<Option<CommandLine>, String> {
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut pipelines = Vec::new();
    for segment in tokens.split(|t| t == ";") {
        if segment.is_empty() {
            continue;
        }
        pipelines.push(parse_pipeline(segment)?);
    }

    Ok(Some(CommandLine { pipelines }))
}

fn parse_pipeline(tokens: &[String]) -> Result<Pipeline, String> {
    let mut tokens = tokens.to_vec();
    let bg_requested = redirect::extract_background_flag(&mut tokens);

    let mut commands = Vec::new();
    for stage in tokens.split(|t| t == "|") {
        if stage.is_empty() {
            return Err("esh: syntax error near unexpected token `|'".to_string());
        }
        let resolved = redirect::extract(stage)?;
        if resolved.argv.is_empty() {
            return Err("esh: syntax error: empty command".to_string());
        }
        let mut command = Command::new(resolved.argv);
        command.input_redirect = resolved.input_redirect;
        command.output_redirect = resolved.output_redirect;
        commands.push(command);
    }

    Ok(Pipeline::new(commands, bg_requested))
}
