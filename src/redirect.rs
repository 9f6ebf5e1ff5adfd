//! Redirection-token extraction.
//!
//! Deliberately narrower than a general-purpose shell's redirection grammar:
//! each [`crate::ast::Command`] carries exactly one optional input path and
//! one optional output path (with an append flag), so this module
//! recognizes only `<`, `>`, `>>`, and a trailing `&` for background
//! requests.

/// The result of scanning one pipeline stage's tokens for redirections.
pub struct StageRedirections {
    pub argv: Vec<String>,
    pub input_redirect: Option<String>,
    pub output_redirect: Option<(String, bool)>,
}

/// Pull `<file`, `>file`, and `>>file` operators out of a single stage's
/// tokens, returning the remaining argv and the parsed redirections.
///
/// Returns `Err` for a trailing operator with no filename (syntax error).
pub fn extract(tokens: &[String]) -> Result<StageRedirections, String> {
    let mut argv = Vec::new();
    let mut input_redirect = None;
    let mut output_redirect = None;

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].as_str() {
            "<" => {
                i += 1;
                input_redirect = Some(expect_filename(tokens, i, "<")?);
            }
            ">" => {
                i += 1;
                output_redirect = Some((expect_filename(tokens, i, ">")?, false));
            }
            ">>" => {
                i += 1;
                output_redirect = Some((expect_filename(tokens, i, ">>")?, true));
            }
            token => argv.push(token.to_string()),
        }
        i += 1;
    }

    Ok(StageRedirections {
        argv,
        input_redirect,
        output_redirect,
    })
}

fn expect_filename(tokens: &[String], i: usize, operator: &str) -> Result<String, String> {
    tokens
        .get(i)
        .cloned()
        .ok_or_else(|| format!("esh: syntax error: expected filename after '{operator}'"))
}

/// Strip a trailing standalone `&` token, reporting whether the pipeline was
/// requested to run in the background.
pub fn extract_background_flag(tokens: &mut Vec<String>) -> bool {
    if tokens.last().map(String::as_str) == Some("&") {
        tokens.pop();
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_redirections() {
        let r = extract(&["echo".into(), "hi".into()]).unwrap();
        assert_eq!(r.argv, vec!["echo", "hi"]);
        assert!(r.input_redirect.is_none());
        assert!(r.output_redirect.is_none());
    }

    #[test]
    fn output_truncate() {
        let r = extract(&["echo".into(), "hi".into(), ">".into(), "out.txt".into()]).unwrap();
        assert_eq!(r.argv, vec!["echo", "hi"]);
        assert_eq!(r.output_redirect, Some(("out.txt".to_string(), false)));
    }

    #[test]
    fn output_append() {
        let r = extract(&["echo".into(), ">>".into(), "out.txt".into()]).unwrap();
        assert_eq!(r.output_redirect, Some(("out.txt".to_string(), true)));
    }

    #[test]
    fn input_redirect() {
        let r = extract(&["sort".into(), "<".into(), "data.txt".into()]).unwrap();
        assert_eq!(r.input_redirect, Some("data.txt".to_string()));
    }

    #[test]
    fn missing_filename_is_error() {
        assert!(extract(&["echo".into(), ">".into()]).is_err());
        assert!(extract(&["echo".into(), "<".into()]).is_err());
    }

    #[test]
    fn background_flag_stripped() {
        let mut tokens = vec!["sleep".to_string(), "10".to_string(), "&".to_string()];
        assert!(extract_background_flag(&mut tokens));
        assert_eq!(tokens, vec!["sleep", "10"]);
    }

    #[test]
    fn no_background_flag_left_alone() {
        let mut tokens = vec!["sleep".to_string(), "10".to_string()];
        assert!(!extract_background_flag(&mut tokens));
        assert_eq!(tokens, vec!["sleep", "10"]);
    }
}
