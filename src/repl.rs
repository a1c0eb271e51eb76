use std::borrow::Cow::{self, Owned};

use rustyline::{
    Context, Helper,
    completion::Completer,
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    validate::{ValidationContext, ValidationResult, Validator},
};

use crate::client::ServerClient;

/// typed at the prompt to leave without touching the server
pub const EXIT_COMMAND: &str = ".exit";

/// host functions the server's interpreter provides
const BUILTINS: &[&str] = &["print(", "progress(", "quit()"];

pub struct ScriptHelper;

impl ScriptHelper {
    fn last_word(line: &str) -> (usize, &str) {
        let start = line
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
            .map_or(0, |i| i + 1);
        (start, &line[start..])
    }
}

/// Net count of open brackets, ignoring anything inside string literals.
fn open_brackets(input: &str) -> i64 {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for c in input.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

impl Completer for ScriptHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Self::Candidate>), ReadlineError> {
        let (start, word) = Self::last_word(&line[..pos]);
        if word.is_empty() {
            return Ok((pos, Vec::new()));
        }
        let matches = BUILTINS
            .iter()
            .filter(|b| b.starts_with(word))
            .map(|b| b.to_string())
            .collect();
        Ok((start, matches))
    }
}

impl Hinter for ScriptHelper {
    type Hint = String;

    fn hint(&self, line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<Self::Hint> {
        match line.trim() {
            "quit()" => Some(" - stops the server".to_string()),
            EXIT_COMMAND => Some(" - leave this prompt".to_string()),
            _ => None,
        }
    }
}

impl Highlighter for ScriptHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned(format!("\x1b[90m{}\x1b[0m", hint))
    }
}

impl Validator for ScriptHelper {
    // keep reading lines while brackets are still open
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        if open_brackets(ctx.input()) > 0 {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

impl Helper for ScriptHelper {}

pub fn create_editor()
-> anyhow::Result<rustyline::Editor<ScriptHelper, rustyline::history::DefaultHistory>> {
    let config = rustyline::Config::builder()
        .completion_type(rustyline::CompletionType::Circular)
        .auto_add_history(true)
        .build();

    let mut editor = rustyline::Editor::with_config(config)?;
    editor.set_helper(Some(ScriptHelper));

    Ok(editor)
}

/// Read commands from the terminal and send each to the server.
pub fn run(client: &mut ServerClient) -> anyhow::Result<()> {
    let mut editor = create_editor()?;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        match line.trim() {
            "" => continue,
            EXIT_COMMAND => break,
            command => {
                let response = client.send_command(command)?;
                print_response(response.is_error(), response.body());
            }
        }
    }
    Ok(())
}

pub fn print_response(is_error: bool, body: &str) {
    if is_error {
        eprintln!("Error: {body}");
    } else if !body.is_empty() {
        print!("{body}");
        if !body.ends_with('\n') {
            println!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_balance() {
        assert_eq!(open_brackets("print(1)"), 0);
        assert_eq!(open_brackets("fn f(x) {"), 1);
        assert_eq!(open_brackets(r#"print("(")"#), 0);
        assert_eq!(open_brackets(r#"print("a\"(" "#), 1);
    }

    #[test]
    fn last_word_splits_on_punctuation() {
        assert_eq!(ScriptHelper::last_word("let x = pro"), (8, "pro"));
        assert_eq!(ScriptHelper::last_word("qu"), (0, "qu"));
        assert_eq!(ScriptHelper::last_word("f("), (2, ""));
    }
}
