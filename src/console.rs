//! Interactive console session: input line, recall history and transcript
//! wired to an interpreter.

use std::{io, path::Path};

use crate::{
    config::ConsoleSettings,
    editor::LineEditor,
    error::ConfigError,
    history::CommandHistory,
    interpreter::{Interpreter, OutputBuffer},
    transcript::Transcript,
};

const WELCOME: &str = "Welcome to the script console\nInteractive Rhai scripting, type quit() to leave";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// blank input, nothing happened
    Ignored,
    Succeeded,
    Failed,
}

pub struct ConsoleSession<I> {
    interpreter: I,
    history: CommandHistory,
    transcript: Transcript,
    editor: LineEditor,
}

impl<I: Interpreter> ConsoleSession<I> {
    pub fn new(mut interpreter: I, settings: &ConsoleSettings) -> Result<Self, ConfigError> {
        interpreter.set_print_results(true);
        let history = CommandHistory::from_entries(settings.history_capacity, &settings.history)?;

        let mut transcript = Transcript::new();
        transcript.append_banner(WELCOME);

        Ok(Self {
            interpreter,
            history,
            transcript,
            editor: LineEditor::new(),
        })
    }

    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut LineEditor {
        &mut self.editor
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Run what is in the input line (Enter).
    pub fn submit(&mut self) -> SubmitOutcome {
        if self.editor.is_empty() {
            return SubmitOutcome::Ignored;
        }
        let command = self.editor.text().to_string();
        self.editor.clear();

        self.history.append_and_advance(command.clone());
        self.transcript.append_command_echo(&command);

        let output = OutputBuffer::new();
        self.interpreter.redirect_output(Some(output.clone()));
        let status = self.interpreter.interpret(&command);
        self.interpreter.redirect_output(None);

        let printed = output.take();
        let printed = printed.strip_suffix('\n').unwrap_or(&printed);
        if !printed.is_empty() {
            self.transcript.append_normal(printed);
        }

        if status.is_error() {
            let message = format!("Error: {}", self.interpreter.last_error_message());
            self.transcript.append_emphasized(&message);
            SubmitOutcome::Failed
        } else {
            SubmitOutcome::Succeeded
        }
    }

    /// Arrow up.
    pub fn history_previous(&mut self) {
        self.navigate(-1);
    }

    /// Arrow down.
    pub fn history_next(&mut self) {
        self.navigate(1);
    }

    fn navigate(&mut self, delta: isize) {
        if self.history.is_cursor_at_tail() {
            self.history.set_tail(self.editor.text().to_string());
        }
        self.history.move_cursor(delta);
        let entry = self.history.get_at_cursor().map(str::to_string);
        self.editor
            .set_text_and_position(entry.as_deref(), LineEditor::END);
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
    }

    pub fn save_transcript(&self, path: &Path) -> io::Result<()> {
        self.transcript.save(path)
    }

    /// Settings to persist for the next session.
    pub fn settings(&self) -> ConsoleSettings {
        ConsoleSettings {
            history_capacity: self.history.capacity(),
            history: self.history.entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::interpreter::{NoHooks, RhaiInterpreter};

    fn session() -> ConsoleSession<RhaiInterpreter> {
        ConsoleSession::new(
            RhaiInterpreter::new(Arc::new(NoHooks)),
            &ConsoleSettings::default(),
        )
        .unwrap()
    }

    fn type_line(session: &mut ConsoleSession<RhaiInterpreter>, text: &str) {
        session
            .editor_mut()
            .set_text_and_position(Some(text), LineEditor::END);
    }

    #[test]
    fn opens_with_banner() {
        let session = session();
        assert!(session.transcript().full_text().starts_with("Welcome"));
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut session = session();
        type_line(&mut session, "   ");
        let before = session.transcript().full_text();
        assert_eq!(session.submit(), SubmitOutcome::Ignored);
        assert_eq!(session.transcript().full_text(), before);
        assert!(session.history().entries().is_empty());
    }

    #[test]
    fn submit_echoes_runs_and_records() {
        let mut session = session();
        type_line(&mut session, "let x = 20;");
        assert_eq!(session.submit(), SubmitOutcome::Succeeded);
        type_line(&mut session, "x * 2 + 2");
        assert_eq!(session.submit(), SubmitOutcome::Succeeded);

        assert!(session
            .transcript()
            .full_text()
            .ends_with("> let x = 20;\n> x * 2 + 2\n42\n"));
        assert_eq!(session.history().entries(), vec!["let x = 20;", "x * 2 + 2"]);
        assert_eq!(session.editor().text(), "");
    }

    #[test]
    fn errors_are_emphasized() {
        let mut session = session();
        type_line(&mut session, "undefined_thing");
        assert_eq!(session.submit(), SubmitOutcome::Failed);
        let last = session.transcript().runs().last().unwrap();
        assert_eq!(last.style, crate::transcript::RunStyle::Emphasized);
        assert!(last.text.starts_with("Error: "));
    }

    #[test]
    fn arrows_recall_and_restore_draft() {
        let mut session = session();
        for cmd in ["print(1)", "print(2)"] {
            type_line(&mut session, cmd);
            session.submit();
        }

        type_line(&mut session, "half typed");
        session.history_previous();
        assert_eq!(session.editor().text(), "print(2)");
        assert_eq!(session.editor().cursor(), 8);
        session.history_previous();
        session.history_previous();
        assert_eq!(session.editor().text(), "print(1)");

        session.history_next();
        session.history_next();
        assert_eq!(session.editor().text(), "half typed");
    }

    #[test]
    fn clearing_transcript_keeps_history() {
        let mut session = session();
        type_line(&mut session, "1");
        session.submit();
        session.clear_transcript();
        assert!(session.transcript().is_empty());
        session.history_previous();
        assert_eq!(session.editor().text(), "1");
    }

    #[test]
    fn settings_round_trip_history() {
        let settings = ConsoleSettings {
            history_capacity: 3,
            history: vec!["a".into(), "b".into(), "c".into()],
        };
        let mut session =
            ConsoleSession::new(RhaiInterpreter::new(Arc::new(NoHooks)), &settings).unwrap();
        assert_eq!(session.settings().history, vec!["b", "c"]);

        type_line(&mut session, "d");
        session.submit();
        assert_eq!(
            session.settings(),
            ConsoleSettings {
                history_capacity: 3,
                history: vec!["c".into(), "d".into()],
            }
        );
    }
}
