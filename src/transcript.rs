//! Everything the console has shown this session, as styled runs of text.

use std::{fs, io, path::Path};

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};

/// shown in front of echoed commands
pub const PROMPT: &str = "> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStyle {
    Normal,
    /// welcome banner
    Banner,
    /// echoed command
    Command,
    /// error output
    Emphasized,
}

impl RunStyle {
    fn style(self) -> Style {
        match self {
            RunStyle::Normal => Style::default(),
            RunStyle::Banner => Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            RunStyle::Command => Style::default().add_modifier(Modifier::BOLD),
            RunStyle::Emphasized => Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::ITALIC),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub style: RunStyle,
}

/// Append-only (until cleared) transcript. Every append ends in a newline.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    runs: Vec<Run>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, text: &str, style: RunStyle) {
        let mut text = text.to_string();
        text.push('\n');
        self.runs.push(Run { text, style });
    }

    pub fn append_normal(&mut self, text: &str) {
        self.push(text, RunStyle::Normal);
    }

    pub fn append_emphasized(&mut self, text: &str) {
        self.push(text, RunStyle::Emphasized);
    }

    pub fn append_banner(&mut self, text: &str) {
        self.push(text, RunStyle::Banner);
    }

    pub fn append_command_echo(&mut self, command: &str) {
        self.push(&format!("{PROMPT}{command}"), RunStyle::Command);
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn full_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.full_text())
    }

    /// One styled `Line` per transcript line.
    pub fn to_text(&self) -> Text<'static> {
        let mut lines = Vec::new();
        for run in &self.runs {
            let style = run.style.style();
            // every run ends in '\n', so the last split piece is empty
            let body = run.text.strip_suffix('\n').unwrap_or(&run.text);
            for piece in body.split('\n') {
                lines.push(Line::from(Span::styled(piece.to_string(), style)));
            }
        }
        Text::from(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_append_ends_a_line() {
        let mut transcript = Transcript::new();
        transcript.append_banner("Welcome");
        transcript.append_command_echo("print(1)");
        transcript.append_normal("1");
        transcript.append_emphasized("boom");
        assert_eq!(transcript.full_text(), "Welcome\n> print(1)\n1\nboom\n");

        let styles: Vec<_> = transcript.runs().iter().map(|r| r.style).collect();
        assert_eq!(
            styles,
            vec![
                RunStyle::Banner,
                RunStyle::Command,
                RunStyle::Normal,
                RunStyle::Emphasized
            ]
        );
    }

    #[test]
    fn clear_empties_everything() {
        let mut transcript = Transcript::new();
        transcript.append_normal("x");
        transcript.clear();
        assert!(transcript.is_empty());
        assert_eq!(transcript.full_text(), "");
    }

    #[test]
    fn multi_line_runs_render_as_separate_lines() {
        let mut transcript = Transcript::new();
        transcript.append_normal("a\nb");
        transcript.append_emphasized("");
        let text = transcript.to_text();
        assert_eq!(text.lines.len(), 3);
        assert_eq!(text.lines[1].spans[0].content, "b");
        assert_eq!(text.lines[2].spans[0].content, "");
    }

    #[test]
    fn saves_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.txt");
        let mut transcript = Transcript::new();
        transcript.append_command_echo("1 + 1");
        transcript.append_normal("2");
        transcript.save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "> 1 + 1\n2\n");
    }
}
