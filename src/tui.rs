use std::{
    io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use unicode_width::UnicodeWidthStr;

use crate::{
    console::ConsoleSession,
    editor::LineEditor,
    interpreter::{Interpreter, InterpreterHooks},
    transcript::PROMPT,
};

/// Lets `quit()` inside the console end the session.
#[derive(Clone, Default)]
pub struct ConsoleControl {
    quit: Arc<AtomicBool>,
}

impl ConsoleControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }
}

impl InterpreterHooks for ConsoleControl {
    fn on_quit(&self) {
        self.quit.store(true, Ordering::Relaxed);
    }

    fn on_post_command(&self) {}
}

pub struct ConsoleApp<I> {
    session: ConsoleSession<I>,
    control: ConsoleControl,
    transcript_path: PathBuf,
    status: String,
}

impl<I: Interpreter> ConsoleApp<I> {
    pub fn new(
        session: ConsoleSession<I>,
        control: ConsoleControl,
        transcript_path: PathBuf,
    ) -> Self {
        Self {
            session,
            control,
            transcript_path,
            status: String::from(
                "Enter run | Up/Down history | Ctrl-L clear | Ctrl-S save | Esc exit",
            ),
        }
    }

    /// Take over the terminal until the user leaves; hands the session back.
    pub fn run(mut self) -> anyhow::Result<ConsoleSession<I>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let res = self.run_loop(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        res.map(|()| self.session)
    }

    fn run_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> anyhow::Result<()> {
        loop {
            terminal.draw(|f| self.ui(f))?;

            if !event::poll(Duration::from_millis(100))? {
                continue;
            }
            if let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
                && !self.handle_key(key)
            {
                return Ok(());
            }
            if self.control.quit_requested() {
                return Ok(());
            }
        }
    }

    /// Returns false when the console should close.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return false,
            KeyCode::Char('c') if ctrl => return false,
            KeyCode::Char('d') if ctrl && self.session.editor().text().is_empty() => return false,
            KeyCode::Char('l') if ctrl => self.session.clear_transcript(),
            KeyCode::Char('s') if ctrl => {
                self.status = match self.session.save_transcript(&self.transcript_path) {
                    Ok(()) => format!("Transcript saved to {}", self.transcript_path.display()),
                    Err(e) => format!("Cannot save transcript: {e}"),
                };
            }
            KeyCode::Char(c) if !ctrl => self.session.editor_mut().insert_char(c),
            KeyCode::Backspace => self.session.editor_mut().backspace(),
            KeyCode::Delete => self.session.editor_mut().delete(),
            KeyCode::Left => self.session.editor_mut().move_left(),
            KeyCode::Right => self.session.editor_mut().move_right(),
            KeyCode::Home => self.session.editor_mut().move_home(),
            KeyCode::End => self.session.editor_mut().move_end(),
            KeyCode::Up => self.session.history_previous(),
            KeyCode::Down => self.session.history_next(),
            KeyCode::Enter => {
                self.session.submit();
            }
            _ => {}
        }
        true
    }

    fn ui(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .split(frame.area());

        self.render_transcript(frame, chunks[0]);
        self.render_input(frame, chunks[1]);
        frame.render_widget(
            Paragraph::new(Span::styled(
                self.status.as_str(),
                Style::default().fg(Color::DarkGray),
            )),
            chunks[2],
        );
    }

    fn render_transcript(&self, frame: &mut Frame, area: Rect) {
        let text = self.session.transcript().to_text();
        // keep the newest lines in view
        let visible = area.height.saturating_sub(2) as usize;
        let scroll = u16::try_from(text.lines.len().saturating_sub(visible)).unwrap_or(u16::MAX);

        let paragraph = Paragraph::new(text)
            .block(Block::default().title("Console").borders(Borders::ALL))
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0));
        frame.render_widget(paragraph, area);
    }

    fn render_input(&self, frame: &mut Frame, area: Rect) {
        let editor = self.session.editor();
        let line = Line::from(vec![
            Span::styled(PROMPT, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(editor.text()),
        ]);
        let input = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(input, area);

        frame.set_cursor_position(cursor_position(area, editor));
    }
}

/// Screen cell for the input cursor inside the bordered input box.
fn cursor_position(area: Rect, editor: &LineEditor) -> (u16, u16) {
    let offset = u16::try_from(PROMPT.width() + editor.cursor_width()).unwrap_or(u16::MAX);
    let x = area.x.saturating_add(1).saturating_add(offset);
    (x.min(area.right().saturating_sub(2)), area.y + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_sits_after_wide_glyphs() {
        let area = Rect::new(0, 10, 40, 3);
        let mut editor = LineEditor::new();
        editor.set_text_and_position(Some("日本"), LineEditor::END);
        // border, "> ", then two double-width glyphs
        assert_eq!(cursor_position(area, &editor), (1 + 2 + 4, 11));
    }

    #[test]
    fn cursor_stays_inside_the_box_for_long_input() {
        let area = Rect::new(0, 0, 20, 3);
        let mut editor = LineEditor::new();
        editor.set_text_and_position(Some(&"x".repeat(100_000)), LineEditor::END);
        assert_eq!(cursor_position(area, &editor), (18, 1));
    }
}
