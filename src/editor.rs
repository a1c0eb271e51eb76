use unicode_width::UnicodeWidthStr;

/// Single-line input model: text plus a char-indexed cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEditor {
    text: String,
    cursor: usize,
}

impl LineEditor {
    /// Position value meaning "after the last character".
    pub const END: usize = usize::MAX;

    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the text and move the cursor. `None` keeps the current text
    /// but still moves the cursor.
    pub fn set_text_and_position(&mut self, text: Option<&str>, position: usize) {
        if let Some(text) = text {
            self.text = text.to_string();
        }
        self.cursor = position.min(self.char_len());
    }

    pub fn clear(&mut self) {
        self.set_text_and_position(Some(""), 0);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Empty or only whitespace.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Terminal columns taken by the text left of the cursor.
    pub fn cursor_width(&self) -> usize {
        self.text[..self.byte_offset(self.cursor)].width()
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map_or(self.text.len(), |(i, _)| i)
    }

    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.text.insert(at, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_offset(self.cursor);
        self.text.remove(at);
    }

    pub fn delete(&mut self) {
        if self.cursor < self.char_len() {
            let at = self.byte_offset(self.cursor);
            self.text.remove(at);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_len());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.char_len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_text_only_moves_cursor() {
        let mut editor = LineEditor::new();
        editor.set_text_and_position(Some("print(1)"), LineEditor::END);
        assert_eq!(editor.cursor(), 8);

        editor.set_text_and_position(None, 2);
        assert_eq!(editor.text(), "print(1)");
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn clear_resets_cursor() {
        let mut editor = LineEditor::new();
        editor.set_text_and_position(Some("abc"), 3);
        editor.clear();
        assert_eq!(editor.text(), "");
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn whitespace_counts_as_empty() {
        let mut editor = LineEditor::new();
        assert!(editor.is_empty());
        editor.set_text_and_position(Some(" \t "), 0);
        assert!(editor.is_empty());
        editor.set_text_and_position(Some(" x "), 0);
        assert!(!editor.is_empty());
    }

    #[test]
    fn editing_respects_multibyte_chars() {
        let mut editor = LineEditor::new();
        editor.set_text_and_position(Some("héllo"), 2);
        editor.backspace();
        assert_eq!(editor.text(), "hllo");
        editor.insert_char('é');
        assert_eq!(editor.text(), "héllo");
        editor.move_end();
        editor.move_right();
        assert_eq!(editor.cursor(), 5);
        editor.move_home();
        editor.delete();
        assert_eq!(editor.text(), "éllo");
        editor.move_left();
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn cursor_width_counts_wide_glyphs() {
        let mut editor = LineEditor::new();
        editor.set_text_and_position(Some("日本go"), 2);
        assert_eq!(editor.cursor(), 2);
        assert_eq!(editor.cursor_width(), 4);

        editor.move_end();
        assert_eq!(editor.cursor_width(), 6);
        editor.move_home();
        assert_eq!(editor.cursor_width(), 0);
    }
}
