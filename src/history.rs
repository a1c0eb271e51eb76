use std::collections::VecDeque;

use crate::error::ConfigError;

/// Bounded recall list for the console input line.
///
/// The last slot is always the command currently being typed. `capacity`
/// counts that slot too, so at most `capacity - 1` submitted commands are
/// kept.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    slots: VecDeque<Option<String>>,
    capacity: usize,
    cursor: usize,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let mut slots = VecDeque::with_capacity(capacity.min(1024));
        slots.push_back(None);
        Ok(Self {
            slots,
            capacity,
            cursor: 0,
        })
    }

    /// Rebuild from persisted entries (oldest first); the oldest are
    /// dropped if they don't fit.
    pub fn from_entries(capacity: usize, entries: &[String]) -> Result<Self, ConfigError> {
        let mut history = Self::new(capacity)?;
        for entry in entries {
            history.append_and_advance(entry.clone());
        }
        Ok(history)
    }

    /// Commit `text` into the tail slot and open a fresh, empty tail.
    pub fn append_and_advance(&mut self, text: String) {
        if let Some(tail) = self.slots.back_mut() {
            *tail = Some(text);
        }
        if self.slots.len() == self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(None);
        self.cursor = self.slots.len() - 1;
    }

    /// Move by `delta`, stopping at either end.
    pub fn move_cursor(&mut self, delta: isize) {
        let last = self.slots.len() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    pub fn is_cursor_at_tail(&self) -> bool {
        self.cursor == self.slots.len() - 1
    }

    pub fn get_at_cursor(&self) -> Option<&str> {
        self.slots.get(self.cursor)?.as_deref()
    }

    /// Remember the not-yet-submitted text in the tail slot.
    pub fn set_tail(&mut self, text: String) {
        if let Some(tail) = self.slots.back_mut() {
            *tail = Some(text);
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        // the tail slot is always there
        false
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Submitted commands, oldest first, without the tail slot.
    pub fn entries(&self) -> Vec<String> {
        self.slots
            .iter()
            .take(self.slots.len() - 1)
            .flatten()
            .cloned()
            .collect()
    }
}
