use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use crate::connection::ConnectionId;

/// A received command waiting for its turn on the interpreter.
#[derive(Debug)]
pub struct Command {
    pub text: String,
    /// `None` once the originating client has gone away
    pub origin: Option<ConnectionId>,
    /// request number, for the log only
    pub sequence: u64,
    pub received_at: Instant,
}

impl Command {
    /// Time spent waiting since the request arrived.
    pub fn queued_for(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// Server-wide FIFO of pending commands.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<Command>,
    next_sequence: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `text` from `origin` and return its sequence number.
    pub fn push(&mut self, text: String, origin: ConnectionId) -> u64 {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.commands.push_back(Command {
            text,
            origin: Some(origin),
            sequence,
            received_at: Instant::now(),
        });
        sequence
    }

    pub fn pop(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    /// Detach every queued command from `origin`; they still run, but nobody
    /// gets the answer. Returns how many were affected.
    pub fn invalidate_origin(&mut self, origin: ConnectionId) -> usize {
        let mut count = 0;
        for command in self.commands.iter_mut() {
            if command.origin == Some(origin) {
                command.origin = None;
                count += 1;
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop everything still queued, returning how many were discarded.
    pub fn discard_all(&mut self) -> usize {
        let count = self.commands.len();
        self.commands.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_with_increasing_sequence() {
        let mut queue = CommandQueue::new();
        let a = ConnectionId::new(1);
        let b = ConnectionId::new(2);
        assert_eq!(queue.push("first".into(), a), 1);
        assert_eq!(queue.push("second".into(), b), 2);
        assert_eq!(queue.push("third".into(), a), 3);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|c| (c.sequence, c.text))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, "first".to_string()),
                (2, "second".to_string()),
                (3, "third".to_string())
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn invalidating_an_origin_keeps_the_commands() {
        let mut queue = CommandQueue::new();
        let gone = ConnectionId::new(7);
        let alive = ConnectionId::new(8);
        queue.push("a".into(), gone);
        queue.push("b".into(), alive);
        queue.push("c".into(), gone);

        assert_eq!(queue.invalidate_origin(gone), 2);
        assert_eq!(queue.len(), 3);

        let origins: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|c| c.origin).collect();
        assert_eq!(origins, vec![None, Some(alive), None]);
    }

    #[test]
    fn queued_time_counts_from_arrival() {
        let mut queue = CommandQueue::new();
        queue.push("slow".into(), ConnectionId::new(0));
        std::thread::sleep(Duration::from_millis(20));
        let command = queue.pop().unwrap();
        assert!(command.queued_for() >= Duration::from_millis(20));
    }

    #[test]
    fn sequence_keeps_counting_after_drain() {
        let mut queue = CommandQueue::new();
        let id = ConnectionId::new(0);
        queue.push("x".into(), id);
        queue.push("y".into(), id);
        assert_eq!(queue.discard_all(), 2);
        assert_eq!(queue.push("z".into(), id), 3);
    }
}
