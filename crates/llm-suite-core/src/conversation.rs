//! Append-only conversation history for one tool session.

use crate::models::{ConversationTurn, Role};

/// Ordered turns, oldest first.
///
/// The only removal operation is [`ConversationLog::clear`], which drops
/// every turn at once. Callers bound prompt size with
/// [`ConversationLog::recent`], which never mutates the log.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Record a completed exchange.
    pub fn append_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ConversationTurn::user(question));
        self.turns.push(ConversationTurn::assistant(answer));
    }

    pub fn all(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `max_turns` turns in chronological order.
    pub fn recent(&self, max_turns: usize) -> &[ConversationTurn] {
        let skip = self.turns.len().saturating_sub(max_turns);
        &self.turns[skip..]
    }

    /// The most recent assistant reply, if any.
    pub fn last_reply(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str())
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
