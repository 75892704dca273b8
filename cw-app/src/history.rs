//! Append-only conversation record for one contact or group.

use cw_backend::ConversationTurn;

/// Ordered turn log. Supplies the prompt context for the next query and is
/// cleared together with the session handle whenever the session is
/// invalidated.
#[derive(Debug, Default)]
pub struct HistoryLog {
    turns: Vec<ConversationTurn>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Prior turns in insertion order. Repeated calls with no mutation in
    /// between return the same sequence.
    pub fn snapshot_for_prompt(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    /// Remove the most recent turn. Used to roll back the user turn of a
    /// failed query so failed exchanges never become prompt context.
    pub fn pop_last(&mut self) -> Option<ConversationTurn> {
        self.turns.pop()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_insertion_order_and_is_restartable() {
        let mut log = HistoryLog::new();
        log.append(ConversationTurn::user("first"));
        log.append(ConversationTurn::assistant("second"));
        log.append(ConversationTurn::user("third"));

        let first = log.snapshot_for_prompt();
        let second = log.snapshot_for_prompt();
        let texts: Vec<&str> = first.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.role, b.role);
        }
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = HistoryLog::new();
        log.append(ConversationTurn::user("hello"));
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
        assert!(log.snapshot_for_prompt().is_empty());
    }

    #[test]
    fn pop_last_removes_only_the_newest_turn() {
        let mut log = HistoryLog::new();
        log.append(ConversationTurn::user("kept"));
        log.append(ConversationTurn::user("rolled back"));
        let popped = log.pop_last().expect("popped turn");
        assert_eq!(popped.text, "rolled back");
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot_for_prompt()[0].text, "kept");
    }
}
