//! [`Loop`]: a back-to-back repetition of one [`Sequence`], with an iteration count per
//! occurrence.

use crate::column::Column;
use crate::token::{Token, TokenKind};

/// A pair `(repeated_token, iteration_counts)`. `repeated_token` must refer to a `Sequence`
/// (Invariant 2). Each entry in `iterations` is the number of back-to-back repetitions
/// observed at one point in the parent stream, and must be `>= 2` (a single occurrence
/// stays a bare `Sequence` token, never a `Loop`; spec.md §3/§8).
#[derive(Debug, Clone)]
pub struct Loop {
    pub repeated_token: Token,
    pub iterations: Column,
}

impl Loop {
    /// Constructs a new loop. Panics if `repeated_token` does not refer to a `Sequence`,
    /// since that would violate Invariant 2 at construction time rather than letting it
    /// slip through to the reader.
    pub fn new(repeated_token: Token) -> Self {
        assert!(
            matches!(repeated_token.kind(), TokenKind::Sequence),
            "Loop::repeated_token must refer to a Sequence, got {repeated_token:?}"
        );
        Self { repeated_token, iterations: Column::new() }
    }

    /// Records one occurrence of this loop. Panics (rather than silently accepting a
    /// corrupt grammar) if `count < 2`, mirroring Invariant 2's "never a Loop" rule.
    pub fn record_occurrence(&mut self, count: u64) {
        assert!(count >= 2, "loop iteration count must be >= 2, got {count}");
        self.iterations.push(count);
    }

    /// Starts a new occurrence in progress, with its first observed repetition count
    /// (always 2: a loop is only created once a body has been seen twice back-to-back).
    /// The detector extends it in place as more repetitions stream in, rather than
    /// recording a fresh occurrence per token (spec.md §4.3: "the number of back-to-back
    /// repetitions observed at one point").
    pub fn start_occurrence(&mut self, count: u64) {
        self.record_occurrence(count);
    }

    /// Bumps the most recently started occurrence by one more repetition.
    pub fn extend_last_occurrence(&mut self) {
        let last = self.iterations.size().checked_sub(1).expect("no occurrence to extend");
        let count = self.iterations.at(last);
        self.iterations.replace_last(count + 1);
    }

    pub fn occurrence_count(&self) -> usize {
        self.iterations.size()
    }

    /// Invariant 2, restated for runtime validation of a grammar read back from disk
    /// (construction-time `assert!`s don't run for deserialized data).
    pub fn is_consistent(&self) -> bool {
        self.repeated_token.is_sequence() && self.iterations.iter().all(|c| c >= 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn rejects_non_sequence_repeated_token() {
        Loop::new(Token::event(0));
    }

    #[test]
    #[should_panic]
    fn rejects_iteration_count_below_two() {
        let mut l = Loop::new(Token::sequence(0));
        l.record_occurrence(1);
    }

    #[test]
    fn extend_last_occurrence_bumps_in_place_not_as_new_entry() {
        let mut l = Loop::new(Token::sequence(3));
        l.start_occurrence(2);
        l.extend_last_occurrence();
        l.extend_last_occurrence();
        assert_eq!(l.occurrence_count(), 1);
        assert_eq!(l.iterations.at(0), 4);
    }

    #[test]
    fn accepts_valid_occurrences() {
        let mut l = Loop::new(Token::sequence(3));
        l.record_occurrence(5);
        l.record_occurrence(2);
        assert!(l.is_consistent());
        assert_eq!(l.occurrence_count(), 2);
    }
}
