//! [`Sequence`]: a finite ordered list of [`Token`]s, interned by structural equality, with
//! one duration/timestamp entry per occurrence.

use crate::column::Column;
use crate::token::Token;

/// A finite ordered list of tokens plus a duration column and a timestamp column, one entry
/// per occurrence of the sequence in the stream (spec.md §3).
///
/// Invariants (enforced by the detector and reader, not by this type): for every
/// occurrence, `sum(child_durations) == stored_duration` up to 1ns rounding; timestamps are
/// monotonically non-decreasing within one column. A length-1 sequence is never interned
/// (spec.md §4.3 edge cases) — that is enforced by the detector, not here, since `Sequence`
/// itself is just the storage shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sequence {
    pub tokens: Vec<Token>,
}

/// Sequence durations/timestamps are tracked per occurrence, alongside the interned
/// token-list body. Kept as a separate struct from the body so the content hash used for
/// interning only ever hashes the (immutable) token list, never the growing occurrence
/// columns.
#[derive(Debug, Clone, Default)]
pub struct SequenceOccurrences {
    pub durations: Column,
    pub timestamps: Column,
}

impl Sequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Content hash keyed on the token vector, used to intern structurally-equal sequence
    /// bodies into one table entry (spec.md §4.3).
    pub fn content_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        self.tokens.hash(&mut hasher);
        hasher.finish()
    }
}

impl SequenceOccurrences {
    pub fn record(&mut self, timestamp: u64, duration: u64) {
        self.timestamps.push(timestamp);
        self.durations.push(duration);
    }

    pub fn occurrence_count(&self) -> usize {
        self.timestamps.size()
    }

    pub fn is_consistent(&self) -> bool {
        self.timestamps.size() == self.durations.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_equal_sequences_share_a_hash() {
        let a = Sequence::new(vec![Token::event(1), Token::event(2)]);
        let b = Sequence::new(vec![Token::event(1), Token::event(2)]);
        let c = Sequence::new(vec![Token::event(2), Token::event(1)]);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }
}
