//! [`Thread`]: the dense, append-only event/sequence/loop tables for one location, plus the
//! root sequence and a non-owning back-reference to its parent `Archive` (spec.md §3).

use rustc_hash::FxHashMap;

use crate::event::{Event, EventSummary};
use crate::loop_::Loop;
use crate::sequence::{Sequence, SequenceOccurrences};
use crate::token::Token;

/// Reserved id of the thread's root [`Sequence`] (Invariant 3).
pub const ROOT_SEQUENCE_ID: u32 = 0;

/// One logical stream of events within a process. Owns its event/sequence/loop tables
/// exclusively; a `Token` handle into this thread is meaningless without it.
#[derive(Debug, Clone)]
pub struct Thread {
    /// Location id, unique within the owning `Archive`.
    pub id: u32,
    /// Non-owning back-reference to the parent `Archive` (spec.md Design Notes: model
    /// cyclic Thread/Archive/GlobalArchive references as arena indices, never a two-way
    /// owning link).
    pub archive_id: u32,

    events: Vec<EventSummary>,
    event_index: FxHashMap<Event, u32>,

    sequences: Vec<Sequence>,
    sequence_occurrences: Vec<SequenceOccurrences>,
    /// content hash -> candidate sequence ids with that hash (collisions are resolved by
    /// comparing the actual token vectors).
    sequence_intern: FxHashMap<u64, Vec<u32>>,

    loops: Vec<Loop>,
}

impl Thread {
    /// Creates a new thread, already owning an empty root sequence at id 0 (Invariant 3).
    pub fn new(id: u32, archive_id: u32) -> Self {
        let mut thread = Self {
            id,
            archive_id,
            events: Vec::new(),
            event_index: FxHashMap::default(),
            sequences: Vec::new(),
            sequence_occurrences: Vec::new(),
            sequence_intern: FxHashMap::default(),
            loops: Vec::new(),
        };
        let root = Sequence::new(Vec::new());
        thread.sequences.push(root);
        thread.sequence_occurrences.push(SequenceOccurrences::default());
        thread
    }

    pub fn root_token(&self) -> Token {
        Token::sequence(ROOT_SEQUENCE_ID)
    }

    pub fn root_sequence(&self) -> &Sequence {
        &self.sequences[ROOT_SEQUENCE_ID as usize]
    }

    pub fn root_occurrences(&self) -> &SequenceOccurrences {
        &self.sequence_occurrences[ROOT_SEQUENCE_ID as usize]
    }

    /// Replaces the root sequence's body with the thread's top-level token stream and
    /// records its single occurrence. Called once, by the writer, at close.
    pub fn finalize_root(&mut self, tokens: Vec<Token>, timestamp: u64, duration: u64) {
        self.sequences[ROOT_SEQUENCE_ID as usize] = Sequence::new(tokens);
        self.sequence_occurrences[ROOT_SEQUENCE_ID as usize].record(timestamp, duration);
    }

    /// Finds or creates the `EventSummary` for `event`, returning its `Token`.
    pub fn intern_event(&mut self, event: Event) -> Token {
        if let Some(&id) = self.event_index.get(&event) {
            return Token::event(id);
        }
        let id = self.events.len() as u32;
        self.events.push(EventSummary::new(event));
        self.event_index.insert(event, id);
        Token::event(id)
    }

    pub fn event_summary(&self, token: Token) -> Option<&EventSummary> {
        debug_assert!(token.is_event());
        self.events.get(token.id() as usize)
    }

    pub fn event_summary_mut(&mut self, token: Token) -> Option<&mut EventSummary> {
        debug_assert!(token.is_event());
        self.events.get_mut(token.id() as usize)
    }

    pub fn events(&self) -> &[EventSummary] {
        &self.events
    }

    /// Finds an existing sequence structurally equal to `tokens` (tie-break: lowest id
    /// wins among candidates with the same content hash, per spec.md §4.3), or interns a
    /// new one. Never called with `tokens.len() == 1` by the detector (spec.md edge case),
    /// but that is not re-validated here since `Thread` is a pure data owner.
    pub fn intern_sequence(&mut self, tokens: Vec<Token>) -> Token {
        let candidate = Sequence::new(tokens);
        let hash = candidate.content_hash();
        if let Some(ids) = self.sequence_intern.get(&hash) {
            if let Some(&id) = ids.iter().find(|&&id| self.sequences[id as usize] == candidate) {
                return Token::sequence(id);
            }
        }
        let id = self.sequences.len() as u32;
        self.sequences.push(candidate);
        self.sequence_occurrences.push(SequenceOccurrences::default());
        self.sequence_intern.entry(hash).or_default().push(id);
        Token::sequence(id)
    }

    pub fn sequence(&self, token: Token) -> Option<&Sequence> {
        debug_assert!(token.is_sequence());
        self.sequences.get(token.id() as usize)
    }

    pub fn sequence_occurrences(&self, token: Token) -> Option<&SequenceOccurrences> {
        debug_assert!(token.is_sequence());
        self.sequence_occurrences.get(token.id() as usize)
    }

    pub fn sequence_occurrences_mut(&mut self, token: Token) -> Option<&mut SequenceOccurrences> {
        debug_assert!(token.is_sequence());
        self.sequence_occurrences.get_mut(token.id() as usize)
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn all_sequence_occurrences(&self) -> &[SequenceOccurrences] {
        &self.sequence_occurrences
    }

    /// Creates a new `Loop` over `repeated_token` and returns its `Token`. The caller
    /// (the pattern detector) is responsible for recording the loop's occurrences and for
    /// incrementing an existing loop's iteration count instead of creating a new one, per
    /// spec.md §4.3's loop-extension rule.
    pub fn push_loop(&mut self, repeated_token: Token) -> Token {
        let id = self.loops.len() as u32;
        self.loops.push(Loop::new(repeated_token));
        Token::loop_(id)
    }

    pub fn loop_(&self, token: Token) -> Option<&Loop> {
        debug_assert!(token.is_loop());
        self.loops.get(token.id() as usize)
    }

    pub fn loop_mut(&mut self, token: Token) -> Option<&mut Loop> {
        debug_assert!(token.is_loop());
        self.loops.get_mut(token.id() as usize)
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Rebuilds a `Thread` from already-deserialized tables. Used by `pallas-format` when
    /// reading a thread file back from disk.
    pub fn from_tables(
        id: u32,
        archive_id: u32,
        events: Vec<EventSummary>,
        sequences: Vec<Sequence>,
        sequence_occurrences: Vec<SequenceOccurrences>,
        loops: Vec<Loop>,
    ) -> Self {
        let mut event_index = FxHashMap::default();
        for (i, summary) in events.iter().enumerate() {
            event_index.insert(summary.event, i as u32);
        }
        let mut sequence_intern: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
        for (i, seq) in sequences.iter().enumerate() {
            sequence_intern.entry(seq.content_hash()).or_default().push(i as u32);
        }
        Self {
            id,
            archive_id,
            events,
            event_index,
            sequences,
            sequence_occurrences,
            sequence_intern,
            loops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{CommRef, RegionRef};
    use crate::event::RecordKind;

    #[test]
    fn root_sequence_is_id_zero_and_starts_empty() {
        let thread = Thread::new(0, 0);
        assert_eq!(thread.root_token(), Token::sequence(ROOT_SEQUENCE_ID));
        assert!(thread.root_sequence().is_empty());
        assert_eq!(thread.root_occurrences().occurrence_count(), 0);
    }

    #[test]
    fn interning_the_same_event_twice_returns_the_same_token() {
        let mut thread = Thread::new(0, 0);
        let e = Event::new(RecordKind::EnterRegion, RegionRef::new(1), CommRef::NONE);
        let t1 = thread.intern_event(e);
        let t2 = thread.intern_event(e);
        assert_eq!(t1, t2);
        assert_eq!(thread.events().len(), 1);
    }

    #[test]
    fn interning_structurally_equal_sequences_dedupes() {
        let mut thread = Thread::new(0, 0);
        let body = vec![Token::event(0), Token::event(1)];
        let t1 = thread.intern_sequence(body.clone());
        let t2 = thread.intern_sequence(body);
        assert_eq!(t1, t2);
        assert_eq!(thread.sequences().len(), 2); // root + this one
    }

    #[test]
    fn interning_distinct_sequences_with_colliding_hash_does_not_merge() {
        // Exercise the collision-resolution path: same hash bucket, different bodies.
        let mut thread = Thread::new(0, 0);
        let a = vec![Token::event(0), Token::event(1)];
        let b = vec![Token::event(1), Token::event(0)];
        let ta = thread.intern_sequence(a);
        let tb = thread.intern_sequence(b);
        assert_ne!(ta, tb);
    }
}
