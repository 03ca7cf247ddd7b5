//! The Thread Reader: replays a [`Thread`]'s grammar back into the flat event stream it was
//! built from, reconstructing each occurrence's timestamp and duration as it goes
//! (spec.md §4.6).
//!
//! The primitive API mirrors a descent through the grammar tree one level at a time
//! ([`ThreadReader::read_current_level`], [`ThreadReader::enter_block`],
//! [`ThreadReader::leave_block`]); [`ThreadReader::read_event`] is the convenience
//! depth-first walk built on top of it that most callers want.

use rustc_hash::FxHashMap;

use pallas_core::{Attributes, Event, PallasError, Result, Thread, Token, TokenKind};

/// Rounding tolerance for duration-sum invariant checks (spec.md §8, Invariant 6): a
/// sequence occurrence's reconstructed child-duration sum may differ from its own recorded
/// duration by at most this many nanoseconds before it's treated as corrupt.
const DURATION_TOLERANCE_NS: u64 = 1;

/// One fully reconstructed event occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEvent {
    pub token: Token,
    pub event: Event,
    pub timestamp: u64,
    pub duration: u64,
    pub attributes: Attributes,
}

#[derive(Debug, Clone)]
enum BlockCursor {
    /// A plain token list: the thread's root, an ordinary `Sequence` occurrence, or one
    /// iteration of a `Loop`'s repeated body. `owner` is the `(sequence token, occurrence
    /// index)` this level reconstructs a duration for; `None` only for the thread's root.
    Tokens { tokens: Vec<Token>, pos: usize, accumulated_duration: u64, owner: Option<(Token, usize)> },
    /// The remaining iterations of a `Loop` occurrence not yet descended into. Its
    /// accumulated duration has no invariant of its own to check against (a `Loop` stores no
    /// duration column) but still bubbles up into whatever level contains the `Loop` token.
    LoopIterations { body: Token, remaining: u64, accumulated_duration: u64 },
}

/// A reader's full position: the block stack and per-token occurrence cursors. Cheap to
/// clone; [`ThreadReader::save_state`] / [`ThreadReader::load_savestate`] only ever keep
/// this in memory (spec.md §4.6: a Savestate is never written to disk).
#[derive(Debug, Clone)]
pub struct Savestate {
    stack: Vec<BlockCursor>,
    event_cursor: FxHashMap<Token, usize>,
    sequence_cursor: FxHashMap<Token, usize>,
    loop_cursor: FxHashMap<Token, usize>,
    timestamp: u64,
}

/// Per-construct aggregate statistics accumulated while replaying a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub events_read: u64,
    pub sequence_occurrences_entered: u64,
    pub loop_occurrences_entered: u64,
    pub duration_warnings: u64,
}

pub struct ThreadReader<'a> {
    thread: &'a Thread,
    stack: Vec<BlockCursor>,
    event_cursor: FxHashMap<Token, usize>,
    sequence_cursor: FxHashMap<Token, usize>,
    loop_cursor: FxHashMap<Token, usize>,
    timestamp: u64,
    stats: ReplayStats,
}

impl<'a> ThreadReader<'a> {
    pub fn new(thread: &'a Thread) -> Self {
        let root_tokens = thread.root_sequence().tokens.clone();
        let timestamp = thread.root_occurrences().timestamps.front().unwrap_or(0);
        Self {
            thread,
            stack: vec![BlockCursor::Tokens {
                tokens: root_tokens,
                pos: 0,
                accumulated_duration: 0,
                owner: None,
            }],
            event_cursor: FxHashMap::default(),
            sequence_cursor: FxHashMap::default(),
            loop_cursor: FxHashMap::default(),
            timestamp,
            stats: ReplayStats::default(),
        }
    }

    /// The timestamp of the most recently read event, or the thread's start timestamp if
    /// nothing has been read yet.
    pub fn current_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    /// Peeks the token at the current nesting level without consuming it. `None` means the
    /// current level is exhausted (the caller should [`ThreadReader::leave_block`], unless
    /// this is the root level, in which case the thread is fully replayed).
    pub fn read_current_level(&self) -> Option<Token> {
        match self.stack.last()? {
            BlockCursor::Tokens { tokens, pos, .. } => tokens.get(*pos).copied(),
            BlockCursor::LoopIterations { body, remaining, .. } => (*remaining > 0).then_some(*body),
        }
    }

    /// Descends into the compound token last returned by [`ThreadReader::read_current_level`]
    /// (must be a `Sequence` or `Loop`), consuming it at the current level and pushing a new
    /// level for its children.
    pub fn enter_block(&mut self) -> Result<()> {
        let token = self
            .read_current_level()
            .ok_or_else(|| PallasError::invalid_state("enter_block called with nothing to enter"))?;

        match token.kind() {
            TokenKind::Sequence => {
                self.advance_current_level();
                let idx = Self::bump(&mut self.sequence_cursor, token);
                let seq = self.thread.sequence(token).expect("validated at load time");
                self.stack.push(BlockCursor::Tokens {
                    tokens: seq.tokens.clone(),
                    pos: 0,
                    accumulated_duration: 0,
                    owner: Some((token, idx)),
                });
                self.stats.sequence_occurrences_entered += 1;
                Ok(())
            },
            TokenKind::Loop => {
                self.advance_current_level();
                let l = self.thread.loop_(token).expect("validated at load time");
                let idx = Self::bump(&mut self.loop_cursor, token);
                let count = l.iterations.at(idx);
                self.stack.push(BlockCursor::LoopIterations {
                    body: l.repeated_token,
                    remaining: count,
                    accumulated_duration: 0,
                });
                self.stats.loop_occurrences_entered += 1;
                Ok(())
            },
            _ => Err(PallasError::invalid_state(format!(
                "enter_block called on a non-compound token {token}"
            ))),
        }
    }

    /// Pops the current level. For a `Sequence` occurrence, checks the reconstructed
    /// child-duration sum against the recorded duration (Invariant 6); a mismatch beyond
    /// [`DURATION_TOLERANCE_NS`] is logged as a warning rather than returned as an error,
    /// matching this invariant's non-fatal treatment under `PallasError::is_fatal()`.
    pub fn leave_block(&mut self) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(PallasError::invalid_state("leave_block called at the root level"));
        }
        let finished = self.stack.pop().expect("checked non-empty above");
        match finished {
            BlockCursor::Tokens { tokens, pos, accumulated_duration, owner } => {
                if pos < tokens.len() {
                    self.stack.push(BlockCursor::Tokens { tokens, pos, accumulated_duration, owner });
                    return Err(PallasError::invalid_state(
                        "leave_block called before the current level was fully read",
                    ));
                }
                if let Some((seq_token, idx)) = owner {
                    self.check_duration_invariant(seq_token, idx, accumulated_duration);
                }
                self.bubble(accumulated_duration);
            },
            BlockCursor::LoopIterations { body, remaining, accumulated_duration } => {
                if remaining != 0 {
                    self.stack.push(BlockCursor::LoopIterations { body, remaining, accumulated_duration });
                    return Err(PallasError::invalid_state(
                        "leave_block called before all loop iterations were read",
                    ));
                }
                self.bubble(accumulated_duration);
            },
        }
        Ok(())
    }

    /// Reads the next leaf event in depth-first order, transparently descending into and
    /// ascending out of `Sequence`/`Loop` tokens. Returns `Ok(None)` once the thread is fully
    /// replayed.
    pub fn read_event(&mut self) -> Result<Option<ReadEvent>> {
        loop {
            match self.read_current_level() {
                None => {
                    if self.stack.len() == 1 {
                        return Ok(None);
                    }
                    self.leave_block()?;
                },
                Some(token) if token.is_event() => {
                    self.advance_current_level();
                    let read = self.resolve_event(token);
                    self.timestamp = read.timestamp;
                    self.stats.events_read += 1;
                    if let BlockCursor::Tokens { accumulated_duration, .. } =
                        self.stack.last_mut().expect("non-empty")
                    {
                        *accumulated_duration += read.duration;
                    }
                    return Ok(Some(read));
                },
                Some(_) => self.enter_block()?,
            }
        }
    }

    /// Captures the reader's current position. Held only in memory; never written to disk.
    pub fn save_state(&self) -> Savestate {
        Savestate {
            stack: self.stack.clone(),
            event_cursor: self.event_cursor.clone(),
            sequence_cursor: self.sequence_cursor.clone(),
            loop_cursor: self.loop_cursor.clone(),
            timestamp: self.timestamp,
        }
    }

    pub fn load_savestate(&mut self, state: Savestate) {
        self.stack = state.stack;
        self.event_cursor = state.event_cursor;
        self.sequence_cursor = state.sequence_cursor;
        self.loop_cursor = state.loop_cursor;
        self.timestamp = state.timestamp;
    }

    fn advance_current_level(&mut self) {
        match self.stack.last_mut().expect("non-empty") {
            BlockCursor::Tokens { pos, .. } => *pos += 1,
            BlockCursor::LoopIterations { remaining, .. } => *remaining -= 1,
        }
    }

    fn bump(cursor: &mut FxHashMap<Token, usize>, token: Token) -> usize {
        let idx = cursor.get(&token).copied().unwrap_or(0);
        cursor.insert(token, idx + 1);
        idx
    }

    fn resolve_event(&mut self, token: Token) -> ReadEvent {
        let idx = Self::bump(&mut self.event_cursor, token);
        let summary = self.thread.event_summary(token).expect("validated at load time");
        let timestamp = summary.timestamps.at(idx);
        let duration = if idx < summary.durations.size() { summary.durations.at(idx) } else { 0 };
        ReadEvent {
            token,
            event: summary.event,
            timestamp,
            duration,
            attributes: summary.attributes_for(idx).to_vec(),
        }
    }

    fn check_duration_invariant(&mut self, seq_token: Token, idx: usize, accumulated_duration: u64) {
        let Some(occurrences) = self.thread.sequence_occurrences(seq_token) else { return };
        if idx >= occurrences.durations.size() {
            return;
        }
        let recorded = occurrences.durations.at(idx);
        if recorded.abs_diff(accumulated_duration) > DURATION_TOLERANCE_NS {
            self.stats.duration_warnings += 1;
            tracing::warn!(
                token = %seq_token,
                occurrence = idx,
                recorded,
                reconstructed = accumulated_duration,
                "sequence occurrence duration does not balance within tolerance"
            );
        }
    }

    /// Adds `amount` into whichever level is now on top of the stack (the level that
    /// contained the block that just closed).
    fn bubble(&mut self, amount: u64) {
        match self.stack.last_mut() {
            Some(BlockCursor::Tokens { accumulated_duration, .. }) => *accumulated_duration += amount,
            Some(BlockCursor::LoopIterations { accumulated_duration, .. }) => *accumulated_duration += amount,
            None => {},
        }
    }
}
