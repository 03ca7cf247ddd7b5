//! [`ThreadWriter`]: the live, append-only recorder for one thread. Feeds interned event
//! tokens into a [`PatternDetector`] as they arrive and finalizes each event's duration once
//! the next event at the same depth is observed (spec.md §4.4).

use pallas_core::{Event, PallasError, RecordKind, RegionRef, Result, Thread, Token};
use pallas_detector::PatternDetector;

/// A `ThreadWriter`'s lifecycle: events may only be recorded while `Open`; `close` moves it
/// through `Closing` (draining the last pending event and the detector's open frames) to
/// `Closed`, after which the writer is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    token: Token,
    timestamp: u64,
}

/// Records one thread's events, interning them into its [`Thread`] and feeding the grammar
/// detector, until [`ThreadWriter::close`] hands the finished `Thread` back to the caller.
#[derive(Debug)]
pub struct ThreadWriter {
    thread: Thread,
    detector: PatternDetector,
    state: WriterState,
    pending: Option<PendingEvent>,
    start_timestamp: Option<u64>,
}

impl ThreadWriter {
    pub fn new(id: u32, archive_id: u32) -> Self {
        Self {
            thread: Thread::new(id, archive_id),
            detector: PatternDetector::new(),
            state: WriterState::Open,
            pending: None,
            start_timestamp: None,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn id(&self) -> u32 {
        self.thread.id
    }

    /// Records one event. Finalizes the *previous* pending event's duration as the gap to
    /// this one's timestamp, interns this event, and dispatches its token into the detector
    /// according to its record kind (spec.md §4.4).
    pub fn record_event(
        &mut self,
        record_kind: RecordKind,
        region: RegionRef,
        comm: pallas_core::CommRef,
        timestamp: u64,
        attributes: &[u8],
    ) -> Result<()> {
        if self.state != WriterState::Open {
            return Err(PallasError::invalid_state(format!(
                "record_event called on a writer in state {:?}",
                self.state
            )));
        }
        self.start_timestamp.get_or_insert(timestamp);
        self.finalize_pending(timestamp);

        let event = Event::new(record_kind, region, comm);
        let token = self.thread.intern_event(event);
        self.thread
            .event_summary_mut(token)
            .expect("just interned")
            .record_occurrence(timestamp, attributes);

        if record_kind.is_enter() {
            self.detector.enter_region(&mut self.thread, region, token, timestamp);
        } else if record_kind.is_leave() {
            self.detector.leave_region(&mut self.thread, region, token, timestamp)?;
        } else {
            self.detector.push_token(&mut self.thread, token);
        }

        self.pending = Some(PendingEvent { token, timestamp });
        Ok(())
    }

    fn finalize_pending(&mut self, next_timestamp: u64) {
        if let Some(pending) = self.pending.take() {
            let duration = next_timestamp.saturating_sub(pending.timestamp);
            self.thread
                .event_summary_mut(pending.token)
                .expect("pending token was interned by this writer")
                .finalize_duration(duration);
        }
    }

    /// Finalizes the last pending event's duration against `close_timestamp`, force-closes
    /// any still-open detector frames, installs the resulting token stream as the thread's
    /// root sequence, and hands the finished [`Thread`] back to the caller (typically an
    /// [`crate::Archive`]).
    pub fn close(mut self, close_timestamp: u64) -> Result<Thread> {
        if self.state != WriterState::Open {
            return Err(PallasError::invalid_state(format!(
                "close called on a writer in state {:?}",
                self.state
            )));
        }
        self.state = WriterState::Closing;
        self.finalize_pending(close_timestamp);

        let root_tokens = self.detector.finish(&mut self.thread, close_timestamp);
        let start = self.start_timestamp.unwrap_or(close_timestamp);
        let duration = close_timestamp.saturating_sub(start);
        self.thread.finalize_root(root_tokens, start, duration);

        self.state = WriterState::Closed;
        Ok(self.thread)
    }
}
