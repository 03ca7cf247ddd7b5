//! [`Event`], the opaque immutable record describing one instrumented action, and
//! [`EventSummary`], the per-distinct-event aggregate a `Thread` keeps.

use crate::column::Column;
use crate::definitions::{CommRef, RegionRef};

/// The record type an [`Event`] carries. Left open-ended (`Other`) rather than enumerating
/// the whole OTF2 vocabulary, matching the original's fallback-to-"Unknown" behavior for
/// unmapped record kinds (see SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    EnterRegion,
    LeaveRegion,
    /// A point event with no matching Leave (e.g. an MPI collective marker).
    Singleton,
    MpiSend,
    MpiRecv,
    MetricSample,
    ThreadBegin,
    ThreadEnd,
    /// Anything the core does not special-case; the raw code is preserved for the reader.
    Other(u16),
}

impl RecordKind {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordKind::EnterRegion => 0,
            RecordKind::LeaveRegion => 1,
            RecordKind::Singleton => 2,
            RecordKind::MpiSend => 3,
            RecordKind::MpiRecv => 4,
            RecordKind::MetricSample => 5,
            RecordKind::ThreadBegin => 6,
            RecordKind::ThreadEnd => 7,
            RecordKind::Other(code) => code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => RecordKind::EnterRegion,
            1 => RecordKind::LeaveRegion,
            2 => RecordKind::Singleton,
            3 => RecordKind::MpiSend,
            4 => RecordKind::MpiRecv,
            5 => RecordKind::MetricSample,
            6 => RecordKind::ThreadBegin,
            7 => RecordKind::ThreadEnd,
            other => RecordKind::Other(other),
        }
    }

    pub fn is_enter(self) -> bool {
        matches!(self, RecordKind::EnterRegion)
    }

    pub fn is_leave(self) -> bool {
        matches!(self, RecordKind::LeaveRegion)
    }
}

/// One instrumented action. Immutable once recorded; two calls describing the same record
/// kind, region and communicator are the *same* `Event` (and share one `EventSummary`) even
/// if their timestamps and attributes differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    pub record_kind: RecordKind,
    pub region: RegionRef,
    pub comm: CommRef,
}

impl Event {
    pub fn new(record_kind: RecordKind, region: RegionRef, comm: CommRef) -> Self {
        Self { record_kind, region, comm }
    }

    pub fn enter(region: RegionRef) -> Self {
        Self::new(RecordKind::EnterRegion, region, CommRef::NONE)
    }

    pub fn leave(region: RegionRef) -> Self {
        Self::new(RecordKind::LeaveRegion, region, CommRef::NONE)
    }
}

/// Raw per-occurrence attribute payload. The core treats this as an opaque byte blob
/// (spec.md: "attribute blob"); encoding the actual key/value schema is a collaborator
/// concern (the OTF2 shim / Python layer), not the core's.
pub type Attributes = Vec<u8>;

/// One per distinct [`Event`] within a thread: the canonical value, a duration column, a
/// timestamp column, an attribute blob (concatenated, offset-delimited), and the occurrence
/// count. Invariant: `durations.size() == timestamps.size() == count` and
/// `attribute_offsets.len() == count + 1`.
#[derive(Debug, Clone)]
pub struct EventSummary {
    pub event: Event,
    pub durations: Column,
    pub timestamps: Column,
    attribute_blob: Vec<u8>,
    attribute_offsets: Vec<u32>,
    pub count: u64,
}

impl EventSummary {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            durations: Column::new(),
            timestamps: Column::new(),
            attribute_blob: Vec::new(),
            attribute_offsets: vec![0],
            count: 0,
        }
    }

    /// Records one occurrence's timestamp and attributes. The occurrence's duration is
    /// filled in later by [`EventSummary::finalize_duration`] once the next event at the
    /// same thread depth is observed (spec.md §4.4).
    pub fn record_occurrence(&mut self, timestamp: u64, attributes: &[u8]) {
        self.timestamps.push(timestamp);
        self.attribute_blob.extend_from_slice(attributes);
        self.attribute_offsets.push(self.attribute_blob.len() as u32);
        self.count += 1;
    }

    pub fn finalize_duration(&mut self, duration_ns: u64) {
        self.durations.push(duration_ns);
    }

    pub fn attributes_for(&self, occurrence: usize) -> &[u8] {
        let start = self.attribute_offsets[occurrence] as usize;
        let end = self.attribute_offsets[occurrence + 1] as usize;
        &self.attribute_blob[start..end]
    }

    pub fn attribute_blob(&self) -> &[u8] {
        &self.attribute_blob
    }

    pub fn attribute_offsets(&self) -> &[u32] {
        &self.attribute_offsets
    }

    pub fn from_parts(
        event: Event,
        durations: Column,
        timestamps: Column,
        attribute_blob: Vec<u8>,
        attribute_offsets: Vec<u32>,
    ) -> Self {
        let count = timestamps.size() as u64;
        Self { event, durations, timestamps, attribute_blob, attribute_offsets, count }
    }

    /// Invariant: the column lengths equal the occurrence count (spec.md §3).
    pub fn is_consistent(&self) -> bool {
        self.timestamps.size() as u64 == self.count
            && self.durations.size() as u64 <= self.count
            && self.attribute_offsets.len() as u64 == self.count + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrence_and_duration_counts_stay_consistent() {
        let mut summary = EventSummary::new(Event::enter(RegionRef::new(0)));
        summary.record_occurrence(0, b"a");
        summary.finalize_duration(5);
        summary.record_occurrence(5, b"bb");
        summary.finalize_duration(3);
        assert!(summary.is_consistent());
        assert_eq!(summary.count, 2);
        assert_eq!(summary.attributes_for(0), b"a");
        assert_eq!(summary.attributes_for(1), b"bb");
    }
}
