//! Serializing and parsing one thread's `.pallas` file: its event, sequence and loop
//! tables.

use pallas_core::{PallasError, Result, Thread};

use crate::byteio::{ByteWriter, Deserializable, SliceReader};
use crate::chunk::{self, ChunkKind};
use crate::codec::{read_vec, write_vec};

pub fn write_thread(thread: &Thread) -> Vec<u8> {
    let mut out = Vec::new();
    chunk::write_header(&mut out);

    let mut meta = Vec::new();
    meta.write_u32(thread.id);
    meta.write_u32(thread.archive_id);
    chunk::write_chunk(&mut out, ChunkKind::RootSequenceMeta, &meta);

    let mut events = Vec::new();
    write_vec(&mut events, thread.events());
    chunk::write_chunk(&mut out, ChunkKind::EventTable, &events);

    let mut sequences = Vec::new();
    write_vec(&mut sequences, thread.sequences());
    write_vec(&mut sequences, thread.all_sequence_occurrences());
    chunk::write_chunk(&mut out, ChunkKind::SequenceTable, &sequences);

    let mut loops = Vec::new();
    write_vec(&mut loops, thread.loops());
    chunk::write_chunk(&mut out, ChunkKind::LoopTable, &loops);

    out
}

pub fn read_thread(bytes: &[u8]) -> Result<Thread> {
    let mut r = SliceReader::new(bytes);
    chunk::read_header(&mut r)?;
    let chunks = chunk::read_chunks(&mut r)?;
    chunk::warn_on_unknown_chunks(&chunks);

    let meta = chunk::require(&chunks, ChunkKind::RootSequenceMeta)?;
    let mut meta_r = SliceReader::new(meta);
    let id = meta_r.read_u32()?;
    let archive_id = meta_r.read_u32()?;

    let mut events_r = SliceReader::new(chunk::require(&chunks, ChunkKind::EventTable)?);
    let events = read_vec(&mut events_r)?;

    let mut seq_r = SliceReader::new(chunk::require(&chunks, ChunkKind::SequenceTable)?);
    let sequences = read_vec(&mut seq_r)?;
    let occurrences = read_vec(&mut seq_r)?;

    let mut loop_r = SliceReader::new(chunk::require(&chunks, ChunkKind::LoopTable)?);
    let loops = read_vec(&mut loop_r)?;

    let thread = Thread::from_tables(id, archive_id, events, sequences, occurrences, loops);
    validate_references(&thread)?;
    Ok(thread)
}

/// Invariant-1-adjacent check: every token that appears in a Sequence body or as a Loop's
/// repeated token must resolve within this thread's own tables (spec.md Design Notes: "the
/// reader validates referenced ids and surfaces a `FormatError` on a dangling reference").
fn validate_references(thread: &Thread) -> Result<()> {
    let check = |token: pallas_core::Token| -> Result<()> {
        use pallas_core::TokenKind;
        match token.kind() {
            TokenKind::Event => {
                if thread.event_summary(token).is_none() {
                    return Err(dangling("event", token));
                }
            },
            TokenKind::Sequence => {
                if thread.sequence(token).is_none() {
                    return Err(dangling("sequence", token));
                }
            },
            TokenKind::Loop => {
                if thread.loop_(token).is_none() {
                    return Err(dangling("loop", token));
                }
            },
            TokenKind::Invalid => return Err(dangling("invalid", token)),
        }
        Ok(())
    };

    for seq in thread.sequences() {
        for &t in &seq.tokens {
            check(t)?;
        }
    }
    for l in thread.loops() {
        check(l.repeated_token)?;
        if !l.is_consistent() {
            return Err(PallasError::corrupt_invariant(
                "Loop.iterations",
                "an iteration count below 2 was read back from disk",
                true,
            ));
        }
    }
    Ok(())
}

fn dangling(table: &str, token: pallas_core::Token) -> PallasError {
    PallasError::format(format!("token {token} references a nonexistent {table} table entry"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pallas_core::{CommRef, Event, RecordKind, RegionRef, Token, ROOT_SEQUENCE_ID};

    #[test]
    fn empty_thread_round_trips() {
        let thread = Thread::new(0, 0);
        let bytes = write_thread(&thread);
        let back = read_thread(&bytes).unwrap();
        assert_eq!(back.id, 0);
        assert!(back.root_sequence().is_empty());
    }

    #[test]
    fn thread_with_events_and_a_loop_round_trips() {
        let mut thread = Thread::new(7, 2);
        let event = Event::new(RecordKind::Singleton, RegionRef::new(1), CommRef::NONE);
        let token = thread.intern_event(event);
        thread.event_summary_mut(token).unwrap().record_occurrence(0, b"");
        thread.event_summary_mut(token).unwrap().finalize_duration(1);

        let seq_token = thread.intern_sequence(vec![token]);
        let loop_token = thread.push_loop(seq_token);
        thread.loop_mut(loop_token).unwrap().record_occurrence(5);
        thread.finalize_root(vec![loop_token], 0, 5);

        let bytes = write_thread(&thread);
        let back = read_thread(&bytes).unwrap();
        assert_eq!(back.root_sequence().tokens, vec![loop_token]);
        assert_eq!(back.loop_(loop_token).unwrap().iterations.at(0), 5);
        assert_eq!(back.sequence(seq_token).unwrap().tokens, vec![token]);
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        let thread = Thread::new(0, 0);
        let mut bytes = write_thread(&thread);
        bytes.truncate(bytes.len() - 4);
        assert!(read_thread(&bytes).is_err());
    }

    #[test]
    fn dangling_sequence_reference_is_rejected() {
        let mut thread = Thread::new(0, 0);
        // A sequence whose token points at an event id that was never interned.
        thread.intern_sequence(vec![Token::event(99)]);
        let bytes = write_thread(&thread);
        assert!(read_thread(&bytes).is_err());
    }

    #[test]
    fn root_sequence_id_constant_matches_thread_layout() {
        assert_eq!(ROOT_SEQUENCE_ID, 0);
    }
}
