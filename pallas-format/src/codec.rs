//! `Serializable`/`Deserializable` implementations for every type in `pallas-core`'s data
//! model. Each chunk in a `.pallas` file is the serialized form of one of these.

use pallas_core::{
    CommDef, CommRef, Column, Encoding, Event, EventSummary, GroupDef, GroupRef, Loop,
    LocationDef, LocationGroupDef, LocationGroupRef, PallasError, RecordKind, RegionDef,
    RegionRef, Result, Sequence, SequenceOccurrences, StringRef, StringTable, Token,
};

use crate::byteio::{ByteWriter, Deserializable, Serializable, SliceReader};

impl Serializable for Token {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        w.write_u32(self.to_u32());
    }
}

impl Deserializable for Token {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        Ok(Token::from_u32(r.read_u32()?))
    }
}

impl Serializable for Column {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        let (encoding, bytes) = self.encode();
        w.write_u8(encoding as u8);
        w.write_u64(self.size() as u64);
        w.write_len_prefixed(&bytes);
    }
}

impl Deserializable for Column {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        let encoding = Encoding::from_u8(r.read_u8()?)?;
        let len = r.read_u64()? as usize;
        let bytes = r.read_len_prefixed()?;
        // Deferred: only the encoded byte shape is checked here, not the values themselves
        // (spec.md §4.2, "the reader restores columns lazily").
        Column::from_lazy(encoding, len, bytes.to_vec())
    }
}

fn write_token_vec<W: ByteWriter>(w: &mut W, tokens: &[Token]) {
    w.write_u64(tokens.len() as u64);
    for t in tokens {
        t.write_into(w);
    }
}

fn read_token_vec(r: &mut SliceReader) -> Result<Vec<Token>> {
    let len = r.read_u64()? as usize;
    (0..len).map(|_| Token::read_from(r)).collect()
}

impl Serializable for Sequence {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        write_token_vec(w, &self.tokens);
    }
}

impl Deserializable for Sequence {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        Ok(Sequence::new(read_token_vec(r)?))
    }
}

impl Serializable for SequenceOccurrences {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        self.durations.write_into(w);
        self.timestamps.write_into(w);
    }
}

impl Deserializable for SequenceOccurrences {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        let durations = Column::read_from(r)?;
        let timestamps = Column::read_from(r)?;
        Ok(SequenceOccurrences { durations, timestamps })
    }
}

impl Serializable for Loop {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        self.repeated_token.write_into(w);
        self.iterations.write_into(w);
    }
}

impl Deserializable for Loop {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        let repeated_token = Token::read_from(r)?;
        let iterations = Column::read_from(r)?;
        if !repeated_token.is_sequence() {
            return Err(PallasError::corrupt_invariant(
                "Loop.repeated_token",
                format!("{repeated_token} is not a Sequence token"),
                true,
            ));
        }
        Ok(Loop { repeated_token, iterations })
    }
}

fn write_ref<W: ByteWriter>(w: &mut W, id: u32) {
    w.write_u32(id);
}

impl Serializable for Event {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        w.write_u16(self.record_kind.to_u16());
        write_ref(w, self.region.0);
        write_ref(w, self.comm.0);
    }
}

impl Deserializable for Event {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        let record_kind = RecordKind::from_u16(r.read_u16()?);
        let region = RegionRef::new(r.read_u32()?);
        let comm = CommRef::new(r.read_u32()?);
        Ok(Event::new(record_kind, region, comm))
    }
}

impl Serializable for EventSummary {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        self.event.write_into(w);
        self.durations.write_into(w);
        self.timestamps.write_into(w);
        w.write_len_prefixed(self.attribute_blob());
        w.write_u64(self.attribute_offsets().len() as u64);
        for &off in self.attribute_offsets() {
            w.write_u32(off);
        }
    }
}

impl Deserializable for EventSummary {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        let event = Event::read_from(r)?;
        let durations = Column::read_from(r)?;
        let timestamps = Column::read_from(r)?;
        let attribute_blob = r.read_len_prefixed()?.to_vec();
        let n_offsets = r.read_u64()? as usize;
        let mut attribute_offsets = Vec::with_capacity(n_offsets);
        for _ in 0..n_offsets {
            attribute_offsets.push(r.read_u32()?);
        }
        Ok(EventSummary::from_parts(event, durations, timestamps, attribute_blob, attribute_offsets))
    }
}

impl Serializable for StringTable {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        w.write_u64(self.len() as u64);
        for s in self.iter() {
            w.write_len_prefixed(s.as_bytes());
        }
    }
}

impl Deserializable for StringTable {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        let len = r.read_u64()? as usize;
        let mut strings = Vec::with_capacity(len);
        for _ in 0..len {
            let bytes = r.read_len_prefixed()?;
            let s = std::str::from_utf8(bytes)
                .map_err(|e| PallasError::format(format!("string table entry is not UTF-8: {e}")))?;
            strings.push(s.to_string());
        }
        Ok(StringTable::from_vec(strings))
    }
}

impl Serializable for RegionDef {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        write_ref(w, self.name.0);
        write_ref(w, self.source_file.0);
    }
}

impl Deserializable for RegionDef {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        Ok(RegionDef {
            name: StringRef::new(r.read_u32()?),
            source_file: StringRef::new(r.read_u32()?),
        })
    }
}

impl Serializable for GroupDef {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        write_ref(w, self.name.0);
        w.write_u64(self.members.len() as u64);
        for &m in &self.members {
            w.write_u32(m);
        }
    }
}

impl Deserializable for GroupDef {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        let name = StringRef::new(r.read_u32()?);
        let len = r.read_u64()? as usize;
        let mut members = smallvec::SmallVec::with_capacity(len);
        for _ in 0..len {
            members.push(r.read_u32()?);
        }
        Ok(GroupDef { name, members })
    }
}

impl Serializable for CommDef {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        write_ref(w, self.name.0);
        write_ref(w, self.group.0);
    }
}

impl Deserializable for CommDef {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        Ok(CommDef { name: StringRef::new(r.read_u32()?), group: GroupRef::new(r.read_u32()?) })
    }
}

impl Serializable for LocationGroupDef {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        write_ref(w, self.name.0);
        write_ref(w, self.parent.0);
    }
}

impl Deserializable for LocationGroupDef {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        Ok(LocationGroupDef {
            name: StringRef::new(r.read_u32()?),
            parent: LocationGroupRef::new(r.read_u32()?),
        })
    }
}

impl Serializable for LocationDef {
    fn write_into<W: ByteWriter>(&self, w: &mut W) {
        write_ref(w, self.name.0);
        write_ref(w, self.parent.0);
    }
}

impl Deserializable for LocationDef {
    fn read_from(r: &mut SliceReader) -> Result<Self> {
        Ok(LocationDef {
            name: StringRef::new(r.read_u32()?),
            parent: LocationGroupRef::new(r.read_u32()?),
        })
    }
}

pub fn write_vec<T: Serializable, W: ByteWriter>(w: &mut W, items: &[T]) {
    w.write_u64(items.len() as u64);
    for item in items {
        item.write_into(w);
    }
}

pub fn read_vec<T: Deserializable>(r: &mut SliceReader) -> Result<Vec<T>> {
    let len = r.read_u64()? as usize;
    (0..len).map(|_| T::read_from(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pallas_core::RecordKind;

    #[test]
    fn event_summary_round_trips() {
        let mut summary = EventSummary::new(Event::new(
            RecordKind::Singleton,
            RegionRef::new(3),
            CommRef::NONE,
        ));
        summary.record_occurrence(0, b"x");
        summary.finalize_duration(10);
        summary.record_occurrence(10, b"yy");
        summary.finalize_duration(5);

        let bytes = summary.to_bytes();
        let back = EventSummary::read_from_bytes(&bytes).unwrap();
        assert_eq!(back.event, summary.event);
        assert_eq!(back.count, summary.count);
        assert_eq!(back.attributes_for(0), b"x");
        assert_eq!(back.attributes_for(1), b"yy");
        assert_eq!(back.durations.iter().collect::<Vec<_>>(), vec![10, 5]);
    }

    #[test]
    fn sequence_and_loop_round_trip() {
        let seq = Sequence::new(vec![Token::event(1), Token::event(2)]);
        let bytes = seq.to_bytes();
        let back = Sequence::read_from_bytes(&bytes).unwrap();
        assert_eq!(back, seq);

        let mut l = Loop::new(Token::sequence(0));
        l.record_occurrence(3);
        let bytes = l.to_bytes();
        let back = Loop::read_from_bytes(&bytes).unwrap();
        assert_eq!(back.repeated_token, l.repeated_token);
        assert_eq!(back.iterations.iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn loop_with_non_sequence_repeated_token_is_rejected_on_read() {
        let mut buf = Vec::new();
        Token::event(0).write_into(&mut buf);
        Column::new().write_into(&mut buf);
        assert!(Loop::read_from_bytes(&buf).is_err());
    }

    #[test]
    fn string_table_round_trips() {
        let mut t = StringTable::new();
        t.intern("main");
        t.intern("loop_body");
        let bytes = t.to_bytes();
        let back = StringTable::read_from_bytes(&bytes).unwrap();
        assert_eq!(back.as_slice(), t.as_slice());
    }
}
