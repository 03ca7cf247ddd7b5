//! Typed chunk framing: every `.pallas` file is a [`FileHeader`] followed by a sequence of
//! `{ kind: u32, uncompressed_size: u64, on_disk_size: u64, bytes }` chunks.
//!
//! An unrecognized chunk kind is skipped with a warning rather than rejected outright, so a
//! newer writer's extra chunks don't break an older reader (SPEC_FULL.md §4.5). A reader
//! missing a chunk its file kind requires is a fatal `FormatError`.

use pallas_core::{PallasError, Result};

use crate::byteio::{ByteWriter, SliceReader};

/// 8 bytes so the header (`MAGIC` + `FORMAT_VERSION` + reserved) is exactly 16 bytes, per
/// SPEC_FULL.md §4.5.
pub const MAGIC: &[u8; 8] = b"PALLAS\0\0";
pub const FORMAT_VERSION: u32 = 1;

/// Attribute bytes are stored inline in each `EventSummary` (`attribute_blob` /
/// `attribute_offsets`, see `codec.rs`) rather than as a separate chunk — see SPEC_FULL.md
/// §4.5's note on `TimestampColumns`/`DurationColumns`/`AttributeBlobs`. There is accordingly
/// no `AttributeBlobs` chunk kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChunkKind {
    StringTable = 1,
    RegionTable = 2,
    GroupTable = 3,
    CommTable = 4,
    LocationGroupTable = 5,
    LocationTable = 6,
    EventTable = 7,
    SequenceTable = 8,
    LoopTable = 9,
    RootSequenceMeta = 10,
    ArchiveIndex = 12,
    ThreadIndex = 13,
}

impl ChunkKind {
    pub fn from_u32(tag: u32) -> Option<Self> {
        Some(match tag {
            1 => ChunkKind::StringTable,
            2 => ChunkKind::RegionTable,
            3 => ChunkKind::GroupTable,
            4 => ChunkKind::CommTable,
            5 => ChunkKind::LocationGroupTable,
            6 => ChunkKind::LocationTable,
            7 => ChunkKind::EventTable,
            8 => ChunkKind::SequenceTable,
            9 => ChunkKind::LoopTable,
            10 => ChunkKind::RootSequenceMeta,
            12 => ChunkKind::ArchiveIndex,
            13 => ChunkKind::ThreadIndex,
            _ => return None,
        })
    }
}

/// One decoded chunk: its raw tag (so an unknown kind can still be reported) and payload.
pub struct RawChunk {
    pub kind_raw: u32,
    pub bytes: Vec<u8>,
}

pub fn write_header<W: ByteWriter>(w: &mut W) {
    w.write_bytes(MAGIC);
    w.write_u32(FORMAT_VERSION);
    w.write_u32(0); // reserved
}

pub fn read_header(r: &mut SliceReader) -> Result<()> {
    let magic = r.read_bytes(MAGIC.len())?;
    if magic != MAGIC {
        return Err(PallasError::format("bad magic: not a Pallas trace file"));
    }
    let version = r.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(PallasError::format(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let _reserved = r.read_u32()?;
    Ok(())
}

pub fn write_chunk<W: ByteWriter>(w: &mut W, kind: ChunkKind, payload: &[u8]) {
    w.write_u32(kind as u32);
    w.write_u64(payload.len() as u64);
    w.write_u64(payload.len() as u64);
    w.write_bytes(payload);
}

/// Reads every chunk in the file body (after the header), surfacing unknown kinds as-is so
/// the caller can log and skip them.
pub fn read_chunks(r: &mut SliceReader) -> Result<Vec<RawChunk>> {
    let mut chunks = Vec::new();
    while !r.is_empty() {
        let kind_raw = r.read_u32()?;
        let uncompressed_size = r.read_u64()? as usize;
        let on_disk_size = r.read_u64()? as usize;
        if uncompressed_size != on_disk_size {
            return Err(PallasError::format(
                "chunk declares mismatched uncompressed/on-disk sizes (no whole-chunk \
                 compression layer is in use)",
            ));
        }
        let bytes = r.read_bytes(on_disk_size)?.to_vec();
        chunks.push(RawChunk { kind_raw, bytes });
    }
    Ok(chunks)
}

/// Finds the single chunk of `kind` among `chunks`, returning a fatal `FormatError` if it is
/// missing (spec.md Design Notes: referenced definitions are validated at read time).
pub fn require<'a>(chunks: &'a [RawChunk], kind: ChunkKind) -> Result<&'a [u8]> {
    chunks
        .iter()
        .find(|c| c.kind_raw == kind as u32)
        .map(|c| c.bytes.as_slice())
        .ok_or_else(|| PallasError::format(format!("missing required chunk {kind:?}")))
}

/// Finds an optional chunk of `kind`, returning `None` (not an error) if absent.
pub fn optional<'a>(chunks: &'a [RawChunk], kind: ChunkKind) -> Option<&'a [u8]> {
    chunks.iter().find(|c| c.kind_raw == kind as u32).map(|c| c.bytes.as_slice())
}

/// Logs and drops any chunk whose tag isn't a known [`ChunkKind`].
pub fn warn_on_unknown_chunks(chunks: &[RawChunk]) {
    for c in chunks {
        if ChunkKind::from_u32(c.kind_raw).is_none() {
            tracing::warn!(kind = c.kind_raw, "skipping unrecognized chunk kind");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_chunk_kind_is_preserved_for_the_caller_to_skip() {
        let mut buf = Vec::new();
        write_chunk(&mut buf, ChunkKind::EventTable, b"abc");
        write_chunk_raw(&mut buf, 999, b"from-the-future");
        let mut r = SliceReader::new(&buf);
        let chunks = read_chunks(&mut r).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(ChunkKind::from_u32(chunks[1].kind_raw).is_none());
    }

    fn write_chunk_raw<W: ByteWriter>(w: &mut W, kind_raw: u32, payload: &[u8]) {
        w.write_u32(kind_raw);
        w.write_u64(payload.len() as u64);
        w.write_u64(payload.len() as u64);
        w.write_bytes(payload);
    }

    #[test]
    fn missing_required_chunk_is_a_format_error() {
        let chunks: Vec<RawChunk> = Vec::new();
        assert!(require(&chunks, ChunkKind::EventTable).is_err());
    }

    #[test]
    fn header_round_trips_and_rejects_bad_magic() {
        let mut buf = Vec::new();
        write_header(&mut buf);
        let mut r = SliceReader::new(&buf);
        assert!(read_header(&mut r).is_ok());

        let mut bad = b"NOTPALLA".to_vec();
        bad.extend_from_slice(&1u32.to_le_bytes());
        bad.extend_from_slice(&0u32.to_le_bytes());
        let mut r = SliceReader::new(&bad);
        assert!(read_header(&mut r).is_err());
    }
}
