//! [`LinkedVector`], the chunked append-only column storage, and the typed [`Column`]
//! wrapper that tracks running summary statistics and knows how to compress itself.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use crate::error::{PallasError, Result};

/// Number of `u64` entries per [`LinkedVector`] chunk.
///
/// Chunks are appended, never moved or reallocated, so that old element addresses stay
/// stable while a writer is still appending (spec.md Design Notes, "Column growth").
pub const CHUNK_SIZE: usize = 1024;

/// A chain of fixed-size chunks supporting O(1) amortized append and O(1) indexed read,
/// without ever materializing the whole column into one contiguous allocation.
#[derive(Debug, Default, Clone)]
pub struct LinkedVector {
    chunks: Vec<Box<[u64; CHUNK_SIZE]>>,
    len: usize,
}

impl LinkedVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: u64) {
        let chunk_idx = self.len / CHUNK_SIZE;
        let slot = self.len % CHUNK_SIZE;
        if chunk_idx == self.chunks.len() {
            self.chunks.push(Box::new([0u64; CHUNK_SIZE]));
        }
        self.chunks[chunk_idx][slot] = value;
        self.len += 1;
    }

    /// O(1) indexed read. Panics if `i >= len()`, matching slice indexing semantics.
    pub fn at(&self, i: usize) -> u64 {
        assert!(i < self.len, "index {i} out of bounds for column of length {}", self.len);
        self.chunks[i / CHUNK_SIZE][i % CHUNK_SIZE]
    }

    pub fn front(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.at(0))
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.at(i))
    }

    /// Builds a `LinkedVector` from an iterator, used by the format reader when decoding a
    /// column back from disk.
    pub fn from_iter_u64(values: impl IntoIterator<Item = u64>) -> Self {
        let mut v = Self::new();
        for value in values {
            v.push(value);
        }
        v
    }
}

/// The four exact running statistics every column must maintain, per spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnStats {
    pub min: u64,
    pub max: u64,
    pub mean: u64,
    pub size: usize,
    sum: u128,
}

impl Default for ColumnStats {
    fn default() -> Self {
        Self { min: u64::MAX, max: 0, mean: 0, size: 0, sum: 0 }
    }
}

impl ColumnStats {
    fn observe(&mut self, value: u64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.size += 1;
        self.sum += value as u128;
        self.mean = (self.sum / self.size as u128) as u64;
    }

    /// Invariant 4: `min <= mean <= max` and `size` equals the number of appended values.
    pub fn is_consistent(&self) -> bool {
        if self.size == 0 {
            return self.min == u64::MAX && self.max == 0 && self.mean == 0;
        }
        self.min <= self.mean && self.mean <= self.max
    }
}

/// The on-disk encoding chosen for one column at flush time. Self-describing: the reader
/// decodes purely from this tag, so the writer may choose a different scheme across flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    Raw = 0,
    Masked = 1,
    Zstd = 2,
    Histogram = 3,
}

impl Encoding {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Encoding::Raw),
            1 => Ok(Encoding::Masked),
            2 => Ok(Encoding::Zstd),
            3 => Ok(Encoding::Histogram),
            other => Err(PallasError::Format(format!("unknown column encoding tag {other}"))),
        }
    }
}

/// The still-encoded payload behind a [`Column`] read back from disk. Decoding (unpacking
/// `MASKED` bits, inflating `ZSTD`, resolving `HISTOGRAM` indices) is deferred until the
/// column's values are actually needed, and cached so repeated access decodes at most once
/// regardless of how many times the `Column` is cloned (spec.md §4.2: "the reader restores
/// columns lazily").
#[derive(Debug)]
struct LazyColumn {
    encoding: Encoding,
    len: usize,
    bytes: Vec<u8>,
    decoded: OnceLock<(LinkedVector, ColumnStats)>,
}

impl LazyColumn {
    fn materialize(&self) -> &(LinkedVector, ColumnStats) {
        self.decoded.get_or_init(|| {
            let values = decode_values(self.encoding, self.len, &self.bytes)
                .expect("shape was already validated when this column was read");
            let mut stats = ColumnStats::default();
            for &v in &values {
                stats.observe(v);
            }
            (LinkedVector::from_iter_u64(values), stats)
        })
    }
}

#[derive(Debug, Clone)]
enum ColumnStorage {
    Eager { values: LinkedVector, stats: ColumnStats },
    Lazy(Arc<LazyColumn>),
}

impl Default for ColumnStorage {
    fn default() -> Self {
        ColumnStorage::Eager { values: LinkedVector::default(), stats: ColumnStats::default() }
    }
}

/// An append-only typed column: either values pushed directly (a writer in progress) or a
/// still-encoded payload decoded from disk on first access (a column just read back).
#[derive(Debug, Default, Clone)]
pub struct Column {
    storage: ColumnStorage,
}

impl Column {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> &LinkedVector {
        match &self.storage {
            ColumnStorage::Eager { values, .. } => values,
            ColumnStorage::Lazy(lazy) => &lazy.materialize().0,
        }
    }

    pub fn push(&mut self, value: u64) {
        match &mut self.storage {
            ColumnStorage::Eager { values, stats } => {
                values.push(value);
                stats.observe(value);
            },
            ColumnStorage::Lazy(_) => panic!("push on a lazily-decoded column read from disk"),
        }
    }

    /// Overwrites the last entry in place and recomputes statistics from scratch.
    ///
    /// Used by the pattern detector to grow an in-progress loop's iteration count as more
    /// repetitions are observed, without treating each bump as a distinct occurrence. Chunks
    /// are never reallocated by this (only a value already written into an existing chunk is
    /// overwritten), so it does not disturb the pointer-stability guarantee append relies on.
    /// O(size()); fine for counters bumped a bounded number of times, not a general-purpose op.
    pub fn replace_last(&mut self, value: u64) {
        let ColumnStorage::Eager { values, stats } = &mut self.storage else {
            panic!("replace_last on a lazily-decoded column read from disk");
        };
        let last = values.len().checked_sub(1).expect("replace_last on empty column");
        values.chunks[last / CHUNK_SIZE][last % CHUNK_SIZE] = value;
        *stats = ColumnStats::default();
        for v in values.iter() {
            stats.observe(v);
        }
    }

    pub fn at(&self, i: usize) -> u64 {
        self.values().at(i)
    }

    pub fn front(&self) -> Option<u64> {
        self.values().front()
    }

    pub fn size(&self) -> usize {
        match &self.storage {
            ColumnStorage::Eager { values, .. } => values.len(),
            ColumnStorage::Lazy(lazy) => lazy.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn stats(&self) -> ColumnStats {
        match &self.storage {
            ColumnStorage::Eager { stats, .. } => *stats,
            ColumnStorage::Lazy(lazy) => lazy.materialize().1,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.values().iter()
    }

    /// Exposes a contiguous little-endian byte view of `len` values starting at `start`,
    /// without going through `push`/`at`. Ranges that fall within a single `LinkedVector`
    /// chunk are returned borrowed, zero-copy; a range spanning a chunk boundary falls back
    /// to a materializing copy (SPEC_FULL.md §6.3).
    pub fn as_bytes_range(&self, start: usize, len: usize) -> Cow<'_, [u8]> {
        let end = start.checked_add(len).expect("range overflow");
        assert!(end <= self.size(), "range [{start}, {end}) out of bounds for column");
        if len == 0 {
            return Cow::Borrowed(&[]);
        }

        let values = self.values();
        let chunk_idx = start / CHUNK_SIZE;
        let slot = start % CHUNK_SIZE;
        if slot + len <= CHUNK_SIZE {
            let chunk = &values.chunks[chunk_idx];
            // SAFETY: `chunk` is a `[u64; CHUNK_SIZE]` with no padding; reinterpreting
            // `len` consecutive elements starting at `slot` as bytes is valid as long as
            // this process's native byte order is little-endian, matching every on-disk
            // encoding/decoding path in this module (`encode_raw`/`decode_raw` etc., which
            // all use `to_le_bytes`/`from_le_bytes` explicitly).
            let bytes = unsafe {
                std::slice::from_raw_parts(chunk.as_ptr().add(slot) as *const u8, len * 8)
            };
            return Cow::Borrowed(bytes);
        }

        let mut out = Vec::with_capacity(len * 8);
        for i in start..end {
            out.extend_from_slice(&values.at(i).to_le_bytes());
        }
        Cow::Owned(out)
    }

    /// Builds a `Column` from already-decoded values, recomputing stats from scratch. Used
    /// by the format reader's tests and by code that already holds plain values in memory.
    pub fn from_values(values: impl IntoIterator<Item = u64>) -> Self {
        let mut col = Self::new();
        for v in values {
            col.push(v);
        }
        col
    }

    /// Chooses an encoding and produces the serialized byte payload for this column,
    /// per the heuristic documented in SPEC_FULL.md §4.2.
    pub fn encode(&self) -> (Encoding, Vec<u8>) {
        let len = self.size();
        if len < 16 {
            return (Encoding::Raw, self.encode_raw());
        }

        let distinct: rustc_hash::FxHashSet<u64> = self.iter().collect();
        if distinct.len() <= (len / 8).max(1) && distinct.len() <= 4096 {
            return (Encoding::Histogram, self.encode_histogram(&distinct));
        }

        let width = bit_width(self.stats().max);
        if width > 0 && width <= 48 {
            return (Encoding::Masked, self.encode_masked(width));
        }

        (Encoding::Zstd, self.encode_zstd())
    }

    fn encode_raw(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size() * 8);
        for v in self.iter() {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn encode_masked(&self, width: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&width.to_le_bytes());
        let mut bit_buf: u64 = 0;
        let mut bit_len: u32 = 0;
        for v in self.iter() {
            bit_buf |= (v & mask_for(width)) << bit_len;
            bit_len += width;
            while bit_len >= 8 {
                out.push((bit_buf & 0xFF) as u8);
                bit_buf >>= 8;
                bit_len -= 8;
            }
        }
        if bit_len > 0 {
            out.push((bit_buf & 0xFF) as u8);
        }
        out
    }

    fn encode_zstd(&self) -> Vec<u8> {
        let raw = self.encode_raw();
        zstd::encode_all(&raw[..], 3).expect("in-memory zstd encode is infallible")
    }

    fn encode_histogram(&self, distinct: &rustc_hash::FxHashSet<u64>) -> Vec<u8> {
        let mut dict: Vec<u64> = distinct.iter().copied().collect();
        dict.sort_unstable();
        let index_of: rustc_hash::FxHashMap<u64, u32> =
            dict.iter().enumerate().map(|(i, &v)| (v, i as u32)).collect();

        let mut out = Vec::new();
        out.extend_from_slice(&(dict.len() as u32).to_le_bytes());
        for v in &dict {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in self.iter() {
            out.extend_from_slice(&index_of[&v].to_le_bytes());
        }
        out
    }

    /// Wraps an encoded column payload previously produced by [`Column::encode`] for lazy,
    /// on-demand decoding: the byte shape is checked now, but unpacking/decompressing into
    /// actual values is deferred to the first `at`/`iter`/`stats`/`front` call.
    pub fn from_lazy(encoding: Encoding, len: usize, bytes: Vec<u8>) -> Result<Column> {
        validate_encoded_shape(encoding, len, &bytes)?;
        Ok(Column {
            storage: ColumnStorage::Lazy(Arc::new(LazyColumn {
                encoding,
                len,
                bytes,
                decoded: OnceLock::new(),
            })),
        })
    }

    /// Decodes a column previously produced by [`Column::encode`] immediately. Used directly
    /// by in-memory callers (tests, anything not going through the lazy disk-read path); the
    /// disk-read path uses [`Column::from_lazy`] instead.
    pub fn decode(encoding: Encoding, len: usize, bytes: &[u8]) -> Result<Column> {
        let values = decode_values(encoding, len, bytes)?;
        Ok(Column::from_values(values))
    }
}

fn validate_encoded_shape(encoding: Encoding, len: usize, bytes: &[u8]) -> Result<()> {
    match encoding {
        Encoding::Raw => {
            if bytes.len() != len * 8 {
                return Err(PallasError::Format(format!(
                    "RAW column expected {} bytes, found {}",
                    len * 8,
                    bytes.len()
                )));
            }
        },
        Encoding::Masked if len > 0 => {
            if bytes.len() < 4 {
                return Err(PallasError::Format("MASKED column missing width header".into()));
            }
        },
        Encoding::Histogram => {
            if bytes.len() < 4 {
                return Err(PallasError::Format("HISTOGRAM column missing dictionary size".into()));
            }
        },
        Encoding::Masked | Encoding::Zstd => {},
    }
    Ok(())
}

fn decode_values(encoding: Encoding, len: usize, bytes: &[u8]) -> Result<Vec<u64>> {
    let values = match encoding {
        Encoding::Raw => decode_raw(bytes, len)?,
        Encoding::Masked => decode_masked(bytes, len)?,
        Encoding::Zstd => {
            let raw =
                zstd::decode_all(bytes).map_err(|e| PallasError::Io(std::io::Error::other(e)))?;
            decode_raw(&raw, len)?
        },
        Encoding::Histogram => decode_histogram(bytes, len)?,
    };
    if values.len() != len {
        return Err(PallasError::Format(format!(
            "column declared length {len} but decoded {} values",
            values.len()
        )));
    }
    Ok(values)
}

fn bit_width(max: u64) -> u32 {
    64 - max.leading_zeros()
}

fn mask_for(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn decode_raw(bytes: &[u8], len: usize) -> Result<Vec<u64>> {
    if bytes.len() != len * 8 {
        return Err(PallasError::Format(format!(
            "RAW column expected {} bytes, found {}",
            len * 8,
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn decode_masked(bytes: &[u8], len: usize) -> Result<Vec<u64>> {
    if bytes.len() < 4 {
        return Err(PallasError::Format("MASKED column missing width header".into()));
    }
    let width = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let payload = &bytes[4..];
    let mut values = Vec::with_capacity(len);
    let mut bit_buf: u64 = 0;
    let mut bit_len: u32 = 0;
    let mut byte_iter = payload.iter();
    for _ in 0..len {
        while bit_len < width {
            let next = *byte_iter
                .next()
                .ok_or_else(|| PallasError::Format("MASKED column truncated".into()))?;
            bit_buf |= (next as u64) << bit_len;
            bit_len += 8;
        }
        values.push(bit_buf & mask_for(width));
        bit_buf >>= width;
        bit_len -= width;
    }
    Ok(values)
}

fn decode_histogram(bytes: &[u8], len: usize) -> Result<Vec<u64>> {
    if bytes.len() < 4 {
        return Err(PallasError::Format("HISTOGRAM column missing dictionary size".into()));
    }
    let dict_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let dict_bytes_end = 4 + dict_len * 8;
    if bytes.len() < dict_bytes_end {
        return Err(PallasError::Format("HISTOGRAM column truncated dictionary".into()));
    }
    let dict: Vec<u64> = bytes[4..dict_bytes_end]
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();

    let index_bytes = &bytes[dict_bytes_end..];
    if index_bytes.len() != len * 4 {
        return Err(PallasError::Format(format!(
            "HISTOGRAM column expected {} index bytes, found {}",
            len * 4,
            index_bytes.len()
        )));
    }
    index_bytes
        .chunks_exact(4)
        .map(|c| {
            let idx = u32::from_le_bytes(c.try_into().unwrap()) as usize;
            dict.get(idx).copied().ok_or_else(|| {
                PallasError::Format(format!("HISTOGRAM index {idx} out of range"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_vector_spans_multiple_chunks() {
        let mut v = LinkedVector::new();
        for i in 0..(CHUNK_SIZE * 3 + 7) as u64 {
            v.push(i);
        }
        assert_eq!(v.len(), CHUNK_SIZE * 3 + 7);
        for i in 0..v.len() {
            assert_eq!(v.at(i), i as u64);
        }
    }

    #[test]
    fn stats_invariant_holds_for_monotone_data() {
        let mut col = Column::new();
        for v in [10u64, 20, 5, 100, 50] {
            col.push(v);
        }
        let stats = col.stats();
        assert!(stats.is_consistent());
        assert_eq!(stats.min, 5);
        assert_eq!(stats.max, 100);
        assert_eq!(stats.size, 5);
    }

    #[test]
    fn replace_last_updates_value_and_stats() {
        let mut col = Column::new();
        col.push(1);
        col.push(2);
        col.replace_last(10);
        assert_eq!(col.at(1), 10);
        assert_eq!(col.stats().max, 10);
        assert_eq!(col.size(), 2);
    }

    #[test]
    fn empty_column_stats_are_consistent() {
        let col = Column::new();
        assert!(col.stats().is_consistent());
    }

    fn round_trip(values: Vec<u64>) {
        let mut col = Column::new();
        for v in &values {
            col.push(*v);
        }
        let (encoding, bytes) = col.encode();
        let decoded = Column::decode(encoding, values.len(), &bytes).unwrap();
        assert_eq!(decoded.iter().collect::<Vec<_>>(), values);
    }

    #[test]
    fn raw_round_trip_for_short_column() {
        round_trip(vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn masked_round_trip_for_small_range() {
        round_trip((0..200u64).map(|i| i % 7).collect());
    }

    #[test]
    fn histogram_round_trip_for_low_cardinality() {
        round_trip((0..5000u64).map(|i| (i % 3) * 1000).collect());
    }

    #[test]
    fn zstd_round_trip_for_high_entropy_wide_values() {
        let values: Vec<u64> = (0..5000u64).map(|i| i.wrapping_mul(2654435761)).collect();
        round_trip(values);
    }

    #[test]
    fn as_bytes_range_within_one_chunk_matches_individual_reads() {
        let col = Column::from_values(0..100u64);
        let bytes = col.as_bytes_range(10, 5);
        let expected: Vec<u8> = (10..15u64).flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(&*bytes, expected.as_slice());
    }

    #[test]
    fn as_bytes_range_across_a_chunk_boundary_falls_back_to_a_copy() {
        let col = Column::from_values(0..(CHUNK_SIZE as u64 + 10));
        let start = CHUNK_SIZE - 3;
        let bytes = col.as_bytes_range(start, 6);
        let expected: Vec<u8> =
            (start..start + 6).flat_map(|i| (i as u64).to_le_bytes()).collect();
        assert_eq!(&*bytes, expected.as_slice());
    }

    #[test]
    fn lazily_decoded_column_materializes_on_first_access_and_matches_eager_values() {
        let values: Vec<u64> = (0..200u64).map(|i| i % 7).collect();
        let mut eager = Column::new();
        for &v in &values {
            eager.push(v);
        }
        let (encoding, bytes) = eager.encode();

        let lazy = Column::from_lazy(encoding, values.len(), bytes).unwrap();
        assert_eq!(lazy.size(), values.len());
        assert_eq!(lazy.iter().collect::<Vec<_>>(), values);
        assert_eq!(lazy.stats(), eager.stats());
        // Repeated access and cloning must keep returning the same, already-decoded values.
        let cloned = lazy.clone();
        assert_eq!(cloned.at(50), values[50]);
    }

    #[test]
    fn from_lazy_rejects_a_truncated_raw_payload() {
        assert!(Column::from_lazy(Encoding::Raw, 4, vec![0u8; 8]).is_err());
    }
}
