//! On-disk storage format for a Pallas trace: a small binary container (magic, version,
//! typed chunks) plus the directory layout tying one `main.pallas`, N `archive_<id>/`
//! directories and their `thread_<tid>.pallas` files together (spec.md §4.5).
//!
//! This crate owns exactly the wire format: byte-level I/O primitives ([`byteio`]), chunk
//! framing ([`chunk`]), `Serializable`/`Deserializable` impls for the core data model
//! ([`codec`]), per-file (de)serialization ([`thread_file`], [`archive_file`],
//! [`global_file`]) and the directory conventions ([`layout`]).

pub mod archive_file;
pub mod byteio;
pub mod chunk;
pub mod codec;
pub mod global_file;
pub mod layout;
pub mod thread_file;

pub use archive_file::{read_archive, write_archive, ParsedArchive};
pub use byteio::{ByteWriter, Deserializable, Serializable, SliceReader};
pub use chunk::{ChunkKind, FORMAT_VERSION, MAGIC};
pub use global_file::{read_global, write_global, ParsedGlobal};
pub use thread_file::{read_thread, write_thread};

use std::fs;
use std::path::Path;

use pallas_core::{DefinitionTables, GlobalDefinitionTables, PallasError, Result, Thread};

/// Writes `thread` to `root/archive_<archive_id>/thread_<thread.id>.pallas`, creating the
/// archive directory if needed.
pub fn store_thread(root: &Path, thread: &Thread) -> Result<()> {
    let dir = layout::archive_dir(root, thread.archive_id);
    fs::create_dir_all(&dir).map_err(PallasError::Io)?;
    let path = layout::thread_file(root, thread.archive_id, thread.id);
    fs::write(&path, write_thread(thread)).map_err(PallasError::Io)
}

/// Reads back a thread file written by [`store_thread`]. Uses a memory map rather than a
/// buffered read so that large trace files don't require copying their full contents into a
/// heap buffer up front; only the bytes individual chunks/columns actually need get copied
/// out, and per-column decoding further defers until first access (`Column::from_lazy`).
pub fn load_thread(root: &Path, archive_id: u32, thread_id: u32) -> Result<Thread> {
    let path = layout::thread_file(root, archive_id, thread_id);
    let mmap = map_file(&path)?;
    read_thread(&mmap)
}

pub fn store_archive(
    root: &Path,
    archive_id: u32,
    defs: &DefinitionTables,
    thread_ids: &[u32],
) -> Result<()> {
    let dir = layout::archive_dir(root, archive_id);
    fs::create_dir_all(&dir).map_err(PallasError::Io)?;
    let path = layout::archive_file(root, archive_id);
    fs::write(&path, write_archive(archive_id, defs, thread_ids)).map_err(PallasError::Io)
}

pub fn load_archive(root: &Path, archive_id: u32) -> Result<ParsedArchive> {
    let path = layout::archive_file(root, archive_id);
    let mmap = map_file(&path)?;
    read_archive(&mmap)
}

pub fn store_global(root: &Path, defs: &GlobalDefinitionTables, archive_ids: &[u32]) -> Result<()> {
    fs::create_dir_all(root).map_err(PallasError::Io)?;
    let path = layout::main_file(root);
    fs::write(&path, write_global(defs, archive_ids)).map_err(PallasError::Io)
}

pub fn load_global(root: &Path) -> Result<ParsedGlobal> {
    let path = layout::main_file(root);
    let mmap = map_file(&path)?;
    read_global(&mmap)
}

/// Memory-maps `path` without copying its contents: `read_thread`/`read_archive`/
/// `read_global` borrow directly from the mapping, and each chunk/column is only copied out
/// of it (as a much smaller, owned `Vec<u8>`) where ownership genuinely needs to outlive the
/// mapping (`chunk::read_chunks`, `Column::from_lazy`).
fn map_file(path: &Path) -> Result<memmap2::Mmap> {
    let file = fs::File::open(path).map_err(|e| pallas_core::error::with_path(e, path))?;
    // SAFETY: the file is only ever read through this mapping; external mutation of the file
    // during the read is the worst case (a torn read surfaced as a FormatError downstream),
    // never a dangling reference.
    unsafe { memmap2::Mmap::map(&file) }.map_err(PallasError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pallas_core::{CommRef, Event, RecordKind, RegionRef};

    #[test]
    fn store_and_load_thread_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut thread = Thread::new(0, 1);
        let token = thread
            .intern_event(Event::new(RecordKind::Singleton, RegionRef::new(0), CommRef::NONE));
        thread.finalize_root(vec![token], 0, 0);

        store_thread(dir.path(), &thread).unwrap();
        let back = load_thread(dir.path(), 1, 0).unwrap();
        assert_eq!(back.root_sequence().tokens, vec![token]);
    }

    #[test]
    fn loading_a_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_thread(dir.path(), 0, 0).is_err());
    }
}
