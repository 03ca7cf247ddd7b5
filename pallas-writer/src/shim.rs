//! The narrow surface a collector (e.g. an OTF2 interposition shim) actually calls:
//! open a session, open a process under it, open a thread under that, record events, close
//! in reverse order. Ordinary Rust functions over `Arc` handles — not `extern "C"`, since
//! exposing a stable C ABI is a separate concern from implementing the recording semantics.

use std::path::Path;
use std::sync::Arc;

use pallas_core::{CommRef, RecordKind, RegionRef, Result};

use crate::archive::Archive;
use crate::global_archive::GlobalArchive;
use crate::thread_writer::ThreadWriter;

pub fn global_archive_new() -> Arc<GlobalArchive> {
    Arc::new(GlobalArchive::new())
}

pub fn archive_new(global: &Arc<GlobalArchive>) -> Arc<Archive> {
    global.new_archive()
}

/// Symmetric counterpart to [`archive_new`]. Persistence happens once, at
/// [`global_archive_close`], when the full set of archives is known; this only exists so a
/// collector that closes processes as it goes has something to call per process.
pub fn archive_close(_archive: &Arc<Archive>) -> Result<()> {
    Ok(())
}

pub fn thread_writer_new(archive: &Arc<Archive>) -> ThreadWriter {
    ThreadWriter::new(archive.alloc_thread_id(), archive.id)
}

pub fn record_event(
    writer: &mut ThreadWriter,
    record_kind: RecordKind,
    region: RegionRef,
    comm: CommRef,
    timestamp: u64,
    attributes: &[u8],
) -> Result<()> {
    writer.record_event(record_kind, region, comm, timestamp, attributes)
}

pub fn thread_writer_close(
    writer: ThreadWriter,
    archive: &Archive,
    close_timestamp: u64,
) -> Result<()> {
    let thread = writer.close(close_timestamp)?;
    archive.register_thread(thread);
    Ok(())
}

pub fn global_archive_close(global: &Arc<GlobalArchive>, root: &Path) -> Result<()> {
    store_global_archive(global, root)
}

/// Writes every archive's definitions and threads, then the global `main.pallas`, under
/// `root` (spec.md §4.5's directory layout).
pub fn store_global_archive(global: &GlobalArchive, root: &Path) -> Result<()> {
    let archives = global.archives();
    let mut archive_ids = Vec::with_capacity(archives.len());

    for archive in &archives {
        let (defs, threads) = archive.snapshot();
        let thread_ids: Vec<u32> = threads.iter().map(|t| t.id).collect();
        pallas_format::store_archive(root, archive.id, &defs, &thread_ids)?;
        for thread in &threads {
            pallas_format::store_thread(root, thread)?;
        }
        archive_ids.push(archive.id);
    }

    pallas_format::store_global(root, &global.definitions_snapshot(), &archive_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pallas_core::RegionRef as R;

    #[test]
    fn full_session_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let global = global_archive_new();
        let archive = archive_new(&global);
        let region = archive.with_definitions(|defs| {
            let name = defs.strings.intern("main");
            defs.regions.push(pallas_core::RegionDef { name, source_file: pallas_core::StringRef::NONE })
        });

        let mut writer = thread_writer_new(&archive);
        record_event(&mut writer, RecordKind::EnterRegion, R::new(region.0), CommRef::NONE, 0, b"")
            .unwrap();
        record_event(&mut writer, RecordKind::LeaveRegion, R::new(region.0), CommRef::NONE, 10, b"")
            .unwrap();
        thread_writer_close(writer, &archive, 10).unwrap();
        archive_close(&archive).unwrap();

        global_archive_close(&global, dir.path()).unwrap();

        let parsed_global = pallas_format::load_global(dir.path()).unwrap();
        assert_eq!(parsed_global.archive_ids, vec![0]);
        let parsed_archive = pallas_format::load_archive(dir.path(), 0).unwrap();
        assert_eq!(parsed_archive.thread_ids, vec![0]);
        let thread = pallas_format::load_thread(dir.path(), 0, 0).unwrap();
        assert_eq!(thread.root_sequence().len(), 1);
    }
}
