//! [`GlobalArchive`]: the top-level recording session, owning the global definition tables
//! (strings, regions, groups, comms, plus the location-group/location tree) and the set of
//! per-process [`Archive`]s it has opened.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use pallas_core::GlobalDefinitionTables;

use crate::archive::Archive;

/// One whole recording session: the global definitions plus every `Archive` opened under it.
#[derive(Debug)]
pub struct GlobalArchive {
    next_archive_id: AtomicU32,
    definitions: Mutex<GlobalDefinitionTables>,
    archives: Mutex<Vec<Arc<Archive>>>,
}

impl Default for GlobalArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalArchive {
    pub fn new() -> Self {
        Self {
            next_archive_id: AtomicU32::new(0),
            definitions: Mutex::new(GlobalDefinitionTables::new()),
            archives: Mutex::new(Vec::new()),
        }
    }

    /// Opens a new `Archive` for one process, registering it under this session.
    pub fn new_archive(self: &Arc<Self>) -> Arc<Archive> {
        let id = self.next_archive_id.fetch_add(1, Ordering::Relaxed);
        let archive = Arc::new(Archive::new(id, 0));
        self.archives.lock().push(archive.clone());
        archive
    }

    pub fn with_definitions<R>(&self, f: impl FnOnce(&mut GlobalDefinitionTables) -> R) -> R {
        f(&mut self.definitions.lock())
    }

    pub fn archives(&self) -> Vec<Arc<Archive>> {
        self.archives.lock().clone()
    }

    pub fn definitions_snapshot(&self) -> GlobalDefinitionTables {
        self.definitions.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_ids_are_allocated_sequentially() {
        let global = Arc::new(GlobalArchive::new());
        let a = global.new_archive();
        let b = global.new_archive();
        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert_eq!(global.archives().len(), 2);
    }

    #[test]
    fn global_definitions_are_shared_across_archives() {
        let global = Arc::new(GlobalArchive::new());
        let name = global.with_definitions(|defs| defs.base.strings.intern("node0"));
        assert_eq!(global.definitions_snapshot().base.strings.get(name), Some("node0"));
    }
}
