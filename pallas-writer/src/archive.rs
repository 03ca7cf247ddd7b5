//! [`Archive`]: one process's worth of recorded threads plus its per-process definition
//! tables. Locking is brief — acquired only around the `Vec`/table mutation itself, never
//! held across an I/O call (spec.md Design Notes: Archive/GlobalArchive must be safely
//! shareable across the threads being traced).

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use pallas_core::{DefinitionTables, Thread};

/// One process's definitions and recorded threads, shared via `Arc<Archive>` across however
/// many `ThreadWriter`s that process opens.
#[derive(Debug)]
pub struct Archive {
    pub id: u32,
    pub global_id: u32,
    next_thread_id: AtomicU32,
    definitions: Mutex<DefinitionTables>,
    threads: Mutex<Vec<Thread>>,
}

impl Archive {
    pub fn new(id: u32, global_id: u32) -> Self {
        Self {
            id,
            global_id,
            next_thread_id: AtomicU32::new(0),
            definitions: Mutex::new(DefinitionTables::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Allocates the next thread id scoped to this archive.
    pub fn alloc_thread_id(&self) -> u32 {
        self.next_thread_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs `f` with exclusive access to this archive's definition tables. Callers should
    /// keep `f` free of I/O; the lock is only ever meant to guard the table mutation itself.
    pub fn with_definitions<R>(&self, f: impl FnOnce(&mut DefinitionTables) -> R) -> R {
        f(&mut self.definitions.lock())
    }

    pub fn register_thread(&self, thread: Thread) {
        self.threads.lock().push(thread);
    }

    /// Number of threads registered so far.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// Clones out a snapshot of the registered threads and the definition tables, for
    /// writing to disk without holding the lock across the write itself.
    pub fn snapshot(&self) -> (DefinitionTables, Vec<Thread>) {
        (self.definitions.lock().clone(), self.threads.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_ids_are_allocated_sequentially() {
        let archive = Archive::new(0, 0);
        assert_eq!(archive.alloc_thread_id(), 0);
        assert_eq!(archive.alloc_thread_id(), 1);
        assert_eq!(archive.alloc_thread_id(), 2);
    }

    #[test]
    fn registered_threads_accumulate() {
        let archive = Archive::new(0, 0);
        archive.register_thread(Thread::new(0, 0));
        archive.register_thread(Thread::new(1, 0));
        assert_eq!(archive.thread_count(), 2);
        let (_, threads) = archive.snapshot();
        assert_eq!(threads.len(), 2);
    }

    #[test]
    fn definitions_are_mutated_through_the_closure() {
        let archive = Archive::new(0, 0);
        let name = archive.with_definitions(|defs| defs.strings.intern("main"));
        let (defs, _) = archive.snapshot();
        assert_eq!(defs.strings.get(name), Some("main"));
    }
}
