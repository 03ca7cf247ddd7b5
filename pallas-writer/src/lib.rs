//! Live trace recording: [`ThreadWriter`]'s Open/Closing/Closed state machine,
//! [`Archive`] (a process's threads and per-process definitions) and [`GlobalArchive`] (all
//! archives and the global definitions), plus the OTF2-shim-facing functions named in
//! spec.md §6.

mod archive;
mod global_archive;
mod shim;
mod thread_writer;

pub use archive::Archive;
pub use global_archive::GlobalArchive;
pub use shim::{
    archive_close, archive_new, global_archive_close, global_archive_new, record_event,
    store_global_archive, thread_writer_close, thread_writer_new,
};
pub use thread_writer::{ThreadWriter, WriterState};
