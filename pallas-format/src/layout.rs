//! Directory layout for a stored [`GlobalArchive`](pallas_core): one `main.pallas` plus one
//! `archive_<id>/` directory per archive, each holding an `archive.pallas` and one
//! `thread_<tid>.pallas` per thread (SPEC_FULL.md §4.5).

use std::path::{Path, PathBuf};

pub fn main_file(root: &Path) -> PathBuf {
    root.join("main.pallas")
}

pub fn archive_dir(root: &Path, archive_id: u32) -> PathBuf {
    root.join(format!("archive_{archive_id}"))
}

pub fn archive_file(root: &Path, archive_id: u32) -> PathBuf {
    archive_dir(root, archive_id).join("archive.pallas")
}

pub fn thread_file(root: &Path, archive_id: u32, thread_id: u32) -> PathBuf {
    archive_dir(root, archive_id).join(format!("thread_{thread_id}.pallas"))
}
