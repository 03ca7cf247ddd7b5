//! The crate-wide error taxonomy, shared by every crate in the workspace (spec.md §7).

use std::path::PathBuf;

/// Errors the core surfaces to callers. There are no silent failures: every fallible
/// operation returns one of these or the process aborts via `unreachable!()` for a
/// genuinely unreachable invariant (spec.md §7).
#[derive(Debug, thiserror::Error)]
pub enum PallasError {
    /// Open/read/write/seek failed, or a compression backend failed (spec.md: "treated as
    /// IoError").
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad magic, unknown major format version, truncated chunk, or a declared/observed
    /// size mismatch.
    #[error("format error: {0}")]
    Format(String),

    /// A programmer error: record after close, leave at root, enter with the wrong token.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A grammar invariant (duration-sum, dangling sequence id, ...) was violated. `fatal`
    /// distinguishes a warning-only deviation (reader continues at the next frame) from one
    /// that must abort the read.
    #[error("corrupt invariant ({context}): {detail}")]
    CorruptInvariant { context: String, detail: String, fatal: bool },
}

impl PallasError {
    pub fn format(detail: impl Into<String>) -> Self {
        PallasError::Format(detail.into())
    }

    pub fn invalid_state(detail: impl Into<String>) -> Self {
        PallasError::InvalidState(detail.into())
    }

    pub fn corrupt_invariant(context: impl Into<String>, detail: impl Into<String>, fatal: bool) -> Self {
        PallasError::CorruptInvariant { context: context.into(), detail: detail.into(), fatal }
    }

    /// Whether a `CorruptInvariant` should abort the read (`true`) or may be logged as a
    /// warning and skipped (`false`). Every other variant is always fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            PallasError::CorruptInvariant { fatal, .. } => *fatal,
            _ => true,
        }
    }
}

/// Adds a file path to an I/O error without discarding the underlying error (mirrors
/// `anyhow`'s `.context()` at the CLI boundary, but for the core's own `thiserror` type).
pub fn with_path(err: std::io::Error, path: &std::path::Path) -> PallasError {
    PallasError::Io(std::io::Error::new(err.kind(), format!("{}: {err}", path.display())))
}

pub fn io_context(path: impl Into<PathBuf>) -> impl Fn(std::io::Error) -> PallasError {
    let path = path.into();
    move |err| with_path(err, &path)
}

pub type Result<T> = std::result::Result<T, PallasError>;
