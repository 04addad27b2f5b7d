//! Error types for expansion and write-back.

use std::path::PathBuf;

/// Failure while expanding a single fragment.
///
/// Data absence is never an error; only resource guards produce one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    /// Loop nesting reached `limits.max_depth`.
    #[error("template nesting exceeds {max} levels")]
    DepthExceeded {
        /// Configured maximum depth.
        max: usize,
    },
}

/// Failure writing transformed markup to a [`RenderSink`](crate::RenderSink).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// I/O error writing to a file.
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
