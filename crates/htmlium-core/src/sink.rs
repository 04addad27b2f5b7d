//! Write-back targets for transformed markup.

use std::path::{Path, PathBuf};

use crate::SinkError;

/// Host-provided destination for transformed markup.
///
/// Implementations replace their whole content with the new markup.
pub trait RenderSink {
    /// Replace the sink's content with `html`.
    fn write_html(&mut self, html: &str) -> Result<(), SinkError>;
}

impl RenderSink for String {
    fn write_html(&mut self, html: &str) -> Result<(), SinkError> {
        self.clear();
        self.push_str(html);
        Ok(())
    }
}

/// Sink writing to a file on disk.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSink for FileSink {
    fn write_html(&mut self, html: &str) -> Result<(), SinkError> {
        std::fs::write(&self.path, html).map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
