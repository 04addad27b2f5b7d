//! External component loading for htmlium.
//!
//! Components can be shipped outside the page as a YAML mapping of component
//! name to fragment source:
//!
//! ```yaml
//! card: |
//!   <div class="card"><h2>{{title}}</h2></div>
//! badge: <span>{{label}}</span>
//! ```
//!
//! The file is read from a local path or fetched over HTTP(S). A missing or
//! malformed source never fails a render: [`load_or_empty`] logs the problem
//! and yields an empty map, so only inline definitions are used.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use htmlium_config::SourceConfig;
use htmlium_core::FragmentMap;
use ureq::Agent;

/// Where a component file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentSource {
    /// Local file.
    Path(PathBuf),
    /// `http://` or `https://` URL.
    Url(String),
}

impl FragmentSource {
    /// Classify a configured location.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::InvalidLocation`] for an empty location or a URL
    /// with a scheme other than `http` or `https`.
    pub fn parse(location: &str) -> Result<Self, LoadError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(LoadError::InvalidLocation(location.to_owned()));
        }

        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Self::Url(location.to_owned()));
        }
        if location.contains("://") {
            return Err(LoadError::InvalidLocation(location.to_owned()));
        }
        Ok(Self::Path(PathBuf::from(location)))
    }
}

impl std::fmt::Display for FragmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Error loading external components.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Reading a local file failed.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP request failed (network error, timeout, etc).
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    /// Server answered with an error status.
    #[error("HTTP error fetching {url}: {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Source is larger than `source.max_size`.
    #[error("Component source exceeds {max} bytes")]
    TooLarge {
        /// Configured limit in bytes.
        max: usize,
    },

    /// Content is not a YAML mapping.
    #[error("Invalid component YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Location is neither a path nor an HTTP(S) URL.
    #[error("Invalid component location: {0:?}")]
    InvalidLocation(String),
}

/// Source of external component fragments.
pub trait FragmentLoader {
    /// Load every fragment from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or parsed.
    fn load(&self, source: &FragmentSource) -> Result<FragmentMap, LoadError>;
}

/// Create an HTTP agent with the given timeout.
///
/// Status codes are checked by the caller, so they are not turned into errors.
fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Loads a YAML component mapping from a file or URL.
#[derive(Debug)]
pub struct YamlFragmentLoader {
    agent: Agent,
    max_size: usize,
}

impl YamlFragmentLoader {
    /// Create a loader with a request timeout and a body size limit in bytes.
    #[must_use]
    pub fn new(timeout: Duration, max_size: usize) -> Self {
        Self {
            agent: create_agent(timeout),
            max_size,
        }
    }

    /// Create a loader from the `[source]` config section.
    #[must_use]
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(Duration::from_secs(config.timeout_secs), config.max_size)
    }

    fn read_file(&self, path: &Path) -> Result<String, LoadError> {
        let io_error = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let size = std::fs::metadata(path).map_err(io_error)?.len();
        if size > self.max_size as u64 {
            return Err(LoadError::TooLarge { max: self.max_size });
        }
        std::fs::read_to_string(path).map_err(io_error)
    }

    fn fetch(&self, url: &str) -> Result<String, LoadError> {
        tracing::info!(url, "Fetching components");
        let response = self.agent.get(url).call()?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(LoadError::HttpStatus {
                url: url.to_owned(),
                status,
            });
        }

        response
            .into_body()
            .with_config()
            .limit(self.max_size as u64)
            .read_to_string()
            .map_err(|e| match e {
                ureq::Error::BodyExceedsLimit(_) => LoadError::TooLarge { max: self.max_size },
                other => LoadError::Http(other),
            })
    }
}

impl FragmentLoader for YamlFragmentLoader {
    fn load(&self, source: &FragmentSource) -> Result<FragmentMap, LoadError> {
        let content = match source {
            FragmentSource::Path(path) => self.read_file(path)?,
            FragmentSource::Url(url) => self.fetch(url)?,
        };
        let fragments = parse_fragments(&content)?;
        tracing::debug!(%source, count = fragments.len(), "Loaded components");
        Ok(fragments)
    }
}

/// Parse a YAML mapping of component name to fragment source.
///
/// Empty content yields an empty map. Entries whose value is not a string are
/// skipped with a warning.
///
/// # Errors
///
/// Returns an error if the content is not a YAML mapping.
pub fn parse_fragments(content: &str) -> Result<FragmentMap, LoadError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(FragmentMap::new());
    }

    let entries: Option<HashMap<String, serde_yaml::Value>> = serde_yaml::from_str(trimmed)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| match value {
            serde_yaml::Value::String(fragment) => Some((name, fragment)),
            _ => {
                tracing::warn!(component = %name, "Component value is not a string, skipping");
                None
            }
        })
        .collect())
}

/// Load fragments, logging any failure and falling back to an empty map.
pub fn load_or_empty(loader: &dyn FragmentLoader, source: &FragmentSource) -> FragmentMap {
    match loader.load(source) {
        Ok(fragments) => fragments,
        Err(e) => {
            tracing::warn!(%source, error = %e, "Failed to load components, using inline definitions only");
            FragmentMap::new()
        }
    }
}

/// Load the components configured in `[source]`.
///
/// Returns an empty map when loading is disabled or the location is invalid.
#[must_use]
pub fn load_configured(config: &SourceConfig) -> FragmentMap {
    if !config.enabled {
        return FragmentMap::new();
    }
    match FragmentSource::parse(&config.components) {
        Ok(source) => load_or_empty(&YamlFragmentLoader::from_config(config), &source),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping external components");
            FragmentMap::new()
        }
    }
}
