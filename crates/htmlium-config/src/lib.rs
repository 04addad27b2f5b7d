//! Configuration management for htmlium.
//!
//! Parses `htmlium.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! Every section is `#[serde(default)]`, so a file only needs to name the keys
//! it changes: missing keys keep their defaults (a deep merge over
//! [`Config::default`]). Programmatic overrides are applied through
//! [`ConfigOverrides`], either during load or with [`Config::merged`].
//!
//! ## Environment Variable Expansion
//!
//! `source.components` supports environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "htmlium.toml";

/// Caller overrides applied on top of defaults and file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Override the usage tag name.
    pub tag_name: Option<String>,
    /// Override the selector attribute name.
    pub attribute_name: Option<String>,
    /// Override the definition block tag name.
    pub set_tag_name: Option<String>,
    /// Override the opening interpolation delimiter.
    pub interpolation_start: Option<String>,
    /// Override the closing interpolation delimiter.
    pub interpolation_end: Option<String>,
    /// Override escaping of interpolated values.
    pub sanitize_interpolation: Option<bool>,
    /// Override HTML sanitization.
    pub sanitize_html: Option<bool>,
    /// Override the external component file location.
    pub components: Option<String>,
    /// Override whether the external component file is loaded at all.
    pub components_enabled: Option<bool>,
    /// Override the usage-site cap.
    pub max_usage_sites: Option<usize>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Component tag configuration.
    pub component: ComponentConfig,
    /// Placeholder delimiter configuration.
    pub interpolation: InterpolationConfig,
    /// Sanitization and input policy.
    pub security: SecurityConfig,
    /// Resource guards for a single transform pass.
    pub limits: LimitsConfig,
    /// External component file.
    pub source: SourceConfig,
    /// File watching for `htmlium watch`.
    pub watch: WatchConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Component tag configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Name of the usage tag (`<htmlium loadcomponent="card">`).
    pub tag_name: String,
    /// Attribute on the usage tag naming the fragment.
    pub attribute_name: String,
    /// Name of the definition block tag (`<htmlium-set component="card">`).
    pub set_tag_name: String,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            tag_name: "htmlium".to_owned(),
            attribute_name: "loadcomponent".to_owned(),
            set_tag_name: "htmlium-set".to_owned(),
        }
    }
}

/// Placeholder delimiter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Opening delimiter.
    pub start: String,
    /// Closing delimiter.
    pub end: String,
    /// Escape interpolated values.
    pub sanitize: bool,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            start: "{{".to_owned(),
            end: "}}".to_owned(),
            sanitize: true,
        }
    }
}

/// Sanitization and input policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Escape text and filter component markup.
    pub sanitize_html: bool,
    /// Largest accepted input, in bytes.
    pub max_input_size: usize,
    /// URL schemes allowed in `href`/`src` of sanitized markup.
    pub allowed_protocols: Vec<String>,
    /// Refuse `__proto__`, `constructor` and `prototype` as context keys.
    pub prevent_prototype_pollution: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sanitize_html: true,
            max_input_size: 1024 * 1024,
            allowed_protocols: vec!["http".to_owned(), "https".to_owned(), "mailto".to_owned()],
            prevent_prototype_pollution: true,
        }
    }
}

impl SecurityConfig {
    /// Whether a URL scheme (without the trailing colon) is allowed.
    #[must_use]
    pub fn allows_protocol(&self, scheme: &str) -> bool {
        self.allowed_protocols
            .iter()
            .any(|p| p.eq_ignore_ascii_case(scheme))
    }
}

/// Resource guards for a single transform pass.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Most fragments (external + local) a pass will consider.
    pub max_components: usize,
    /// Most usage sites substituted in one pass.
    pub max_usage_sites: usize,
    /// Longest accepted selector attribute value.
    pub max_selector_length: usize,
    /// Largest fragment source that will be expanded, in bytes.
    pub max_fragment_size: usize,
    /// Deepest loop nesting during expansion.
    pub max_depth: usize,
    /// Most elements expanded by a single loop block.
    pub max_loop_items: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_components: 1000,
            max_usage_sites: 500,
            max_selector_length: 100,
            max_fragment_size: 100_000,
            max_depth: 10,
            max_loop_items: 1000,
        }
    }
}

/// External component file configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Whether to load the external component file.
    pub enabled: bool,
    /// Path or HTTP(S) URL of the YAML component file.
    pub components: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Largest accepted component file, in bytes.
    pub max_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            components: "components.yaml".to_owned(),
            timeout_secs: 10,
            max_size: 1024 * 1024,
        }
    }
}

/// File watching configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a change triggers a re-render.
    pub debounce_ms: u64,
    /// Most change events inspected per batch.
    pub max_events_per_batch: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_events_per_batch: 100,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`source.components`").
        field: String,
        /// Error message (e.g., "${`COMPONENTS_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a tag or attribute name: a letter followed by letters, digits, `-` or `_`.
fn require_name(value: &str, field: &str) -> Result<(), ConfigError> {
    require_non_empty(value, field)?;
    let mut chars = value.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ConfigError::Validation(format!(
            "{field} must start with a letter and contain only letters, digits, '-' or '_'"
        )));
    }
    Ok(())
}

/// Require an attribute name the attribute parser can match: a letter or `_`
/// followed by letters, digits or `_`.
fn require_attribute_name(value: &str, field: &str) -> Result<(), ConfigError> {
    require_non_empty(value, field)?;
    let mut chars = value.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ConfigError::Validation(format!(
            "{field} may only contain letters, digits or '_'"
        )));
    }
    Ok(())
}

/// Require a limit to be positive.
fn require_positive(value: usize, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional overrides.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `htmlium.toml` in current directory and parents,
    /// falling back to defaults when none is found.
    ///
    /// Overrides are applied after loading, so they take precedence over file
    /// values. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<Self, ConfigError> {
        let config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        let config = match overrides {
            Some(overrides) => config.merged(overrides),
            None => config,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or the result is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Return a copy of this configuration with `overrides` applied.
    ///
    /// `self` is left untouched, so a shared default can seed any number of
    /// per-processor configurations.
    #[must_use]
    pub fn merged(&self, overrides: &ConfigOverrides) -> Self {
        let mut config = self.clone();
        if let Some(tag_name) = &overrides.tag_name {
            config.component.tag_name.clone_from(tag_name);
        }
        if let Some(attribute_name) = &overrides.attribute_name {
            config.component.attribute_name.clone_from(attribute_name);
        }
        if let Some(set_tag_name) = &overrides.set_tag_name {
            config.component.set_tag_name.clone_from(set_tag_name);
        }
        if let Some(start) = &overrides.interpolation_start {
            config.interpolation.start.clone_from(start);
        }
        if let Some(end) = &overrides.interpolation_end {
            config.interpolation.end.clone_from(end);
        }
        if let Some(sanitize) = overrides.sanitize_interpolation {
            config.interpolation.sanitize = sanitize;
        }
        if let Some(sanitize_html) = overrides.sanitize_html {
            config.security.sanitize_html = sanitize_html;
        }
        if let Some(components) = &overrides.components {
            config.source.components.clone_from(components);
        }
        if let Some(enabled) = overrides.components_enabled {
            config.source.enabled = enabled;
        }
        if let Some(max_usage_sites) = overrides.max_usage_sites {
            config.limits.max_usage_sites = max_usage_sites;
        }
        config
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_component()?;
        self.validate_interpolation()?;
        self.validate_security()?;
        self.validate_limits()?;
        Ok(())
    }

    fn validate_component(&self) -> Result<(), ConfigError> {
        require_name(&self.component.tag_name, "component.tag_name")?;
        require_attribute_name(&self.component.attribute_name, "component.attribute_name")?;
        require_name(&self.component.set_tag_name, "component.set_tag_name")?;

        if self.component.tag_name == self.component.set_tag_name {
            return Err(ConfigError::Validation(
                "component.tag_name and component.set_tag_name must differ".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_interpolation(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.interpolation.start, "interpolation.start")?;
        require_non_empty(&self.interpolation.end, "interpolation.end")?;
        Ok(())
    }

    fn validate_security(&self) -> Result<(), ConfigError> {
        require_positive(self.security.max_input_size, "security.max_input_size")?;

        for protocol in &self.security.allowed_protocols {
            let valid = protocol.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && protocol
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if !valid {
                return Err(ConfigError::Validation(format!(
                    "security.allowed_protocols contains invalid scheme {protocol:?}"
                )));
            }
        }
        Ok(())
    }

    fn validate_limits(&self) -> Result<(), ConfigError> {
        require_positive(self.limits.max_components, "limits.max_components")?;
        require_positive(self.limits.max_selector_length, "limits.max_selector_length")?;
        require_positive(self.limits.max_fragment_size, "limits.max_fragment_size")?;
        require_positive(self.limits.max_depth, "limits.max_depth")?;
        require_positive(
            self.watch.max_events_per_batch,
            "watch.max_events_per_batch",
        )?;
        Ok(())
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.source.components =
            expand::expand_env(&self.source.components, "source.components")?;
        Ok(())
    }

    /// Resolve a relative component file path against the config directory.
    ///
    /// URLs and absolute paths are left unchanged.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let components = &self.source.components;
        if components.contains("://") || Path::new(components).is_absolute() {
            return;
        }
        self.source.components = config_dir.join(components).to_string_lossy().into_owned();
    }
}
