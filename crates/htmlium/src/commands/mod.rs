//! CLI command implementations.

pub(crate) mod render;
pub(crate) mod watch;

pub(crate) use render::RenderArgs;
pub(crate) use watch::WatchArgs;

use std::path::{Path, PathBuf};

use clap::Args;
use htmlium_config::{Config, ConfigOverrides};
use htmlium_core::{Processor, RenderSink, TransformOutcome};

use crate::error::CliError;
use crate::output::Output;

/// Arguments shared by every command that transforms a page.
#[derive(Args)]
pub(crate) struct TransformArgs {
    /// HTML page to transform.
    pub input: PathBuf,

    /// Path to configuration file (default: auto-discover htmlium.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Component file path or URL (overrides config).
    #[arg(long, env = "HTMLIUM_COMPONENTS")]
    pub components: Option<String>,

    /// Use inline definitions only.
    #[arg(long, conflicts_with = "components")]
    pub no_components: bool,

    /// Usage tag name (overrides config).
    #[arg(long)]
    pub tag: Option<String>,

    /// Selector attribute name (overrides config).
    #[arg(long)]
    pub attribute: Option<String>,

    /// Maximum number of usage sites processed (overrides config).
    #[arg(long)]
    pub max_usage_sites: Option<usize>,

    /// Disable markup sanitization and value escaping.
    #[arg(long)]
    pub no_sanitize: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl TransformArgs {
    fn overrides(&self) -> ConfigOverrides {
        let sanitize = self.no_sanitize.then_some(false);
        ConfigOverrides {
            tag_name: self.tag.clone(),
            attribute_name: self.attribute.clone(),
            sanitize_interpolation: sanitize,
            sanitize_html: sanitize,
            components: self.components.clone(),
            components_enabled: self.no_components.then_some(false),
            max_usage_sites: self.max_usage_sites,
            ..ConfigOverrides::default()
        }
    }

    /// Load and validate the effective configuration.
    pub(crate) fn load_config(&self) -> Result<Config, CliError> {
        let overrides = self.overrides();
        Ok(Config::load(self.config.as_deref(), Some(&overrides))?)
    }
}

/// Build a processor for `config`, loading external components if enabled.
pub(crate) fn build_processor(config: &Config) -> Processor {
    let mut processor = Processor::new(config.clone());
    processor.set_external_components(htmlium_loader::load_configured(&config.source));
    processor
}

/// Read a page from disk.
pub(crate) fn read_input(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Transform `input` once and write the result to `sink`.
pub(crate) fn run_once(
    processor: &Processor,
    input: &Path,
    sink: &mut dyn RenderSink,
    output: &Output,
) -> Result<TransformOutcome, CliError> {
    let markup = read_input(input)?;
    let outcome = processor.transform_report(&markup);
    sink.write_html(&outcome.html)?;
    report(&outcome, output);
    Ok(outcome)
}

/// Print a summary of a transform.
fn report(outcome: &TransformOutcome, output: &Output) {
    if outcome.input_rejected {
        output.warning("Input exceeds security.max_input_size, output is empty");
        return;
    }
    if outcome.component_limit_exceeded {
        output.warning("Too many components (limits.max_components), tags left unexpanded");
        return;
    }
    for reason in &outcome.skipped {
        output.warning(&format!("Skipped: {reason}"));
    }
    output.success(&format!(
        "Rendered {} component(s), skipped {}",
        outcome.rendered,
        outcome.skipped.len()
    ));
}

/// Sink writing the whole page to stdout.
pub(crate) struct StdoutSink;

impl RenderSink for StdoutSink {
    fn write_html(&mut self, html: &str) -> Result<(), htmlium_core::SinkError> {
        use std::io::Write;

        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(html.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|source| htmlium_core::SinkError::Io {
                path: PathBuf::from("<stdout>"),
                source,
            })
    }
}
