//! `htmlium render` command implementation.

use std::path::PathBuf;

use clap::Args;
use htmlium_core::FileSink;

use super::{StdoutSink, TransformArgs, build_processor, run_once};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    #[command(flatten)]
    pub common: TransformArgs,

    /// Output file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, the input cannot be read
    /// or the output cannot be written.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.common.load_config()?;
        let processor = build_processor(&config);

        match &self.output {
            Some(path) => {
                let mut sink = FileSink::new(path);
                run_once(&processor, &self.common.input, &mut sink, &output)?;
                output.info(&format!("Wrote {}", path.display()));
            }
            None => {
                run_once(&processor, &self.common.input, &mut StdoutSink, &output)?;
            }
        }
        Ok(())
    }
}
