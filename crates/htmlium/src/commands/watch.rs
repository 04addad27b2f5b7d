//! `htmlium watch` command implementation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use clap::Args;
use htmlium_config::Config;
use htmlium_core::{FileSink, Processor};
use htmlium_loader::FragmentSource;
use notify::{RecursiveMode, Watcher};

use super::{TransformArgs, build_processor, run_once};
use crate::debouncer::{EventDebouncer, FsEvent, FsEventKind};
use crate::error::CliError;
use crate::output::Output;

/// How often the drain thread checks for settled events.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Arguments for the watch command.
#[derive(Args)]
pub(crate) struct WatchArgs {
    #[command(flatten)]
    pub common: TransformArgs,

    /// Output file.
    #[arg(short, long)]
    output: PathBuf,
}

/// Files whose changes trigger a re-render.
#[derive(Debug)]
struct WatchedFiles {
    input: PathBuf,
    components: Option<PathBuf>,
}

impl WatchedFiles {
    fn resolve(input: &Path, config: &Config) -> Result<Self, CliError> {
        let input = input.canonicalize().map_err(|source| CliError::Read {
            path: input.to_path_buf(),
            source,
        })?;
        // Remote component files are only fetched at startup
        let components = if config.source.enabled {
            match FragmentSource::parse(&config.source.components) {
                Ok(FragmentSource::Path(path)) => path.canonicalize().ok(),
                _ => None,
            }
        } else {
            None
        };
        Ok(Self { input, components })
    }

    fn contains(&self, path: &Path) -> bool {
        path == self.input || self.components.as_deref() == Some(path)
    }

    /// Directories to watch. Watching the parent survives atomic saves.
    fn directories(&self) -> Vec<&Path> {
        let mut dirs: Vec<&Path> = std::iter::once(&self.input)
            .chain(&self.components)
            .filter_map(|path| path.parent())
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }
}

impl WatchArgs {
    /// Execute the watch command.
    ///
    /// Renders once, then re-renders whenever the input page or a local
    /// component file changes. Runs until the watcher stops.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, the first render fails
    /// or the watcher cannot be started.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.common.load_config()?;
        let watched = WatchedFiles::resolve(&self.common.input, &config)?;

        if self
            .output
            .canonicalize()
            .is_ok_and(|path| watched.contains(&path))
        {
            return Err(CliError::Validation(
                "output must not be the input page or the component file".to_owned(),
            ));
        }

        let mut processor = build_processor(&config);
        let mut sink = FileSink::new(&self.output);
        run_once(&processor, &watched.input, &mut sink, &output)?;

        let debouncer = Arc::new(EventDebouncer::new(
            Duration::from_millis(config.watch.debounce_ms),
            config.watch.max_events_per_batch,
        ));
        let (batch_tx, batch_rx) = mpsc::channel::<Vec<FsEvent>>();

        let filter = WatchedFiles {
            input: watched.input.clone(),
            components: watched.components.clone(),
        };
        let watcher_debouncer = Arc::clone(&debouncer);
        let mut watcher = notify::recommended_watcher(move |res| {
            record_notify_events(res, &watcher_debouncer, &filter);
        })?;
        for dir in watched.directories() {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        // Drain thread. The watcher is moved in to keep it alive.
        std::thread::spawn(move || {
            let _watcher = watcher;
            loop {
                std::thread::sleep(POLL_INTERVAL);
                let events = debouncer.drain_ready();
                if !events.is_empty() && batch_tx.send(events).is_err() {
                    return;
                }
            }
        });

        output.highlight(&format!(
            "Watching {} (Ctrl+C to stop)",
            watched.input.display()
        ));

        for batch in batch_rx {
            handle_batch(&batch, &watched, &config, &mut processor, &mut sink, &output);
        }
        Ok(())
    }
}

/// Record the notify events that concern watched files.
fn record_notify_events(
    res: Result<notify::Event, notify::Error>,
    debouncer: &EventDebouncer,
    watched: &WatchedFiles,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "File watcher error");
            return;
        }
    };
    let Some(kind) = FsEventKind::from_notify(event.kind) else {
        return;
    };
    for path in event.paths {
        if watched.contains(&path) {
            debouncer.record(path, kind);
        }
    }
}

/// Re-render after a batch of settled events.
fn handle_batch(
    batch: &[FsEvent],
    watched: &WatchedFiles,
    config: &Config,
    processor: &mut Processor,
    sink: &mut FileSink,
    output: &Output,
) {
    let components_changed = watched
        .components
        .as_deref()
        .is_some_and(|components| batch.iter().any(|event| event.path == components));
    if components_changed {
        processor.set_external_components(htmlium_loader::load_configured(&config.source));
        output.info("Reloaded components");
    }

    if batch
        .iter()
        .any(|event| event.path == watched.input && event.kind == FsEventKind::Removed)
    {
        output.warning(&format!(
            "{} was removed, keeping last output",
            watched.input.display()
        ));
        return;
    }

    if let Err(e) = run_once(processor, &watched.input, sink, output) {
        output.error(&format!("Error: {e}"));
    }
}
