//! Event debouncing for watch mode.
//!
//! Editors often emit several events per save (truncate, write, rename). The
//! debouncer keeps one pending event per path and only releases it once the
//! path has been quiet for the debounce duration.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Kind of filesystem event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FsEventKind {
    /// Created or modified.
    Changed,
    Removed,
}

impl FsEventKind {
    /// Map a notify event kind, ignoring access and metadata-only events.
    pub(crate) fn from_notify(kind: notify::EventKind) -> Option<Self> {
        match kind {
            notify::EventKind::Create(_) | notify::EventKind::Modify(_) => Some(Self::Changed),
            notify::EventKind::Remove(_) => Some(Self::Removed),
            _ => None,
        }
    }
}

/// A debounced filesystem event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

struct PendingEvent {
    kind: FsEventKind,
    deadline: Instant,
}

/// Thread-safe event debouncer.
///
/// The latest kind recorded for a path wins: a remove followed by a create
/// (atomic save) is reported as a change. At most `max_pending` distinct
/// paths are held per batch; events for further paths are dropped.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<PathBuf, PendingEvent>>,
    debounce_duration: Duration,
    max_pending: usize,
}

impl EventDebouncer {
    pub(crate) fn new(debounce_duration: Duration, max_pending: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            debounce_duration,
            max_pending,
        }
    }

    /// Record an event. Called from the notify callback thread.
    ///
    /// Returns `false` if the event was dropped because the batch is full.
    pub(crate) fn record(&self, path: PathBuf, kind: FsEventKind) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = Instant::now() + self.debounce_duration;
        let full = pending.len() >= self.max_pending;

        match pending.entry(path) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() = PendingEvent { kind, deadline };
                true
            }
            Entry::Vacant(entry) if full => {
                tracing::debug!(path = %entry.key().display(), "Event batch full, dropping event");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingEvent { kind, deadline });
                true
            }
        }
    }

    /// Drain events whose debounce deadline has passed, ordered by path.
    pub(crate) fn drain_ready(&self) -> Vec<FsEvent> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let mut ready: Vec<FsEvent> = pending
            .iter()
            .filter(|(_, event)| event.deadline <= now)
            .map(|(path, event)| FsEvent {
                path: path.clone(),
                kind: event.kind,
            })
            .collect();
        for event in &ready {
            pending.remove(&event.path);
        }

        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }
}
