//! Config-derived regex patterns with a lazy per-processor cache.
//!
//! Every pattern that depends on tag names or delimiters is built here, so the
//! rest of the crate never formats a regex itself. Config values are passed
//! through [`regex::escape`], which keeps compilation infallible for any
//! configuration.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use htmlium_config::Config;
use regex::Regex;

/// Logical name of a config-derived pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// `<set attrs>BODY</set>`, attributes in group 1 and body in group 2.
    DefinitionBlock,
    /// Any definition block, used for stripping.
    DefinitionStrip,
    /// `<use attrs />`, attributes in group 1.
    UsageTag,
    /// `{{#if path}}THEN{{#else}}ELSE{{/if}}`.
    Conditional,
    /// `{{#each path}}BODY{{/each}}`.
    Loop,
    /// `{{path}}`.
    Interpolation,
}

impl PatternKind {
    /// Build the regex source for this pattern under `config`.
    fn source(self, config: &Config) -> String {
        let set = regex::escape(&config.component.set_tag_name);
        let tag = regex::escape(&config.component.tag_name);
        let start = regex::escape(&config.interpolation.start);
        let end = regex::escape(&config.interpolation.end);

        match self {
            Self::DefinitionBlock => format!(r"(?s)<{set}\s+([^>]+?)>(.*?)</{set}>"),
            Self::DefinitionStrip => format!(r"(?s)<{set}[^>]*>.*?</{set}>"),
            Self::UsageTag => format!(r"<{tag}\s+([^>]+?)/?>(?:</{tag}>)?"),
            Self::Conditional => format!(
                r"(?s){start}#if\s+([\w.@]+){end}(.*?)(?:{start}#else{end}(.*?))?{start}/if{end}"
            ),
            Self::Loop => format!(r"(?s){start}#each\s+([\w.@]+){end}(.*?){start}/each{end}"),
            Self::Interpolation => format!(r"{start}([\w.@]+){end}"),
        }
    }
}

/// Compiled patterns keyed by [`PatternKind`], filled on first use.
///
/// Cloning a [`Regex`] is cheap, so lookups hand out clones and the lock is
/// never held while matching.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: Mutex<HashMap<PatternKind, Regex>>,
}

impl PatternCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pattern for `kind`, compiling it on a miss.
    pub fn get(&self, kind: PatternKind, config: &Config) -> Regex {
        let mut compiled = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        compiled
            .entry(kind)
            .or_insert_with(|| {
                Regex::new(&kind.source(config)).expect("pattern built from escaped config values")
            })
            .clone()
    }

    /// Drop every compiled pattern. Required whenever the config changes.
    pub fn clear(&self) {
        self.compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
