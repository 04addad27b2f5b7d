//! Template expansion: conditional, loop and interpolation passes.
//!
//! A fragment is expanded by running, in order:
//!
//! 1. the conditional pass (`{{#if path}}THEN{{#else}}ELSE{{/if}}`), which
//!    emits the raw text of the chosen branch,
//! 2. the loop pass (`{{#each path}}BODY{{/each}}`), which expands `BODY`
//!    once per array element, each time recursing through all three passes,
//! 3. the interpolation pass (`{{path}}`).
//!
//! Block matching is non-greedy and non-nesting. Unbalanced or malformed
//! blocks do not match and stay in the output as literal text.

use std::borrow::Cow;

use htmlium_config::Config;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::attributes::parse_structured;
use crate::patterns::{PatternCache, PatternKind};
use crate::path::{is_forbidden_key, resolve_path, resolve_value};
use crate::{Context, ExpandError, Sanitizer};

/// Key holding a non-object loop element.
pub const THIS_KEY: &str = "this";

/// Key holding the zero-based loop position.
pub const INDEX_KEY: &str = "@index";

/// Expands fragments against a [`Context`] under one configuration.
#[derive(Debug)]
pub struct Expander<'a> {
    conditional: Regex,
    each: Regex,
    interpolation: Regex,
    sanitizer: Sanitizer<'a>,
    escape_values: bool,
    prevent_pollution: bool,
    max_depth: usize,
    max_loop_items: usize,
}

impl<'a> Expander<'a> {
    /// Create an expander using patterns from `patterns`.
    #[must_use]
    pub fn new(config: &'a Config, patterns: &PatternCache) -> Self {
        Self {
            conditional: patterns.get(PatternKind::Conditional, config),
            each: patterns.get(PatternKind::Loop, config),
            interpolation: patterns.get(PatternKind::Interpolation, config),
            sanitizer: Sanitizer::new(&config.security),
            escape_values: config.interpolation.sanitize,
            prevent_pollution: config.security.prevent_prototype_pollution,
            max_depth: config.limits.max_depth,
            max_loop_items: config.limits.max_loop_items,
        }
    }

    /// Expand `template` against `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ExpandError::DepthExceeded`] when loop nesting reaches
    /// `limits.max_depth` (the top-level fragment counts as one level).
    pub fn expand(&self, template: &str, context: &Context) -> Result<String, ExpandError> {
        self.expand_at(template, context, 0)
    }

    fn expand_at(
        &self,
        template: &str,
        context: &Context,
        depth: usize,
    ) -> Result<String, ExpandError> {
        if depth >= self.max_depth {
            return Err(ExpandError::DepthExceeded {
                max: self.max_depth,
            });
        }
        let branched = self.conditional_pass(template, context);
        let looped = self.loop_pass(&branched, context, depth)?;
        Ok(self.interpolation_pass(&looped, context))
    }

    fn conditional_pass(&self, template: &str, context: &Context) -> String {
        self.conditional
            .replace_all(template, |caps: &Captures| {
                if is_truthy(self.lookup(context, &caps[1]).as_deref()) {
                    caps[2].to_owned()
                } else {
                    caps.get(3)
                        .map_or_else(String::new, |m| m.as_str().to_owned())
                }
            })
            .into_owned()
    }

    fn loop_pass(
        &self,
        template: &str,
        context: &Context,
        depth: usize,
    ) -> Result<String, ExpandError> {
        let mut output = String::with_capacity(template.len());
        let mut last = 0;

        for caps in self.each.captures_iter(template) {
            let Some(block) = caps.get(0) else { continue };
            output.push_str(&template[last..block.start()]);
            last = block.end();

            let Some(items) = self.lookup_sequence(context, &caps[1]) else {
                continue;
            };
            if items.len() > self.max_loop_items {
                tracing::warn!(
                    path = &caps[1],
                    items = items.len(),
                    max = self.max_loop_items,
                    "Loop truncated"
                );
            }
            for (index, item) in items.iter().take(self.max_loop_items).enumerate() {
                let scope = iteration_context(item, index);
                output.push_str(&self.expand_at(&caps[2], &scope, depth + 1)?);
            }
        }

        output.push_str(&template[last..]);
        Ok(output)
    }

    fn interpolation_pass(&self, template: &str, context: &Context) -> String {
        self.interpolation
            .replace_all(template, |caps: &Captures| {
                match self.lookup(context, &caps[1]).as_deref() {
                    None | Some(Value::Null) => String::new(),
                    Some(value) => {
                        let text = stringify(value);
                        if self.escape_values {
                            self.sanitizer.escape_text(&text)
                        } else {
                            text
                        }
                    }
                }
            })
            .into_owned()
    }

    /// Resolve `path`. A dotted path whose first segment holds JSON text
    /// (a structured tag attribute) is resolved inside that text.
    fn lookup<'c>(&self, context: &'c Context, path: &str) -> Option<Cow<'c, Value>> {
        if self.prevent_pollution && path.split('.').any(is_forbidden_key) {
            return None;
        }
        if let Some(value) = resolve_path(context, path) {
            return Some(Cow::Borrowed(value));
        }
        let (head, rest) = path.split_once('.')?;
        let Value::String(text) = context.get(head)? else {
            return None;
        };
        let parsed = parse_structured(text)?;
        resolve_value(&parsed, rest).cloned().map(Cow::Owned)
    }

    /// Resolve `path` to the elements a loop iterates, reading JSON text when
    /// the value is a string.
    fn lookup_sequence<'c>(&self, context: &'c Context, path: &str) -> Option<Cow<'c, [Value]>> {
        match self.lookup(context, path)? {
            Cow::Borrowed(Value::Array(items)) => Some(Cow::Borrowed(items.as_slice())),
            Cow::Owned(Value::Array(items)) => Some(Cow::Owned(items)),
            Cow::Borrowed(Value::String(text)) => match parse_structured(text)? {
                Value::Array(items) => Some(Cow::Owned(items)),
                _ => None,
            },
            Cow::Borrowed(_) | Cow::Owned(_) => None,
        }
    }
}

/// Conditional truthiness.
///
/// Absent, `null`, `false`, `0`, `""`, `"false"` and `"0"` are falsy.
/// Everything else, including `[]` and `{}`, is truthy.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "false" && s != "0",
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Render a value as placeholder text.
///
/// Arrays join their elements with `,` (nulls become empty), objects render
/// as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => value.to_string(),
    }
}

/// Fresh context for one loop iteration.
///
/// Object elements are shallow-copied; anything else is exposed as `this`.
fn iteration_context(item: &Value, index: usize) -> Context {
    let mut scope = match item {
        Value::Object(fields) => fields.clone(),
        other => {
            let mut scope = Context::new();
            scope.insert(THIS_KEY.to_owned(), other.clone());
            scope
        }
    };
    scope.insert(INDEX_KEY.to_owned(), Value::from(index));
    scope
}
