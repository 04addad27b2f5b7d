//! Component inlining and template expansion for htmlium.
//!
//! This crate turns raw markup plus a data context into final markup:
//! - Definition blocks (`<htmlium-set component="card">...</htmlium-set>`) are
//!   collected into a fragment map and removed from the document
//! - Usage tags (`<htmlium loadcomponent="card" title="Hi">`) are replaced by
//!   the named fragment, expanded against the tag's attributes
//! - Fragments support `{{#if}}`, `{{#each}}` and `{{path}}` placeholders
//! - Interpolated values are escaped and component output is filtered through
//!   a best-effort HTML sanitizer
//!
//! Scanning is pattern based, not a DOM parse. All regexes derived from the
//! configuration live in [`patterns`], so swapping in a tokenizer is a local
//! change.
//!
//! # Architecture
//!
//! - [`attributes`]: `key="value"` extraction from tag attribute strings
//! - [`path`]: dotted path lookup in a data context
//! - [`sanitize`]: text escaping and markup filtering
//! - [`patterns`]: lazily compiled, config-derived regex cache
//! - [`registry`]: definition block discovery
//! - [`expand`]: conditional, loop and interpolation passes
//! - [`processor`]: the [`Processor`] driving a full transform
//! - [`sink`]: write-back targets for [`Processor::render_to`]
//!
//! # Example
//!
//! ```
//! use htmlium_config::Config;
//! use htmlium_core::Processor;
//!
//! let processor = Processor::new(Config::default());
//! let html = processor.transform(
//!     r#"<htmlium-set component="hello">Hello {{name}}</htmlium-set><htmlium loadcomponent="hello" name="World">"#,
//! );
//! assert_eq!(html, "Hello World");
//! ```

pub mod attributes;
pub mod expand;
pub mod path;
pub mod patterns;
pub mod processor;
pub mod registry;
pub mod sanitize;
pub mod sink;

mod error;

use std::collections::HashMap;

pub use error::{ExpandError, SinkError};
pub use expand::Expander;
pub use processor::{Processor, SkipReason, TransformOutcome};
pub use registry::Registry;
pub use sanitize::Sanitizer;
pub use sink::{FileSink, RenderSink};

/// Component name to fragment source.
pub type FragmentMap = HashMap<String, String>;

/// Values placeholders are resolved against.
pub type Context = serde_json::Map<String, serde_json::Value>;
