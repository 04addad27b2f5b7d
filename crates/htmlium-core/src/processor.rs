//! The transform pipeline.
//!
//! [`Processor`] owns a resolved [`Config`], the externally supplied fragment
//! map and a lazily filled [`PatternCache`]. A transform is a pure function of
//! those three and the input markup.

use std::collections::HashMap;

use htmlium_config::Config;
use regex::Captures;
use serde_json::Value;

use crate::attributes::parse_attributes;
use crate::path::is_forbidden_key;
use crate::patterns::{PatternCache, PatternKind};
use crate::registry::{self, Registry};
use crate::{Context, ExpandError, Expander, FragmentMap, RenderSink, Sanitizer};

/// Why a usage site was replaced with nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    /// The selector attribute is absent or empty.
    #[error("usage tag has no {attribute} attribute")]
    MissingSelector {
        /// Configured selector attribute name.
        attribute: String,
    },
    /// The selector value exceeds `limits.max_selector_length`.
    #[error("selector is {length} bytes, limit is {max}")]
    SelectorTooLong {
        /// Selector length in bytes.
        length: usize,
        /// Configured limit.
        max: usize,
    },
    /// No fragment with this name.
    #[error("component {0:?} is not registered")]
    Unregistered(String),
    /// The fragment exceeds `limits.max_fragment_size`.
    #[error("component {name:?} is {size} bytes, limit is {max}")]
    FragmentTooLarge {
        /// Component name.
        name: String,
        /// Fragment size in bytes.
        size: usize,
        /// Configured limit.
        max: usize,
    },
    /// `limits.max_usage_sites` sites were already processed.
    #[error("usage site limit of {max} reached")]
    SiteLimit {
        /// Configured limit.
        max: usize,
    },
    /// Expansion hit a resource guard.
    #[error("component {name:?} failed to expand: {source}")]
    Expansion {
        /// Component name.
        name: String,
        /// Underlying failure.
        source: ExpandError,
    },
}

/// Result of a transform with per-site bookkeeping.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    /// Final markup.
    pub html: String,
    /// Usage sites replaced by an expanded fragment.
    pub rendered: usize,
    /// Usage sites replaced by nothing, in document order.
    pub skipped: Vec<SkipReason>,
    /// Input exceeded `security.max_input_size`; `html` is empty.
    pub input_rejected: bool,
    /// More fragments than `limits.max_components`; usage tags were left as is.
    pub component_limit_exceeded: bool,
}

/// Component inlining processor.
///
/// # Example
///
/// ```
/// use htmlium_config::Config;
/// use htmlium_core::{FragmentMap, Processor};
///
/// let mut processor = Processor::new(Config::default());
/// let mut external = FragmentMap::new();
/// external.insert("badge".to_owned(), "<span>{{label}}</span>".to_owned());
/// processor.set_external_components(external);
///
/// let html = processor.transform(r#"<p><htmlium loadcomponent="badge" label="new" /></p>"#);
/// assert_eq!(html, "<p><span>new</span></p>");
/// ```
#[derive(Debug)]
pub struct Processor {
    config: Config,
    patterns: PatternCache,
    external: FragmentMap,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Processor {
    /// Create a processor from a fully resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            patterns: PatternCache::new(),
            external: FragmentMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the configuration. Compiled patterns are discarded.
    pub fn reconfigure(&mut self, config: Config) {
        self.config = config;
        self.patterns.clear();
    }

    /// Replace the externally supplied fragments wholesale.
    pub fn set_external_components(&mut self, components: FragmentMap) {
        self.external = components;
    }

    #[must_use]
    pub fn external_components(&self) -> &FragmentMap {
        &self.external
    }

    /// Collect definition blocks from `markup` and strip them.
    #[must_use]
    pub fn parse_components(&self, markup: &str) -> Registry {
        registry::build(
            markup,
            &self.patterns.get(PatternKind::DefinitionBlock, &self.config),
            &self.patterns.get(PatternKind::DefinitionStrip, &self.config),
        )
    }

    /// Expand a single fragment against `context`.
    ///
    /// # Errors
    ///
    /// Returns an error when expansion hits a resource guard.
    pub fn expand(&self, fragment: &str, context: &Context) -> Result<String, ExpandError> {
        Expander::new(&self.config, &self.patterns).expand(fragment, context)
    }

    /// Transform `markup`, returning the final markup.
    #[must_use]
    pub fn transform(&self, markup: &str) -> String {
        self.transform_report(markup).html
    }

    /// Transform `markup` and write the result to `target`, if any.
    ///
    /// A failed write is logged; the transformed markup is returned either way.
    pub fn render_to(&self, markup: &str, target: Option<&mut dyn RenderSink>) -> String {
        let html = self.transform(markup);
        if let Some(target) = target
            && let Err(e) = target.write_html(&html)
        {
            tracing::warn!(error = %e, "Failed to write transformed markup");
        }
        html
    }

    /// Transform `markup`, reporting what happened at each usage site.
    #[must_use]
    pub fn transform_report(&self, markup: &str) -> TransformOutcome {
        let max_input_size = self.config.security.max_input_size;
        if markup.len() > max_input_size {
            tracing::warn!(
                size = markup.len(),
                max = max_input_size,
                "Input exceeds size limit, discarding"
            );
            return TransformOutcome {
                input_rejected: true,
                ..TransformOutcome::default()
            };
        }

        let registry = self.parse_components(markup);
        let fragments = self.merged_fragments(&registry.fragments);

        let max_components = self.config.limits.max_components;
        if fragments.len() > max_components {
            tracing::warn!(
                count = fragments.len(),
                max = max_components,
                "Too many components, skipping substitution"
            );
            return TransformOutcome {
                html: registry.markup,
                component_limit_exceeded: true,
                ..TransformOutcome::default()
            };
        }

        let usage = self.patterns.get(PatternKind::UsageTag, &self.config);
        let expander = Expander::new(&self.config, &self.patterns);
        let max_sites = self.config.limits.max_usage_sites;
        let mut sites = 0;
        let mut rendered = 0;
        let mut skipped = Vec::new();

        let html = usage
            .replace_all(&registry.markup, |caps: &Captures| {
                sites += 1;
                let result = if sites > max_sites {
                    Err(SkipReason::SiteLimit { max: max_sites })
                } else {
                    self.render_site(&caps[1], &fragments, &expander)
                };
                match result {
                    Ok(html) => {
                        rendered += 1;
                        html
                    }
                    Err(reason) => {
                        tracing::debug!(%reason, "Component dropped");
                        skipped.push(reason);
                        String::new()
                    }
                }
            })
            .into_owned();

        if sites > max_sites {
            tracing::warn!(
                sites,
                max = max_sites,
                "Usage site limit reached, remaining components emptied"
            );
        }

        TransformOutcome {
            html,
            rendered,
            skipped,
            ..TransformOutcome::default()
        }
    }

    /// External fragments overlaid with local ones.
    fn merged_fragments<'a>(&'a self, local: &'a FragmentMap) -> HashMap<&'a str, &'a str> {
        self.external
            .iter()
            .chain(local)
            .map(|(name, source)| (name.as_str(), source.as_str()))
            .collect()
    }

    /// Expand one usage site from its raw attribute string.
    fn render_site(
        &self,
        attrs: &str,
        fragments: &HashMap<&str, &str>,
        expander: &Expander<'_>,
    ) -> Result<String, SkipReason> {
        let mut attributes = parse_attributes(attrs);
        let selector_attribute = &self.config.component.attribute_name;
        let name = attributes
            .remove(selector_attribute)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SkipReason::MissingSelector {
                attribute: selector_attribute.clone(),
            })?;

        let limits = &self.config.limits;
        if name.len() > limits.max_selector_length {
            return Err(SkipReason::SelectorTooLong {
                length: name.len(),
                max: limits.max_selector_length,
            });
        }

        let Some(fragment) = fragments.get(name.as_str()) else {
            return Err(SkipReason::Unregistered(name));
        };
        if fragment.len() > limits.max_fragment_size {
            return Err(SkipReason::FragmentTooLarge {
                name,
                size: fragment.len(),
                max: limits.max_fragment_size,
            });
        }

        let context = self.site_context(attributes);
        let expanded = expander
            .expand(fragment, &context)
            .map_err(|source| SkipReason::Expansion {
                name: name.clone(),
                source,
            })?;

        if self.config.security.sanitize_html {
            Ok(Sanitizer::new(&self.config.security).sanitize_markup(&expanded))
        } else {
            Ok(expanded)
        }
    }

    /// Data context for a usage site: its attributes minus the selector.
    ///
    /// Values are kept as written. JSON text is only read as structure when a
    /// loop or a dotted path asks for it.
    fn site_context(&self, attributes: HashMap<String, String>) -> Context {
        let prevent_pollution = self.config.security.prevent_prototype_pollution;
        attributes
            .into_iter()
            .filter(|(key, _)| !(prevent_pollution && is_forbidden_key(key)))
            .map(|(key, value)| (key, Value::String(value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn processor_with(fragments: &[(&str, &str)]) -> Processor {
        let mut processor = Processor::default();
        processor.set_external_components(
            fragments
                .iter()
                .map(|(name, source)| ((*name).to_owned(), (*source).to_owned()))
                .collect(),
        );
        processor
    }

    #[test]
    fn test_plain_markup_unchanged() {
        let markup = "<html><body><p class=\"x\">{{not.a.component}}</p></body></html>";
        assert_eq!(Processor::default().transform(markup), markup);
    }

    #[test]
    fn test_definition_and_usage_round_trip() {
        let mut config = Config::default();
        config.component.tag_name = "use".to_owned();
        config.component.set_tag_name = "set".to_owned();
        let processor = Processor::new(config);

        let html = processor.transform(
            r#"<set component="x">Hello {{name}}</set><p><use loadcomponent="x" name="World"></p>"#,
        );

        assert_eq!(html, "<p>Hello World</p>");
        assert!(!html.contains("<set"));
        assert!(!html.contains("<use"));
    }

    #[test]
    fn test_self_closing_and_paired_usage_tags() {
        let processor = processor_with(&[("b", "<b>{{t}}</b>")]);
        assert_eq!(
            processor.transform(
                r#"<htmlium loadcomponent="b" t="1" /><htmlium loadcomponent="b" t="2"></htmlium>"#
            ),
            "<b>1</b><b>2</b>"
        );
    }

    #[test]
    fn test_multiline_usage_tag() {
        let processor = processor_with(&[("card", "<div>{{title}}</div>")]);
        assert_eq!(
            processor.transform("<htmlium\n  loadcomponent=\"card\"\n  title=\"T\"\n>"),
            "<div>T</div>"
        );
    }

    #[test]
    fn test_unregistered_component_is_empty() {
        let processor = Processor::default();
        let outcome =
            processor.transform_report(r#"<p>a</p><htmlium loadcomponent="nope"><p>b</p>"#);
        assert_eq!(outcome.html, "<p>a</p><p>b</p>");
        assert_eq!(outcome.rendered, 0);
        assert_eq!(
            outcome.skipped,
            vec![SkipReason::Unregistered("nope".to_owned())]
        );
    }

    #[test]
    fn test_missing_selector_is_empty() {
        let processor = processor_with(&[("a", "A")]);
        let outcome = processor.transform_report(r#"x<htmlium name="a">y<htmlium loadcomponent="">"#);
        assert_eq!(outcome.html, "xy");
        assert_eq!(outcome.skipped.len(), 2);
        assert!(matches!(
            outcome.skipped[0],
            SkipReason::MissingSelector { .. }
        ));
    }

    #[test]
    fn test_selector_too_long_is_empty() {
        let long_name = "c".repeat(101);
        let processor = processor_with(&[(long_name.as_str(), "X")]);
        let outcome =
            processor.transform_report(&format!(r#"<htmlium loadcomponent="{long_name}">"#));
        assert_eq!(outcome.html, "");
        assert_eq!(
            outcome.skipped,
            vec![SkipReason::SelectorTooLong {
                length: 101,
                max: 100
            }]
        );
    }

    #[test]
    fn test_oversized_fragment_is_empty() {
        let mut config = Config::default();
        config.limits.max_fragment_size = 4;
        let mut processor = Processor::new(config);
        processor.set_external_components(FragmentMap::from([
            ("small".to_owned(), "ok".to_owned()),
            ("big".to_owned(), "too big".to_owned()),
        ]));

        let outcome = processor
            .transform_report(r#"<htmlium loadcomponent="small"><htmlium loadcomponent="big">"#);
        assert_eq!(outcome.html, "ok");
        assert!(matches!(
            outcome.skipped[0],
            SkipReason::FragmentTooLarge { size: 7, .. }
        ));
    }

    #[test]
    fn test_local_definition_overrides_external() {
        let processor = processor_with(&[("a", "external a"), ("b", "external b")]);
        let html = processor.transform(
            r#"<htmlium-set component="a">local a</htmlium-set><htmlium loadcomponent="a">|<htmlium loadcomponent="b">"#,
        );
        assert_eq!(html, "local a|external b");
    }

    #[test]
    fn test_set_external_components_replaces() {
        let mut processor = processor_with(&[("a", "A")]);
        processor.set_external_components(FragmentMap::from([("b".to_owned(), "B".to_owned())]));
        assert!(!processor.external_components().contains_key("a"));
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a"><htmlium loadcomponent="b">"#),
            "B"
        );
    }

    #[test]
    fn test_selector_attribute_not_in_context() {
        let processor = processor_with(&[("a", "[{{loadcomponent}}][{{x}}]")]);
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" x="1">"#),
            "[][1]"
        );
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let processor = processor_with(&[("a", "<p>{{x}}</p>")]);
        let html = processor.transform(r#"<htmlium loadcomponent="a" x="<img onerror=alert(1)">"#);
        assert_eq!(html, "<p>&lt;img onerror&#x3D;alert(1)</p>");
    }

    #[test]
    fn test_component_markup_is_sanitized() {
        let processor = processor_with(&[(
            "a",
            r#"<div onclick="x()">{{t}}</div><script>bad()</script>"#,
        )]);
        let html = processor.transform(r#"<htmlium loadcomponent="a" t="x & y">"#);
        assert!(!html.contains("onclick"));
        assert!(!html.contains("<script"));
        assert!(html.contains("x &amp; y"));
    }

    #[test]
    fn test_sanitization_disabled_keeps_markup() {
        let mut config = Config::default();
        config.security.sanitize_html = false;
        let mut processor = Processor::new(config);
        processor.set_external_components(FragmentMap::from([(
            "a".to_owned(),
            "<script>{{t}}</script>".to_owned(),
        )]));
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" t="1 < 2">"#),
            "<script>1 < 2</script>"
        );
    }

    #[test]
    fn test_usage_site_limit() {
        let mut config = Config::default();
        config.limits.max_usage_sites = 3;
        let mut processor = Processor::new(config);
        processor
            .set_external_components(FragmentMap::from([("n".to_owned(), "[{{i}}]".to_owned())]));

        let markup: String = (0..8)
            .map(|i| format!(r#"<htmlium loadcomponent="n" i="{i}">"#))
            .collect();
        let outcome = processor.transform_report(&markup);

        assert_eq!(outcome.html, "[0][1][2]");
        assert_eq!(outcome.rendered, 3);
        assert_eq!(outcome.skipped, vec![SkipReason::SiteLimit { max: 3 }; 5]);
    }

    #[test]
    fn test_component_limit_skips_substitution() {
        let mut config = Config::default();
        config.limits.max_components = 1;
        let mut processor = Processor::new(config);
        processor.set_external_components(FragmentMap::from([("e".to_owned(), "E".to_owned())]));

        let outcome = processor.transform_report(
            r#"<htmlium-set component="l">L</htmlium-set><htmlium loadcomponent="l">"#,
        );
        assert!(outcome.component_limit_exceeded);
        assert_eq!(outcome.html, r#"<htmlium loadcomponent="l">"#);
    }

    #[test]
    fn test_oversized_input_is_rejected() {
        let mut config = Config::default();
        config.security.max_input_size = 8;
        let outcome = Processor::new(config).transform_report("<p>too long</p>");
        assert!(outcome.input_rejected);
        assert_eq!(outcome.html, "");
    }

    #[test]
    fn test_expansion_failure_is_isolated() {
        let mut config = Config::default();
        config.limits.max_depth = 1;
        let mut processor = Processor::new(config);
        processor.set_external_components(FragmentMap::from([
            ("loop".to_owned(), "{{#each xs}}x{{/each}}".to_owned()),
            ("plain".to_owned(), "ok".to_owned()),
        ]));

        let outcome = processor.transform_report(
            r#"[<htmlium loadcomponent="loop" xs="[1]">][<htmlium loadcomponent="plain">]"#,
        );
        assert_eq!(outcome.html, "[][ok]");
        assert_eq!(outcome.rendered, 1);
        assert!(matches!(
            &outcome.skipped[0],
            SkipReason::Expansion { name, .. } if name == "loop"
        ));
    }

    #[test]
    fn test_prototype_attribute_dropped() {
        let processor = processor_with(&[("a", "[{{constructor}}]")]);
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" constructor="x">"#),
            "[]"
        );
    }

    #[test]
    fn test_render_to_writes_sink() {
        let processor = processor_with(&[("a", "A")]);
        let mut sink = String::from("stale");
        let html = processor.render_to(r#"<htmlium loadcomponent="a">"#, Some(&mut sink));
        assert_eq!(html, "A");
        assert_eq!(sink, "A");

        assert_eq!(processor.render_to(r#"<htmlium loadcomponent="a">"#, None), "A");
    }

    #[test]
    fn test_reconfigure_invalidates_patterns() {
        let mut processor = processor_with(&[("a", "A")]);
        assert_eq!(processor.transform(r#"<htmlium loadcomponent="a">"#), "A");

        let mut config = Config::default();
        config.component.tag_name = "x-use".to_owned();
        processor.reconfigure(config);

        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a"><x-use loadcomponent="a">"#),
            r#"<htmlium loadcomponent="a">A"#
        );
    }

    #[test]
    fn test_expand_with_structured_context() {
        let processor = Processor::default();
        let context = serde_json::json!({"items": [1, 2, 3]});
        let html = processor
            .expand(
                "{{#each items}}{{this}}-{{@index}},{{/each}}",
                context.as_object().unwrap(),
            )
            .unwrap();
        assert_eq!(html, "1-0,2-1,3-2,");
    }

    #[test]
    fn test_structured_attribute_drives_loop() {
        let processor = processor_with(&[(
            "list",
            "<ul>{{#each items}}<li>{{this}}</li>{{/each}}</ul>",
        )]);
        let html = processor.transform(
            r#"<htmlium loadcomponent="list" items="[&quot;a&quot;,&quot;b&quot;]">"#,
        );
        assert_eq!(html, "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn test_invalid_json_attribute_stays_text() {
        let processor = processor_with(&[("a", "{{v}}|{{#each v}}x{{/each}}")]);
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" v="[oops">"#),
            "[oops|"
        );
    }

    #[test]
    fn test_structured_object_attribute() {
        let processor = processor_with(&[("a", "{{user.name}}")]);
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" user="{&quot;name&quot;:&quot;Ada&quot;}">"#),
            "Ada"
        );
    }

    #[test]
    fn test_json_like_attribute_prints_as_written() {
        let processor = processor_with(&[("a", "<b>{{title}}</b>")]);
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" title="[]">"#),
            "<b>[]</b>"
        );
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" title="[1, 2]">"#),
            "<b>[1, 2]</b>"
        );
    }

    #[test]
    fn test_empty_attribute_takes_else_branch() {
        let processor = processor_with(&[(
            "a",
            "{{#if sub}}<h2>{{sub}}</h2>{{#else}}none{{/if}}",
        )]);
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" sub="">"#),
            "none"
        );
        assert_eq!(
            processor.transform(r#"<htmlium loadcomponent="a" sub="Hi">"#),
            "<h2>Hi</h2>"
        );
    }

    #[test]
    fn test_default_limits_render_large_component_file() {
        let fragments: FragmentMap = (0..150)
            .map(|i| (format!("c{i}"), format!("C{i}")))
            .collect();
        let mut processor = Processor::default();
        processor.set_external_components(fragments);

        let outcome = processor.transform_report(r#"<p><htmlium loadcomponent="c1"></p>"#);
        assert!(!outcome.component_limit_exceeded);
        assert_eq!(outcome.html, "<p>C1</p>");
    }

    #[test]
    fn test_default_site_limit_empties_after_500() {
        let processor = processor_with(&[("a", "x")]);
        let markup = r#"<htmlium loadcomponent="a">"#.repeat(600);

        let outcome = processor.transform_report(&markup);
        assert_eq!(outcome.rendered, 500);
        assert_eq!(outcome.html, "x".repeat(500));
        assert_eq!(outcome.skipped.len(), 100);
        assert!(
            outcome
                .skipped
                .iter()
                .all(|reason| *reason == SkipReason::SiteLimit { max: 500 })
        );
    }
}
