//! Definition block discovery.

use regex::Regex;

use crate::FragmentMap;
use crate::attributes::parse_attributes;

/// Attribute on a definition block naming the fragment.
pub const COMPONENT_ATTRIBUTE: &str = "component";

/// Fragments defined in a document, plus the document without them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registry {
    /// Locally defined fragments.
    pub fragments: FragmentMap,
    /// Input markup with every definition block removed.
    pub markup: String,
}

/// Collect definition blocks from `markup`.
///
/// `definition` captures attributes and body of one block, `strip` matches any
/// block for removal. Blocks without a `component` attribute define nothing
/// but are still removed. When a name is defined twice the last block wins.
pub(crate) fn build(markup: &str, definition: &Regex, strip: &Regex) -> Registry {
    let mut fragments = FragmentMap::new();
    for caps in definition.captures_iter(markup) {
        let mut attrs = parse_attributes(&caps[1]);
        let Some(name) = attrs.remove(COMPONENT_ATTRIBUTE) else {
            continue;
        };
        if fragments.insert(name.clone(), caps[2].to_owned()).is_some() {
            tracing::debug!(component = %name, "Duplicate component definition, last wins");
        }
    }

    Registry {
        fragments,
        markup: strip.replace_all(markup, "").into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{PatternCache, PatternKind};
    use htmlium_config::Config;
    use pretty_assertions::assert_eq;

    fn registry(markup: &str) -> Registry {
        let config = Config::default();
        let cache = PatternCache::new();
        build(
            markup,
            &cache.get(PatternKind::DefinitionBlock, &config),
            &cache.get(PatternKind::DefinitionStrip, &config),
        )
    }

    #[test]
    fn test_no_definitions() {
        let result = registry("<p>plain</p>");
        assert!(result.fragments.is_empty());
        assert_eq!(result.markup, "<p>plain</p>");
    }

    #[test]
    fn test_single_definition() {
        let result = registry(
            r#"<main><htmlium-set component="card"><div>{{title}}</div></htmlium-set></main>"#,
        );
        assert_eq!(result.fragments["card"], "<div>{{title}}</div>");
        assert_eq!(result.markup, "<main></main>");
    }

    #[test]
    fn test_multiline_body() {
        let result = registry("<htmlium-set component=\"list\">\n<ul>\n<li>x</li>\n</ul>\n</htmlium-set>");
        assert_eq!(result.fragments["list"], "\n<ul>\n<li>x</li>\n</ul>\n");
        assert_eq!(result.markup, "");
    }

    #[test]
    fn test_multiple_definitions_are_non_greedy() {
        let result = registry(
            r#"<htmlium-set component="a">A</htmlium-set>between<htmlium-set component="b">B</htmlium-set>"#,
        );
        assert_eq!(result.fragments.len(), 2);
        assert_eq!(result.fragments["a"], "A");
        assert_eq!(result.fragments["b"], "B");
        assert_eq!(result.markup, "between");
    }

    #[test]
    fn test_duplicate_definition_last_wins() {
        let result = registry(
            r#"<htmlium-set component="a">first</htmlium-set><htmlium-set component="a">second</htmlium-set>"#,
        );
        assert_eq!(result.fragments["a"], "second");
    }

    #[test]
    fn test_block_without_component_is_stripped() {
        let result = registry(r#"x<htmlium-set name="a">A</htmlium-set>y"#);
        assert!(result.fragments.is_empty());
        assert_eq!(result.markup, "xy");
    }

    #[test]
    fn test_repeated_calls_are_independent() {
        let markup = r#"<htmlium-set component="a">A</htmlium-set>"#;
        assert_eq!(registry(markup), registry(markup));
    }
}
