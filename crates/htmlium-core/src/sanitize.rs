//! Text escaping and best-effort markup filtering.
//!
//! [`Sanitizer::sanitize_markup`] is a single linear pass over pattern
//! matches, not a parser. Nested or malformed markup (for example a tag split
//! so that removing one dangerous token assembles another) can get through.
//! Treat its output as defense in depth, not a guarantee.

use std::sync::LazyLock;

use htmlium_config::SecurityConfig;
use regex::{Captures, Regex};

/// Substrings removed before tag filtering.
static DANGEROUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)javascript:|vbscript:|data:|\bon\w+\s*=|</?(?:script|iframe|object|embed|link|meta|style)\b[^>]*>",
    )
    .expect("invalid dangerous pattern regex")
});

/// Any opening or closing tag.
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>").expect("invalid tag regex")
});

/// Event handler attribute inside a tag.
static EVENT_ATTR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+on\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
        .expect("invalid event attribute regex")
});

/// `href`/`src` attribute inside a tag, value in group 1, 2 or 3.
static URL_ATTR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+(?:href|src)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("invalid url attribute regex")
});

/// Tags that survive markup sanitization.
const ALLOWED_TAGS: &[&str] = &[
    "div", "span", "p", "h1", "h2", "h3", "h4", "h5", "h6", "strong", "em", "b", "i", "u", "br",
    "hr", "ul", "ol", "li", "a", "img", "table", "tr", "td", "th", "thead", "tbody", "section",
    "article", "header", "footer", "nav", "main",
];

/// Escaping and filtering under a [`SecurityConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Sanitizer<'a> {
    security: &'a SecurityConfig,
}

impl<'a> Sanitizer<'a> {
    #[must_use]
    pub fn new(security: &'a SecurityConfig) -> Self {
        Self { security }
    }

    /// Escape HTML-significant characters in `text`.
    ///
    /// Input larger than `max_input_size` yields an empty string. When
    /// `sanitize_html` is off the text is returned unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use htmlium_config::SecurityConfig;
    /// use htmlium_core::Sanitizer;
    ///
    /// let security = SecurityConfig::default();
    /// let sanitizer = Sanitizer::new(&security);
    /// assert_eq!(sanitizer.escape_text("<b>"), "&lt;b&gt;");
    /// ```
    #[must_use]
    pub fn escape_text(&self, text: &str) -> String {
        if text.len() > self.security.max_input_size {
            return String::new();
        }
        if !self.security.sanitize_html {
            return text.to_owned();
        }

        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '&' => escaped.push_str("&amp;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#39;"),
                '/' => escaped.push_str("&#x2F;"),
                '`' => escaped.push_str("&#x60;"),
                '=' => escaped.push_str("&#x3D;"),
                _ => escaped.push(c),
            }
        }
        escaped
    }

    /// Filter an HTML fragment.
    ///
    /// 1. Removes script-bearing tokens (`javascript:`, `vbscript:`, `data:`,
    ///    `on*=`) and `script`/`iframe`/`object`/`embed`/`link`/`meta`/`style` tags
    /// 2. Lower-cases tag names and drops tags outside the allow-list
    /// 3. Removes event handler attributes and `href`/`src` attributes whose
    ///    scheme is `javascript:` or not in `allowed_protocols`
    #[must_use]
    pub fn sanitize_markup(&self, html: &str) -> String {
        let stripped = DANGEROUS_PATTERN.replace_all(html, "");

        TAG_PATTERN
            .replace_all(&stripped, |caps: &Captures| {
                let name = caps[2].to_ascii_lowercase();
                if !ALLOWED_TAGS.contains(&name.as_str()) {
                    return String::new();
                }
                let attrs = self.clean_attributes(&caps[3]);
                format!("<{}{name}{attrs}>", &caps[1])
            })
            .into_owned()
    }

    fn clean_attributes(&self, attrs: &str) -> String {
        let without_events = EVENT_ATTR_PATTERN.replace_all(attrs, "");
        URL_ATTR_PATTERN
            .replace_all(&without_events, |caps: &Captures| {
                let value = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map_or("", |m| m.as_str());
                if self.is_unsafe_url(value) {
                    String::new()
                } else {
                    caps[0].to_owned()
                }
            })
            .into_owned()
    }

    fn is_unsafe_url(&self, value: &str) -> bool {
        let value = value.trim().to_ascii_lowercase();
        if value.starts_with("javascript:") {
            return true;
        }
        url_scheme(&value).is_some_and(|scheme| !self.security.allows_protocol(scheme))
    }
}

/// Scheme of an absolute URL, without the colon.
///
/// Relative references (`/a:b`, `page.html`, `#top`) have none.
fn url_scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}
