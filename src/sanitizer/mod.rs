//! Allow-list HTML cleaning for post bodies copied from the source site

use std::collections::{HashMap, HashSet};

/// Common inline formatting tags plus the line-break, span and word-break
/// tags the source site uses for quotes and long words.
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "b", "blockquote", "code", "em", "i", "li", "ol", "strong", "ul",
    "br", "span", "wbr",
];

const ALLOWED_TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href", "title"]),
    ("abbr", &["title"]),
    ("acronym", &["title"]),
];

const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Strips everything outside the allow-list. Never fails: malformed input
/// comes back as whatever the HTML parser could recover from it.
pub struct Sanitizer {
    cleaner: ammonia::Builder<'static>,
}

impl Sanitizer {
    pub fn new() -> Self {
        let tag_attributes: HashMap<&str, HashSet<&str>> = ALLOWED_TAG_ATTRIBUTES
            .iter()
            .map(|(tag, attributes)| (*tag, attributes.iter().copied().collect()))
            .collect();

        let mut cleaner = ammonia::Builder::default();
        cleaner
            .tags(ALLOWED_TAGS.iter().copied().collect())
            .tag_attributes(tag_attributes)
            .generic_attributes(HashSet::new())
            .url_schemes(ALLOWED_URL_SCHEMES.iter().copied().collect())
            .link_rel(None)
            .strip_comments(true);

        Self { cleaner }
    }

    pub fn sanitize(&self, raw_inner_html: &str) -> String {
        if raw_inner_html.trim().is_empty() {
            return String::new();
        }

        self.cleaner.clean(raw_inner_html).to_string()
    }

    /// Same as [`Sanitizer::sanitize`] for a fragment that may be missing.
    pub fn sanitize_optional(&self, raw_inner_html: Option<&str>) -> String {
        raw_inner_html
            .map(|raw| self.sanitize(raw))
            .unwrap_or_default()
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENTS: &[&str] = &[
        "",
        "plain text",
        r##"<a href="#p123" class="quotelink">&gt;&gt;123</a><br><span class="quote">&gt;implying</span>"##,
        "<script>alert(1)</script>hello",
        "<SCRIPT SRC=//evil.example/x.js></SCRIPT>",
        r#"<img src=x onerror="alert(1)">caption"#,
        r#"<b onclick="steal()">bold</b><style>body{}</style>"#,
        "<scr<script>ipt>alert(1)</script>",
        r#"<a href="javascript:alert(1)">click</a>"#,
        "<div><p>unclosed <i>italic<b>nested",
        "long<wbr>word and 5 < 6 & 7 > 3",
        "<!-- comment --><em>kept</em>",
        r#"<blockquote><ul><li>one</li><li>two</ul></blockquote>"#,
        "</span></span>stray closers",
    ];

    #[test]
    fn empty_input_gives_empty_output() {
        let sanitizer = Sanitizer::new();
        assert_eq!(sanitizer.sanitize(""), "");
        assert_eq!(sanitizer.sanitize_optional(None), "");
    }

    #[test]
    fn keeps_quote_markup_and_line_breaks() {
        let sanitizer = Sanitizer::new();
        let clean = sanitizer.sanitize(
            r##"<a href="#p123" class="quotelink">&gt;&gt;123</a><br><span class="quote">&gt;text</span>"##,
        );

        assert_eq!(
            clean,
            r##"<a href="#p123">&gt;&gt;123</a><br><span>&gt;text</span>"##
        );
    }

    #[test]
    fn removes_active_content() {
        let sanitizer = Sanitizer::new();

        assert_eq!(sanitizer.sanitize("<script>alert(1)</script>hello"), "hello");
        assert_eq!(
            sanitizer.sanitize(r#"<b onclick="steal()">bold</b>"#),
            "<b>bold</b>"
        );
        assert_eq!(
            sanitizer.sanitize(r#"<a href="javascript:alert(1)">click</a>"#),
            "<a>click</a>"
        );
    }

    #[test]
    fn output_never_contains_a_script_tag() {
        let sanitizer = Sanitizer::new();
        for fragment in FRAGMENTS {
            let clean = sanitizer.sanitize(fragment);
            assert!(
                !clean.to_lowercase().contains("<script"),
                "{fragment:?} produced {clean:?}"
            );
        }
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let sanitizer = Sanitizer::new();
        for fragment in FRAGMENTS {
            let once = sanitizer.sanitize(fragment);
            assert_eq!(sanitizer.sanitize(&once), once, "input {fragment:?}");
        }
    }
}
