//! Retrieval query templating.
//!
//! Templates use `{{NAME}}` placeholders. Substituted values are sanitized
//! first (line breaks and tabs collapsed, repeated whitespace collapsed,
//! braces removed) so user text cannot open or close a placeholder.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Query used when no template is configured.
pub const DEFAULT_QUERY_TEMPLATE: &str = "({{ROOT_FEATURE}} AND {{DOMAIN}})
AND (approach OR methodology OR method OR framework OR architecture OR implementation OR design OR pipeline OR workflow OR algorithm OR technique OR system OR tool OR platform OR infrastructure)
AND (propose OR present OR introduce OR describe OR implement OR develop OR build OR realize OR evaluate OR validate OR experiment OR case study OR study)";

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n\t]+").expect("valid line-break pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid inline-space pattern"));

/// Sanitize one substitution value.
pub fn clean_token(value: &str) -> String {
    let value = LINE_BREAKS.replace_all(value.trim(), " ");
    let value = WHITESPACE.replace_all(&value, " ");
    value.replace(['{', '}'], "").trim().to_string()
}

/// Fill `{{ROOT_FEATURE}}`, `{{DOMAIN}}` and any `extra` placeholders.
///
/// Runs of spaces and tabs in the result collapse to one space; the
/// template's own line breaks are kept.
pub fn build_query(
    root_feature: &str,
    domain: &str,
    template: &str,
    extra: &BTreeMap<String, String>,
) -> String {
    let mut query = template
        .replace("{{ROOT_FEATURE}}", &clean_token(root_feature))
        .replace("{{DOMAIN}}", &clean_token(domain));

    for (key, value) in extra {
        query = query.replace(&format!("{{{{{key}}}}}"), &clean_token(value));
    }

    INLINE_SPACE.replace_all(&query, " ").trim().to_string()
}
