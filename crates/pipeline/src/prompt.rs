//! Prompt templates.
//!
//! Templates use two placeholder styles, `{{UPPER}}` and `{lower}`. Both are
//! resolved in a single pass over the template, so text substituted into a
//! placeholder is never scanned again: evidence containing `{braces}` stays
//! as written and cannot trigger further substitution.

use evidex_core::error::PromptError;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::LazyLock;

/// Placeholder name → value. Names match case-insensitively.
pub type PromptValues = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}|\{([A-Za-z0-9_]+)\}").expect("valid placeholder pattern")
});

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid slug pattern"));

pub const SINGLE_SHOT_TEMPLATE: &str = "\
You are an expert Software Product Line (SPL) engineer.

TASK:
Using ONLY the evidence below, construct a feature model for:
ROOT FEATURE: {{ROOT_FEATURE}}
DOMAIN: {{DOMAIN}}

OUTPUT FORMAT:
Return ONLY the XML feature model (no markdown, no explanation).

EVIDENCE:
{{CONTEXT}}
";

pub const ITERATIVE_INITIAL_TEMPLATE: &str = "\
You are an expert Software Product Line (SPL) engineer.

TASK:
Incrementally construct and refine a feature model for:
ROOT FEATURE: {{ROOT_FEATURE}}
DOMAIN: {{DOMAIN}}

RULES:
- Use ONLY the evidence provided below.
- Preserve previously established structure unless new evidence contradicts it.

PREVIOUS OUTPUT (empty on the first iteration):
{{PREVIOUS_OUTPUT}}

NEW EVIDENCE:
{{DELTA_CONTEXT}}

OUTPUT FORMAT:
Return ONLY the updated XML feature model (no markdown, no explanation).
";

pub const ITERATIVE_TEMPLATE: &str = "\
You are an expert SPL engineer.

TASK:
Merge the NEW evidence into the existing feature model.

ROOT FEATURE: {{ROOT_FEATURE}}
DOMAIN: {{DOMAIN}}

PREVIOUS FEATURE MODEL (XML):
{{PREVIOUS_OUTPUT}}

NEW EVIDENCE:
{{DELTA_CONTEXT}}

OUTPUT:
Return ONLY the updated XML feature model (no markdown).
";

pub const RETRIEVAL_TEMPLATE: &str = "\
You are an expert in feature modeling. Given the domain \"{{DOMAIN}}\" and root feature \"{{ROOT_FEATURE}}\", produce a FeatureIDE-compatible XML feature model using the EVIDENCE below.

EVIDENCE:
{{EVIDENCE}}
";

/// Substitute every `{{NAME}}` and `{name}` placeholder in `template`.
///
/// Unknown placeholders are left in place; with `strict` they are reported
/// as [`PromptError::UnresolvedPlaceholders`] (sorted, deduplicated).
pub fn render_template(
    template: &str,
    values: &PromptValues,
    strict: bool,
) -> Result<String, PromptError> {
    let lookup: HashMap<String, &str> = values
        .iter()
        .map(|(key, value)| (key.to_ascii_lowercase(), value.as_str()))
        .collect();
    let mut missing = BTreeSet::new();

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        match lookup.get(&name.to_ascii_lowercase()) {
            Some(value) => (*value).to_string(),
            None => {
                missing.insert(name.to_string());
                caps[0].to_string()
            }
        }
    });

    if strict && !missing.is_empty() {
        return Err(PromptError::UnresolvedPlaceholders(missing.into_iter().collect()));
    }
    Ok(rendered.into_owned())
}

/// Placeholder names present in `text`, sorted and deduplicated.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Read a template file, or fall back to `default` when no path is given.
pub fn load_template(path: Option<&Path>, default: &str) -> Result<String, PromptError> {
    match path {
        None => Ok(default.to_string()),
        Some(path) => std::fs::read_to_string(path)
            .map_err(|_| PromptError::TemplateNotFound(path.to_path_buf())),
    }
}

/// File-name-safe model name: `gpt-oss:120b-cloud` → `gpt-oss-120b-cloud`.
pub fn model_slug(model: &str) -> String {
    let slug = NON_ALNUM
        .replace_all(model, "-")
        .trim_matches('-')
        .to_lowercase();
    if slug.is_empty() {
        "unknown-model".into()
    } else {
        slug
    }
}
