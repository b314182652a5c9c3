//! `${NAME}` placeholders in replication files.
//!
//! Placeholders are word characters only, which keeps them apart from
//! `${/path}` merge references.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

static RE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{(\w+)\}").unwrap());

/// Distinct placeholder names found in any of `texts`, sorted.
pub fn placeholders<'a, I>(texts: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    texts
        .into_iter()
        .flat_map(|t| RE_PLACEHOLDER.captures_iter(t))
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Replaces each placeholder with its value. Unknown placeholders are
/// left untouched.
pub fn fill_placeholders(text: &str, values: &BTreeMap<String, String>) -> String {
    RE_PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            values
                .get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
