//! Citation marker extraction.
//!
//! Markers are bracketed groups of one or more `@key` tokens separated by
//! `;`, e.g. `[@smith2020]` or `[@smith2020; @doe2019]`. Keys consist of ASCII
//! letters, digits, `_` and `-`. Brackets that do not fit this shape
//! (`[see @x, p. 3]`, `[link](url)`) are ignored.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::models::CitationKey;

static CITATION_GROUP: OnceLock<Regex> = OnceLock::new();

fn citation_group() -> &'static Regex {
    CITATION_GROUP.get_or_init(|| {
        Regex::new(r"\[(?:@[A-Za-z0-9_-]+\s*;?\s*)+\]").expect("citation pattern is valid")
    })
}

/// Every candidate key of every marker, in document order, duplicates kept.
pub fn candidate_keys(text: &str) -> Vec<&str> {
    citation_group()
        .find_iter(text)
        .flat_map(|group| {
            let inner = &group.as_str()[1..group.as_str().len() - 1];
            inner.split(';').map(|token| {
                let token = token.trim();
                token.strip_prefix('@').unwrap_or(token)
            })
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Keys cited in `text` that are also in `valid_keys`.
///
/// The result holds no duplicates and keeps first-occurrence order. Text
/// without markers yields an empty list.
pub fn extract(text: &str, valid_keys: &HashSet<CitationKey>) -> Vec<CitationKey> {
    let mut seen: HashSet<&str> = HashSet::new();
    candidate_keys(text)
        .into_iter()
        .filter(|key| valid_keys.contains(*key))
        .filter(|key| seen.insert(*key))
        .map(str::to_string)
        .collect()
}
