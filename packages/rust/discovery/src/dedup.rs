//! Dedup-key normalization for discovered candidates.
//!
//! Two candidates describe the same lead when their normalized company
//! (or website domain, for nameless companies) and normalized contact name
//! match. The key is stored on the lead with a unique index.

use std::sync::LazyLock;

use leadflow_shared::website_domain;
use regex::Regex;

/// Legal-form suffixes dropped from the end of company names.
const COMPANY_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
    "gmbh",
    "ag",
    "sa",
    "sas",
    "plc",
    "bv",
    "oy",
    "ab",
];

/// Lowercase, replace punctuation with spaces, and collapse whitespace.
fn fold(input: &str) -> Vec<String> {
    static NON_WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));

    NON_WORD_RE
        .replace_all(&input.to_lowercase(), " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Normalize a company name: `"ACME, Inc."` and `"acme"` fold to `"acme"`.
pub fn normalize_company(name: &str) -> String {
    let mut tokens = fold(name);
    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|t| COMPANY_SUFFIXES.contains(&t.as_str()))
    {
        tokens.pop();
    }
    tokens.join(" ")
}

/// Normalize a person's name: case, punctuation and spacing are ignored.
pub fn normalize_person(name: &str) -> String {
    fold(name).join(" ")
}

/// Build the dedup key, or `None` when neither a company name nor a
/// website domain is usable.
pub fn dedup_key(company: &str, contact: Option<&str>, website: Option<&str>) -> Option<String> {
    let company_part = match normalize_company(company) {
        c if !c.is_empty() => c,
        _ => website.and_then(website_domain)?,
    };
    let contact_part = contact.map(normalize_person).unwrap_or_default();
    Some(format!("{company_part}|{contact_part}"))
}
