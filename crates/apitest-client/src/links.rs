//! `Link` header parsing.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use std::collections::BTreeMap;

static REL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^\s*rel\s*=\s*"?([^"]+)"?\s*$"#).expect("rel pattern is valid"));

/// Map each `rel` in the `Link` headers to its target URL.
///
/// A `rel` listing several relations (`rel="next last"`) maps each of them.
pub(crate) fn parse_links(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();

    for value in headers.get_all(LINK) {
        let Ok(value) = value.to_str() else { continue };

        for entry in value.split(',') {
            let mut parts = entry.split(';');
            let Some(target) = parts.next().map(str::trim) else { continue };
            let Some(url) = target.strip_prefix('<').and_then(|t| t.strip_suffix('>')) else {
                continue;
            };

            for param in parts {
                if let Some(captures) = REL.captures(param) {
                    for rel in captures[1].split_whitespace() {
                        links.insert(rel.to_string(), url.to_string());
                    }
                }
            }
        }
    }

    links
}
