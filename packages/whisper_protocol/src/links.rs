//! Link extraction from promoted lines.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Optional scheme, optional slashes, a dotted host, optional path.
///
/// Word boundaries and word characters are ASCII only, so a link directly
/// after non-Latin text (no separating space) is still found.
static URL_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?-u:\b)([a-z][A-Za-z0-9_-]+:)?(//+)?([a-z0-9-]+(\.[a-z0-9-]+)+)(/+\S*)?")
        .unwrap_or_else(|e| panic!("invalid link pattern: {e}"))
});

static HAS_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z][A-Za-z0-9_-]+:").unwrap_or_else(|e| panic!("invalid scheme pattern: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub host: String,
    pub url: String,
}

/// Every URL-like token in `text`, in order of appearance.
///
/// A single trailing period is treated as a sentence terminator. Tokens
/// without a scheme get `https:`. Candidates that do not parse as URLs are
/// dropped; repeated links are all reported.
pub fn extract_links(text: &str) -> Vec<Link> {
    URL_LIKE
        .find_iter(text)
        .filter_map(|m| to_link(m.as_str()))
        .collect()
}

fn to_link(candidate: &str) -> Option<Link> {
    let candidate = candidate.strip_suffix('.').unwrap_or(candidate);
    let full = if HAS_SCHEME.is_match(candidate) {
        candidate.to_string()
    } else {
        format!("https:{candidate}")
    };
    match Url::parse(&full) {
        Ok(url) => {
            let host = match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_string(),
                (None, _) => String::new(),
            };
            Some(Link {
                host,
                url: url.to_string(),
            })
        }
        Err(e) => {
            debug!(candidate, error = %e, "ignoring matched non-url");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_scheme_and_bare_links() {
        let links = extract_links("See https://example.com/a and www.test.org.");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].host, "example.com");
        assert_eq!(links[0].url, "https://example.com/a");
        assert_eq!(links[1].host, "www.test.org");
        assert_eq!(links[1].url, "https://www.test.org/");
    }

    #[test]
    fn strips_one_trailing_period_from_paths() {
        let links = extract_links("read example.com/notes.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/notes");
    }

    #[test]
    fn keeps_explicit_scheme() {
        let links = extract_links("mirror at ftp://files.example.net/pub");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].host, "files.example.net");
        assert_eq!(links[0].url, "ftp://files.example.net/pub");
    }

    #[test]
    fn reports_duplicates_in_order() {
        let links = extract_links("a.com then b.org then a.com");
        let hosts: Vec<&str> = links.iter().map(|l| l.host.as_str()).collect();
        assert_eq!(hosts, vec!["a.com", "b.org", "a.com"]);
    }

    #[test]
    fn plain_text_has_no_links() {
        assert!(extract_links("nothing to see here").is_empty());
        assert!(extract_links("").is_empty());
    }

    #[test]
    fn finds_links_adjacent_to_cjk_text() {
        let links = extract_links("詳細はexample.comを見て");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].host, "example.com");
        assert_eq!(links[0].url, "https://example.com/");
    }

    #[test]
    fn host_is_lowercased() {
        let links = extract_links("Visit WWW.Example.COM today");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].host, "www.example.com");
    }
}
