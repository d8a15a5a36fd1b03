//! Candidate article-link extraction and filtering.
//!
//! Newsletter bodies are full of unsubscribe links, tracking beacons and
//! social buttons; only a handful of links point at actual articles.
//! Extraction keeps first-seen order and dedups by (host, path) so the
//! same article behind different tracking queries is fetched once.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).unwrap());

/// Anything shorter is assumed to be a link shortener with no real path.
/// Known to reject some legitimate short links; accepted false-negative.
const MIN_URL_LEN: usize = 20;

/// Punctuation commonly stuck to the end of a URL in running text.
const TRAILING_PUNCT: [char; 9] = ['.', ',', ';', ':', '!', '?', ')', '>', ']'];

/// Substrings that mark unsubscribe/tracking/beacon mechanisms.
const SKIP_URL_SUBSTRINGS: &[&str] = &[
    "unsubscribe",
    "optout",
    "opt-out",
    "preference",
    "click.",
    "tracking.",
    "trk.",
    "opens.",
    "beacon",
    "pixel",
    "1x1",
    "google.com/maps",
];

/// Known tracking/social/ad hosts.
const SKIP_DOMAINS: &[&str] = &[
    "list-manage.com",
    "mailchimp.com",
    "sendgrid.net",
    "manage.kmail-lists.com",
    "play.google.com",
    "itunes.apple.com",
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "doubleclick.net",
    "googlesyndication.com",
];

/// Path suffixes that are never articles.
const SKIP_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".css", ".js", ".woff",
];

/// Extract up to `max` article-candidate URLs from a message body.
///
/// Output order is first appearance in the body. Duplicates sharing a
/// lowercase (host, path) pair keep only the first occurrence.
pub fn extract_candidate_urls(body: &str, max: usize) -> Vec<String> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut accepted = Vec::new();

    for m in URL_RE.find_iter(body) {
        let raw = m.as_str().trim_end_matches(TRAILING_PUNCT);
        if raw.len() < MIN_URL_LEN {
            continue;
        }

        let lower = raw.to_lowercase();
        if SKIP_URL_SUBSTRINGS.iter().any(|p| lower.contains(p)) {
            continue;
        }

        let Ok(parsed) = Url::parse(raw) else {
            continue;
        };
        let host = parsed.host_str().unwrap_or("").to_lowercase();
        if SKIP_DOMAINS.iter().any(|d| host.contains(d)) {
            continue;
        }

        let path = parsed.path().to_lowercase();
        if SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            continue;
        }

        if !seen.insert((host, path)) {
            continue;
        }

        accepted.push(raw.to_string());
        if accepted.len() == max {
            break;
        }
    }

    accepted
}
