//! Article Fetcher — best-effort retrieval of linked article text.
//!
//! Two paths: a specialized external helper for paywalled hosts, and a
//! plain HTTP GET for everything else. Failures never abort the
//! pipeline; a URL that yields nothing usable is simply dropped.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::text::{collapse_blank_lines, html_to_text, truncate_bytes};

/// Hosts whose content needs the external paywall helper.
const PAYWALLED_HOSTS: &[&str] = &["medium.com"];

/// Minimum article length after normalization; anything shorter is a
/// consent page, a login wall or an error page.
const MIN_ARTICLE_CHARS: usize = 50;

/// HTTP fetch timeout per URL.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Paywall helper timeout.
const HELPER_TIMEOUT: Duration = Duration::from_secs(30);

/// Some sites serve bots an empty shell; a browser-like agent gets the
/// same markup a reader would.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; inbox-digest/0.1)";

/// A fetched article attached to a message for prompt construction.
#[derive(Debug, Clone)]
pub struct Article {
    pub url: String,
    pub content: String,
}

/// Article retrieval seam. `Ok(None)` is a valid empty outcome
/// (non-article content, too short); `Err` is a transport failure.
/// Callers treat both as "no article".
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Option<String>, FetchError>;
}

/// Default fetcher: paywall helper where configured, HTTP otherwise.
pub struct ArticleFetcher {
    client: reqwest::Client,
    paywall_helper: Option<String>,
    max_bytes: usize,
}

impl ArticleFetcher {
    pub fn new(paywall_helper: Option<String>, max_bytes: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            paywall_helper,
            max_bytes,
        }
    }

    /// Run the external paywall helper with the URL as its argument.
    /// Output is accepted only if non-empty and above the minimum
    /// length threshold.
    async fn fetch_via_helper(
        &self,
        helper: &str,
        url: &str,
    ) -> Result<Option<String>, FetchError> {
        let mut cmd = Command::new(helper);
        cmd.arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(HELPER_TIMEOUT, cmd.output())
            .await
            .map_err(|_| FetchError::Helper {
                reason: format!("timed out after {HELPER_TIMEOUT:?}"),
            })?
            .map_err(|e| FetchError::Helper {
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            debug!(url, "Paywall helper exited non-zero");
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.chars().count() <= MIN_ARTICLE_CHARS {
            return Ok(None);
        }
        Ok(Some(truncate_bytes(&text, self.max_bytes).to_string()))
    }

    /// Plain HTTP path: GET, require 2xx and an HTML/text content type,
    /// normalize to trimmed text with single blank lines.
    async fn fetch_via_http(&self, url: &str) -> Result<Option<String>, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(HTTP_TIMEOUT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?
            .error_for_status()?;

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("html") && !content_type.contains("text") {
            debug!(url, content_type, "Skipping non-article content type");
            return Ok(None);
        }

        let raw = resp.text().await?;
        let text = if content_type.contains("html") {
            html_to_text(&raw)
        } else {
            raw
        };
        let text = collapse_blank_lines(&text);
        let text = text.trim();

        if text.chars().count() < MIN_ARTICLE_CHARS {
            return Ok(None);
        }
        Ok(Some(truncate_bytes(text, self.max_bytes).to_string()))
    }
}

#[async_trait]
impl ArticleSource for ArticleFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<String>, FetchError> {
        if let Some(helper) = self.paywall_helper.as_deref() {
            if is_paywalled(url) {
                match self.fetch_via_helper(helper, url).await {
                    Ok(Some(text)) => return Ok(Some(text)),
                    Ok(None) => debug!(url, "Paywall helper empty; trying direct fetch"),
                    Err(e) => {
                        warn!(url, error = %e, "Paywall helper failed; trying direct fetch");
                    }
                }
            }
        }
        self.fetch_via_http(url).await
    }
}

/// Whether the URL's host belongs to a known paywalled-content provider.
fn is_paywalled(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or("").to_lowercase();
    PAYWALLED_HOSTS.iter().any(|h| host.contains(h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paywall_detection_matches_host_not_path() {
        assert!(is_paywalled("https://medium.com/@someone/a-story-1234"));
        assert!(is_paywalled("https://blog.medium.com/post"));
        assert!(!is_paywalled("https://example.com/about-medium.com-links"));
        assert!(!is_paywalled("not a url"));
    }

    #[tokio::test]
    async fn helper_output_below_threshold_is_empty() {
        // `echo` prints the URL back — short output, below the threshold.
        let fetcher = ArticleFetcher::new(Some("echo".into()), 3000);
        let result = fetcher
            .fetch_via_helper("echo", "https://medium.com/x")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn helper_nonzero_exit_is_empty() {
        let fetcher = ArticleFetcher::new(Some("false".into()), 3000);
        let result = fetcher
            .fetch_via_helper("false", "https://medium.com/x")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn missing_helper_is_an_error() {
        let fetcher = ArticleFetcher::new(Some("/nonexistent/helper".into()), 3000);
        let err = fetcher
            .fetch_via_helper("/nonexistent/helper", "https://medium.com/x")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Helper { .. }));
    }
}
