//! Summarizer — ordered chain of LLM provider backends.
//!
//! The chain tries each configured backend in order and settles for the
//! first non-empty answer. Provider failures are logged at this
//! boundary and never propagate; an exhausted chain yields `None` and
//! the caller falls back to raw content.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::error::ProviderError;
use crate::mail::EmailMessage;
use crate::text::truncate_bytes;

/// Generation temperature — deterministic-leaning.
const TEMPERATURE: f64 = 0.3;

/// Output token budget per provider call.
const MAX_OUTPUT_TOKENS: u32 = 1024;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_TIMEOUT: Duration = Duration::from_secs(30);

const DEEPSEEK_URL: &str = "https://api.deepseek.com/v1/chat/completions";
const DEEPSEEK_MODEL: &str = "deepseek-chat";
const DEEPSEEK_TIMEOUT: Duration = Duration::from_secs(60);

/// Prompt budget for a single message body.
const PROMPT_BODY_BYTES: usize = 3000;
/// Prompt budget per linked article.
const PROMPT_ARTICLE_BYTES: usize = 1500;
/// Prompt budget for a URL line.
const PROMPT_URL_BYTES: usize = 80;
/// Batch prompts carry many messages, so each gets a tighter budget.
const BATCH_BODY_BYTES: usize = 2500;
const BATCH_ARTICLE_BYTES: usize = 1000;

/// A message plus its fetched articles, ready for prompt assembly.
#[derive(Debug, Clone)]
pub struct EnrichedMessage {
    pub message: EmailMessage,
    pub articles: Vec<Article>,
}

// ── Backend trait ───────────────────────────────────────────────────

/// A summarization backend. Each call is independent and carries its
/// own timeout. `Ok(None)` means the provider answered with nothing
/// usable; `Err` means the call itself failed.
#[async_trait]
pub trait Summarize: Send + Sync {
    fn name(&self) -> &'static str;

    async fn summarize(&self, prompt: &str) -> Result<Option<String>, ProviderError>;
}

// ── Gemini ──────────────────────────────────────────────────────────

/// Primary backend: Gemini `generateContent`.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: SecretString, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl Summarize for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn summarize(&self, prompt: &str) -> Result<Option<String>, ProviderError> {
        let url = format!("{GEMINI_BASE}/{}:generateContent", self.model);
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            }
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .timeout(GEMINI_TIMEOUT)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: "gemini",
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                provider: "gemini",
                status: resp.status(),
            });
        }

        let data: Value = resp.json().await.map_err(|e| ProviderError::Request {
            provider: "gemini",
            source: e,
        })?;

        let text = data
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str);
        match text {
            Some(t) if !t.trim().is_empty() => Ok(Some(t.to_string())),
            _ => {
                warn!("Gemini returned no candidates");
                Ok(None)
            }
        }
    }
}

// ── DeepSeek ────────────────────────────────────────────────────────

/// Fallback backend: DeepSeek chat completions.
pub struct DeepSeekBackend {
    client: reqwest::Client,
    api_key: SecretString,
}

impl DeepSeekBackend {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl Summarize for DeepSeekBackend {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    async fn summarize(&self, prompt: &str) -> Result<Option<String>, ProviderError> {
        let body = serde_json::json!({
            "model": DEEPSEEK_MODEL,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_OUTPUT_TOKENS,
        });

        let resp = self
            .client
            .post(DEEPSEEK_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .timeout(DEEPSEEK_TIMEOUT)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: "deepseek",
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                provider: "deepseek",
                status: resp.status(),
            });
        }

        let data: Value = resp.json().await.map_err(|e| ProviderError::Request {
            provider: "deepseek",
            source: e,
        })?;

        let text = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str);
        match text {
            Some(t) if !t.trim().is_empty() => Ok(Some(t.to_string())),
            _ => {
                warn!("DeepSeek returned no choices");
                Ok(None)
            }
        }
    }
}

// ── Chain ───────────────────────────────────────────────────────────

/// Ordered provider chain. Adding a provider is a list insertion.
pub struct SummarizerChain {
    backends: Vec<Box<dyn Summarize>>,
}

impl SummarizerChain {
    pub fn new(backends: Vec<Box<dyn Summarize>>) -> Self {
        Self { backends }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Try each backend in order; `None` only when every backend failed
    /// or none are configured.
    pub async fn summarize(&self, prompt: &str) -> Option<String> {
        for backend in &self.backends {
            match backend.summarize(prompt).await {
                Ok(Some(text)) => {
                    info!(provider = backend.name(), "Summary generated");
                    return Some(text);
                }
                Ok(None) => {
                    warn!(provider = backend.name(), "Empty result; trying next provider");
                }
                Err(e) => {
                    warn!(
                        provider = backend.name(),
                        error = %e,
                        "Provider call failed; trying next provider"
                    );
                }
            }
        }

        if self.backends.is_empty() {
            debug!("No summarization backends configured");
        } else {
            warn!("All summarization providers failed");
        }
        None
    }
}

// ── Prompt assembly ─────────────────────────────────────────────────

/// Build the single-message summary prompt: fixed instruction template,
/// message metadata, capped body, numbered article excerpts.
pub fn build_message_prompt(enriched: &EnrichedMessage) -> String {
    let msg = &enriched.message;
    let mut prompt = format!(
        "Summarize the following email message.\n\
         1. One sentence stating the message's main point.\n\
         2. Key facts as 3-5 bullet points.\n\
         3. If linked article content is included, pull out its core arguments.\n\
         4. Clearly flag anything that requires action.\n\
         \n\
         From: {}\n\
         Subject: {}\n\
         Date: {}\n\
         \n\
         Body:\n{}",
        msg.from,
        msg.subject,
        msg.date,
        truncate_bytes(&msg.body, PROMPT_BODY_BYTES),
    );

    if !enriched.articles.is_empty() {
        prompt.push_str("\n\nLinked articles:");
        for (i, article) in enriched.articles.iter().enumerate() {
            prompt.push_str(&format!(
                "\n\n[Article {}] {}\n{}",
                i + 1,
                truncate_bytes(&article.url, PROMPT_URL_BYTES),
                truncate_bytes(&article.content, PROMPT_ARTICLE_BYTES),
            ));
        }
    }

    prompt
}

/// Build the whole-run digest prompt covering every unread message.
pub fn build_batch_prompt(items: &[EnrichedMessage]) -> String {
    let total = items.len();
    let mut prompt = format!(
        "You are a mail assistant. Write a digest of the following {total} unread messages.\n\
         \n\
         Requirements:\n\
         1. Start with a short overall overview (2-3 sentences).\n\
         2. Then cover each message: sender and subject, a summary of the core\n\
            content, key points from any linked article, and an [action needed]\n\
            tag wherever the reader must act.\n\
         3. End with a list of everything that needs attention.\n"
    );

    for (i, enriched) in items.iter().enumerate() {
        let msg = &enriched.message;
        prompt.push_str(&format!(
            "\n{}\nMessage {}/{}\nFrom: {}\nSubject: {}\nDate: {}\nBody:\n{}\n",
            "=".repeat(40),
            i + 1,
            total,
            msg.from,
            msg.subject,
            msg.date,
            truncate_bytes(&msg.body, BATCH_BODY_BYTES),
        ));
        for (j, article) in enriched.articles.iter().enumerate() {
            prompt.push_str(&format!(
                "[Article {}] {}\n{}\n",
                j + 1,
                truncate_bytes(&article.url, PROMPT_URL_BYTES),
                truncate_bytes(&article.content, BATCH_ARTICLE_BYTES),
            ));
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn message(body: &str) -> EmailMessage {
        EmailMessage {
            id: "m-1".into(),
            from: "alice@example.com".into(),
            subject: "Quarterly results".into(),
            date: "Mon, 3 Aug 2026 09:00:00 +0000".into(),
            body: body.into(),
            snippet: "snippet".into(),
        }
    }

    // ── Prompt assembly ─────────────────────────────────────────────

    #[test]
    fn message_prompt_carries_metadata_and_body() {
        let enriched = EnrichedMessage {
            message: message("the body text"),
            articles: vec![],
        };
        let prompt = build_message_prompt(&enriched);
        assert!(prompt.contains("From: alice@example.com"));
        assert!(prompt.contains("Subject: Quarterly results"));
        assert!(prompt.contains("the body text"));
        assert!(!prompt.contains("Linked articles"));
    }

    #[test]
    fn message_prompt_numbers_articles() {
        let enriched = EnrichedMessage {
            message: message("body"),
            articles: vec![
                Article {
                    url: "https://example.com/one".into(),
                    content: "first article".into(),
                },
                Article {
                    url: "https://example.com/two".into(),
                    content: "second article".into(),
                },
            ],
        };
        let prompt = build_message_prompt(&enriched);
        assert!(prompt.contains("[Article 1] https://example.com/one"));
        assert!(prompt.contains("[Article 2] https://example.com/two"));
        assert!(prompt.contains("first article"));
        assert!(prompt.contains("second article"));
    }

    #[test]
    fn message_prompt_caps_body() {
        let enriched = EnrichedMessage {
            message: message(&"y".repeat(10_000)),
            articles: vec![],
        };
        let prompt = build_message_prompt(&enriched);
        // Template overhead is small; the 10k body must have been cut.
        assert!(prompt.len() < PROMPT_BODY_BYTES + 500);
    }

    #[test]
    fn batch_prompt_covers_every_message() {
        let items = vec![
            EnrichedMessage {
                message: message("first body"),
                articles: vec![],
            },
            EnrichedMessage {
                message: message("second body"),
                articles: vec![],
            },
        ];
        let prompt = build_batch_prompt(&items);
        assert!(prompt.contains("2 unread messages"));
        assert!(prompt.contains("Message 1/2"));
        assert!(prompt.contains("Message 2/2"));
        assert!(prompt.contains("first body"));
        assert!(prompt.contains("second body"));
    }

    // ── Chain ordering ──────────────────────────────────────────────

    struct ScriptedBackend {
        label: &'static str,
        response: Result<Option<String>, ()>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Summarize for ScriptedBackend {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn summarize(&self, _prompt: &str) -> Result<Option<String>, ProviderError> {
            self.log.lock().unwrap().push(self.label);
            match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(()) => {
                    // Manufacture a request error without touching the network:
                    // an invalid URL fails at request-build time.
                    let err = reqwest::Client::new()
                        .get("http://")
                        .send()
                        .await
                        .unwrap_err();
                    Err(ProviderError::Request {
                        provider: self.label,
                        source: err,
                    })
                }
            }
        }
    }

    fn scripted(
        label: &'static str,
        response: Result<Option<String>, ()>,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Box<dyn Summarize> {
        Box::new(ScriptedBackend {
            label,
            response,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn chain_prefers_first_backend() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = SummarizerChain::new(vec![
            scripted("primary", Ok(Some("primary summary".into())), &log),
            scripted("fallback", Ok(Some("fallback summary".into())), &log),
        ]);
        assert_eq!(chain.summarize("p").await.as_deref(), Some("primary summary"));
        assert_eq!(*log.lock().unwrap(), vec!["primary"]);
    }

    #[tokio::test]
    async fn chain_falls_back_on_empty_primary() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = SummarizerChain::new(vec![
            scripted("primary", Ok(None), &log),
            scripted("fallback", Ok(Some("fallback summary".into())), &log),
        ]);
        assert_eq!(
            chain.summarize("p").await.as_deref(),
            Some("fallback summary")
        );
        assert_eq!(*log.lock().unwrap(), vec!["primary", "fallback"]);
    }

    #[tokio::test]
    async fn chain_falls_back_on_primary_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = SummarizerChain::new(vec![
            scripted("primary", Err(()), &log),
            scripted("fallback", Ok(Some("fallback summary".into())), &log),
        ]);
        assert_eq!(
            chain.summarize("p").await.as_deref(),
            Some("fallback summary")
        );
        assert_eq!(*log.lock().unwrap(), vec!["primary", "fallback"]);
    }

    #[tokio::test]
    async fn exhausted_chain_is_none() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = SummarizerChain::new(vec![scripted("primary", Ok(None), &log)]);
        assert!(chain.summarize("p").await.is_none());
    }

    #[tokio::test]
    async fn empty_chain_is_none() {
        let chain = SummarizerChain::new(vec![]);
        assert!(chain.is_empty());
        assert!(chain.summarize("p").await.is_none());
    }
}
