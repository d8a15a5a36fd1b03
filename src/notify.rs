//! Notifier — delivers digest text to a Telegram chat.
//!
//! Oversized payloads are split on line boundaries and sent as separate
//! messages in order. A chunk rejected with HTML formatting is retried
//! once as plain text before the delivery counts as failed.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::error::NotifyError;
use crate::text::floor_char_boundary;

/// Maximum payload per sendMessage call.
const MAX_MESSAGE_LEN: usize = 4000;

/// Pause between chunks to respect rate limits.
const CHUNK_DELAY: Duration = Duration::from_millis(500);

/// Per-request timeout.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat delivery seam. Success means every chunk was accepted.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError>;
}

/// Telegram Bot API notifier.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Send a single chunk, HTML formatting first with a plain-text
    /// retry. Digest content is not HTML-escaped, so a summary that
    /// happens to contain markup can break the formatted attempt.
    async fn send_chunk(&self, text: &str) -> Result<(), NotifyError> {
        let html_body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&html_body)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let html_status = resp.status();
        warn!(
            status = %html_status,
            "sendMessage with HTML formatting rejected; retrying as plain text"
        );

        let plain_body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let detail: String = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        Err(NotifyError::Rejected { status, detail })
    }
}

#[async_trait]
impl Notify for TelegramNotifier {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        let chunks = split_message(text, MAX_MESSAGE_LEN);
        let total = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            self.send_chunk(chunk).await?;
            if i + 1 < total {
                tokio::time::sleep(CHUNK_DELAY).await;
            }
        }

        info!(chunks = total, "Digest delivered");
        Ok(())
    }
}

/// Split text into chunks of at most `max_len` bytes.
///
/// The boundary is the last newline inside the window; a newline before
/// half the window is ignored and the chunk is hard-cut at the limit on
/// a char boundary. The newline at a boundary is consumed, nothing else
/// is dropped.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // A newline before half the window is too early a boundary;
        // splitting there degenerates into a stream of tiny messages.
        let window_end = floor_char_boundary(remaining, max_len);
        let cut = match remaining[..window_end].rfind('\n') {
            Some(pos) if pos >= max_len / 2 => pos,
            _ => window_end,
        };

        chunks.push(remaining[..cut].to_string());
        remaining = remaining[cut..].trim_start_matches('\n');
    }

    chunks
}
