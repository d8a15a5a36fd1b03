//! Pipeline Orchestrator — drives messages from discovery to
//! acknowledgement.
//!
//! **Core invariant: external read-state and the local seen store are
//! mutated only after confirmed delivery.** A message whose digest
//! never reached the chat stays unread and unseen, and resurfaces on
//! the next run.
//!
//! Per-message states: Discovered → Read → Enriched → Summarized →
//! Delivered → Acknowledged, with read failures short-circuiting to
//! Acknowledged (seen, no delivery) so a permanently broken message is
//! not retried forever.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::article::{Article, ArticleSource};
use crate::error::Result;
use crate::mail::{EmailMessage, MailAccount, MessageMeta};
use crate::notify::Notify;
use crate::state::SeenStore;
use crate::summarize::{EnrichedMessage, SummarizerChain, build_batch_prompt, build_message_prompt};
use crate::text::truncate_bytes;
use crate::urls::extract_candidate_urls;

/// Raw-snippet fallback keeps at most this much snippet text.
const SNIPPET_FALLBACK_BYTES: usize = 500;

/// Notification sent when a batch run finds nothing to digest.
const NO_UNREAD_TEXT: &str = "📭 No unread messages";

/// Terminal state a message reached this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered and acknowledged.
    Delivered,
    /// Read failed; acknowledged without delivery.
    Unreadable,
    /// Delivery failed; all state left untouched for the next run.
    DeliveryFailed,
}

/// Orchestrator tuning. Defaults are production values; tests zero the
/// delays.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum article links fetched per message.
    pub max_urls: usize,
    /// Pause between processed messages (downstream rate limits).
    pub message_delay: Duration,
    /// Pause between thread reads in batch mode.
    pub read_delay: Duration,
    /// Pause between read-marking calls in batch mode.
    pub mark_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_urls: 3,
            message_delay: Duration::from_secs(1),
            read_delay: Duration::from_millis(300),
            mark_delay: Duration::from_millis(200),
        }
    }
}

/// Drives one run of the digest pipeline.
pub struct Pipeline {
    mail: Arc<dyn MailAccount>,
    articles: Arc<dyn ArticleSource>,
    summarizer: SummarizerChain,
    notifier: Arc<dyn Notify>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        mail: Arc<dyn MailAccount>,
        articles: Arc<dyn ArticleSource>,
        summarizer: SummarizerChain,
        notifier: Arc<dyn Notify>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            mail,
            articles,
            summarizer,
            notifier,
            config,
        }
    }

    // ── Per-message mode ────────────────────────────────────────────

    /// Process every un-seen message matching `query` independently.
    /// Returns the number of messages delivered.
    pub async fn run(&self, store: &mut SeenStore, query: &str) -> Result<usize> {
        let metas = match self.mail.search(query).await {
            Ok(metas) => metas,
            Err(e) => {
                error!(error = %e, "Mail search failed; nothing to process");
                Vec::new()
            }
        };
        info!(count = metas.len(), "Search returned candidate messages");

        let mut delivered = 0;
        for meta in &metas {
            if store.contains(&meta.id) {
                continue;
            }

            match self.process_message(meta).await {
                Outcome::Delivered => {
                    store.insert(&meta.id);
                    delivered += 1;
                }
                Outcome::Unreadable => {
                    store.insert(&meta.id);
                }
                Outcome::DeliveryFailed => {}
            }

            if !self.config.message_delay.is_zero() {
                tokio::time::sleep(self.config.message_delay).await;
            }
        }

        if store.is_dirty() {
            store.save()?;
        }
        info!(delivered, "Run complete");
        Ok(delivered)
    }

    /// Drive a single message through the state machine.
    async fn process_message(&self, meta: &MessageMeta) -> Outcome {
        let subject = meta.subject.as_deref().unwrap_or("(no subject)");
        info!(id = %meta.id, subject = %truncate_bytes(subject, 60), "Processing message");

        // Discovered → Read
        let message = match self.mail.fetch_thread(&meta.id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(id = %meta.id, "Thread unreadable; acknowledging without delivery");
                return Outcome::Unreadable;
            }
            Err(e) => {
                warn!(
                    id = %meta.id,
                    error = %e,
                    "Thread read failed; acknowledging without delivery"
                );
                return Outcome::Unreadable;
            }
        };

        // Read → Enriched
        let enriched = self.enrich(message).await;

        // Enriched → Summarized. An empty chain result is a valid
        // outcome — the notification falls back to the raw snippet.
        let prompt = build_message_prompt(&enriched);
        let text = match self.summarizer.summarize(&prompt).await {
            Some(summary) => format_summary_notification(&enriched.message, &summary),
            None => {
                info!(id = %meta.id, "No summary available; sending raw snippet");
                format_snippet_notification(&enriched.message)
            }
        };

        // Summarized → Delivered
        if let Err(e) = self.notifier.deliver(&text).await {
            error!(
                id = %meta.id,
                error = %e,
                "Delivery failed; message stays unread for the next run"
            );
            return Outcome::DeliveryFailed;
        }

        // Delivered → Acknowledged. A failed read-marking is logged but
        // not retried; the seen store alone prevents reprocessing.
        if let Err(e) = self.mail.mark_read(&meta.id).await {
            warn!(id = %meta.id, error = %e, "Failed to mark thread read");
        }
        Outcome::Delivered
    }

    // ── Batch mode ──────────────────────────────────────────────────

    /// Read every un-seen message matching `query`, summarize them in
    /// one call and deliver one digest. The delivery gate applies to
    /// the whole batch: all messages are acknowledged together, or none.
    pub async fn run_all(&self, store: &mut SeenStore, query: &str) -> Result<()> {
        let metas = match self.mail.search(query).await {
            Ok(metas) => metas,
            Err(e) => {
                error!(error = %e, "Mail search failed; nothing to process");
                return Ok(());
            }
        };

        let fresh: Vec<&MessageMeta> = metas.iter().filter(|m| !store.contains(&m.id)).collect();
        if fresh.is_empty() {
            info!("No unread messages");
            if let Err(e) = self.notifier.deliver(NO_UNREAD_TEXT).await {
                error!(error = %e, "Failed to deliver no-unread notice");
            }
            return Ok(());
        }

        let mut items: Vec<EnrichedMessage> = Vec::with_capacity(fresh.len());
        for meta in &fresh {
            match self.mail.fetch_thread(&meta.id).await {
                Ok(Some(message)) => {
                    debug!(id = %meta.id, "Read message for batch digest");
                    items.push(self.enrich(message).await);
                }
                Ok(None) => warn!(id = %meta.id, "Skipping unreadable thread"),
                Err(e) => warn!(id = %meta.id, error = %e, "Skipping unreadable thread"),
            }
            if !self.config.read_delay.is_zero() {
                tokio::time::sleep(self.config.read_delay).await;
            }
        }

        if items.is_empty() {
            warn!("No readable messages in batch; nothing to deliver");
            return Ok(());
        }

        let prompt = build_batch_prompt(&items);
        info!(
            messages = items.len(),
            prompt_bytes = prompt.len(),
            "Requesting batch summary"
        );

        let text = match self.summarizer.summarize(&prompt).await {
            Some(summary) => format!(
                "📬 Unread digest ({} messages) — {}\n{}\n\n{}",
                items.len(),
                Utc::now().format("%Y-%m-%d"),
                "─".repeat(30),
                summary
            ),
            None => {
                warn!("No summary available; sending raw digest");
                build_raw_digest(&items)
            }
        };

        if let Err(e) = self.notifier.deliver(&text).await {
            error!(error = %e, "Digest delivery failed; leaving every message unread");
            return Ok(());
        }

        // Delivery confirmed: commit local state first, then external
        // read-state.
        for item in &items {
            store.insert(&item.message.id);
        }
        store.save()?;

        for item in &items {
            if let Err(e) = self.mail.mark_read(&item.message.id).await {
                warn!(id = %item.message.id, error = %e, "Failed to mark thread read");
            }
            if !self.config.mark_delay.is_zero() {
                tokio::time::sleep(self.config.mark_delay).await;
            }
        }

        info!(count = items.len(), "Batch digest delivered and acknowledged");
        Ok(())
    }

    // ── Enrichment ──────────────────────────────────────────────────

    /// Fetch article content for each accepted link. Partial success is
    /// fine; zero articles is a valid enrichment outcome.
    async fn enrich(&self, message: EmailMessage) -> EnrichedMessage {
        let urls = extract_candidate_urls(&message.body, self.config.max_urls);
        debug!(id = %message.id, count = urls.len(), "Candidate article links");

        let mut articles = Vec::new();
        for url in urls {
            match self.articles.fetch(&url).await {
                Ok(Some(content)) => {
                    info!(
                        url = %truncate_bytes(&url, 60),
                        bytes = content.len(),
                        "Fetched article"
                    );
                    articles.push(Article { url, content });
                }
                Ok(None) => debug!(url = %truncate_bytes(&url, 60), "No usable article content"),
                Err(e) => {
                    warn!(url = %truncate_bytes(&url, 60), error = %e, "Article fetch failed");
                }
            }
        }

        EnrichedMessage { message, articles }
    }
}

// ── Notification formatting ─────────────────────────────────────────

/// Summary notification. Content is not HTML-escaped; the notifier
/// falls back to plain text when formatting breaks.
fn format_summary_notification(msg: &EmailMessage, summary: &str) -> String {
    format!("📧 <b>{}</b>\n👤 {}\n\n{}", msg.subject, msg.from, summary)
}

/// Best-effort notification when no summarizer produced anything.
fn format_snippet_notification(msg: &EmailMessage) -> String {
    format!(
        "📧 New message\nFrom: {}\nSubject: {}\n\n{}",
        msg.from,
        msg.subject,
        truncate_bytes(&msg.snippet, SNIPPET_FALLBACK_BYTES)
    )
}

/// Raw batch digest used when the whole provider chain came up empty.
fn build_raw_digest(items: &[EnrichedMessage]) -> String {
    let mut text = format!("📬 Unread messages ({})\n", items.len());
    for item in items {
        let msg = &item.message;
        text.push_str(&format!(
            "\n• From: {}\n  Subject: {}\n  {}\n",
            msg.from,
            msg.subject,
            truncate_bytes(&msg.snippet, SNIPPET_FALLBACK_BYTES)
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> EmailMessage {
        EmailMessage {
            id: id.into(),
            from: "alice@example.com".into(),
            subject: "Hello".into(),
            date: "Mon, 3 Aug 2026 09:00:00 +0000".into(),
            body: "body".into(),
            snippet: "the snippet".into(),
        }
    }

    #[test]
    fn summary_notification_carries_subject_sender_and_summary() {
        let text = format_summary_notification(&message("m-1"), "a fine summary");
        assert!(text.contains("<b>Hello</b>"));
        assert!(text.contains("alice@example.com"));
        assert!(text.contains("a fine summary"));
    }

    #[test]
    fn snippet_notification_caps_snippet() {
        let mut msg = message("m-1");
        msg.snippet = "s".repeat(2000);
        let text = format_snippet_notification(&msg);
        assert!(text.len() < 700);
        assert!(text.contains("From: alice@example.com"));
    }

    #[test]
    fn raw_digest_lists_every_message() {
        let items = vec![
            EnrichedMessage {
                message: message("m-1"),
                articles: vec![],
            },
            EnrichedMessage {
                message: {
                    let mut m = message("m-2");
                    m.subject = "Second".into();
                    m
                },
                articles: vec![],
            },
        ];
        let text = build_raw_digest(&items);
        assert!(text.contains("(2)"));
        assert!(text.contains("Subject: Hello"));
        assert!(text.contains("Subject: Second"));
    }
}
