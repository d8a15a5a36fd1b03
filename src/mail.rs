//! Mail Reader — drives the external mail-account CLI.
//!
//! The CLI is an opaque collaborator invoked as `search`, `thread get`
//! and `thread modify` subcommands emitting JSON. Threads carry a MIME
//! part tree with base64url-encoded bodies; the first plain-text part
//! wins and HTML is only decoded to text when no plain part exists.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::MailError;
use crate::text::{html_to_text, truncate_bytes};

/// Timeout for a single mail CLI invocation.
const CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// Part trees nested deeper than this are not walked further. MIME
/// nesting is shallow in practice.
const MAX_PART_DEPTH: usize = 32;

// ── Data model ──────────────────────────────────────────────────────

/// One row of the CLI's search output.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageMeta {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
}

/// A fully read message. Immutable once built; never persisted.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    /// Opaque identifier, stable per thread.
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: String,
    /// Plain-text body, capped to the configured byte limit.
    pub body: String,
    pub snippet: String,
}

// ── Thread JSON shape ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ThreadEnvelope {
    #[serde(default)]
    thread: Thread,
}

#[derive(Debug, Default, Deserialize)]
struct Thread {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    payload: Part,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: String,
}

// ── Mail account trait ──────────────────────────────────────────────

/// Mail-account operations the pipeline needs.
///
/// Implemented by the CLI wrapper; swapped for mocks in tests.
#[async_trait]
pub trait MailAccount: Send + Sync {
    /// Search for candidate messages matching `query`.
    async fn search(&self, query: &str) -> Result<Vec<MessageMeta>, MailError>;

    /// Read the first message of a thread. `Ok(None)` means the thread
    /// exists but carries nothing readable.
    async fn fetch_thread(&self, id: &str) -> Result<Option<EmailMessage>, MailError>;

    /// Remove the unread marker from a thread on the mail account.
    async fn mark_read(&self, id: &str) -> Result<(), MailError>;
}

// ── CLI implementation ──────────────────────────────────────────────

/// Mail account backed by the external mail CLI.
pub struct CliMailAccount {
    bin: String,
    account: String,
    max_body_bytes: usize,
}

impl CliMailAccount {
    pub fn new(bin: String, account: String, max_body_bytes: usize) -> Self {
        Self {
            bin,
            account,
            max_body_bytes,
        }
    }

    /// Run one CLI invocation and return its stdout.
    async fn run(&self, args: &[&str]) -> Result<String, MailError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .arg("--account")
            .arg(&self.account)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(CLI_TIMEOUT, cmd.output())
            .await
            .map_err(|_| MailError::Timeout {
                timeout: CLI_TIMEOUT,
            })?
            .map_err(|e| MailError::Spawn {
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MailError::CliExit {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.chars().take(200).collect(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MailAccount for CliMailAccount {
    async fn search(&self, query: &str) -> Result<Vec<MessageMeta>, MailError> {
        let raw = self
            .run(&["search", query, "--json", "--results-only"])
            .await?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| MailError::Parse(e.to_string()))
    }

    async fn fetch_thread(&self, id: &str) -> Result<Option<EmailMessage>, MailError> {
        let raw = self
            .run(&["thread", "get", id, "--json", "--results-only"])
            .await?;
        message_from_thread_json(id, &raw, self.max_body_bytes)
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailError> {
        self.run(&["thread", "modify", id, "--remove", "UNREAD", "--force"])
            .await?;
        debug!(id, "Marked thread read");
        Ok(())
    }
}

// ── Thread parsing ──────────────────────────────────────────────────

/// Parse the CLI's thread JSON into an [`EmailMessage`].
///
/// Only the first message of the thread is read; later messages repeat
/// quoted content and add little to a digest.
fn message_from_thread_json(
    id: &str,
    raw: &str,
    max_body_bytes: usize,
) -> Result<Option<EmailMessage>, MailError> {
    let envelope: ThreadEnvelope =
        serde_json::from_str(raw).map_err(|e| MailError::Parse(e.to_string()))?;

    let Some(msg) = envelope.thread.messages.into_iter().next() else {
        return Ok(None);
    };

    let mut from = String::new();
    let mut subject = String::new();
    let mut date = String::new();
    for header in &msg.payload.headers {
        let value = header.value.clone();
        match header.name.to_lowercase().as_str() {
            "from" if from.is_empty() => from = value,
            "subject" if subject.is_empty() => subject = value,
            "date" if date.is_empty() => date = value,
            _ => {}
        }
    }

    let (plain, html) = extract_bodies(&msg.payload);
    let body = match (plain, html) {
        (Some(text), _) => text,
        (None, Some(html)) => html_to_text(&html),
        (None, None) => String::new(),
    };

    Ok(Some(EmailMessage {
        id: id.to_string(),
        from,
        subject,
        date,
        body: truncate_bytes(&body, max_body_bytes).to_string(),
        snippet: msg.snippet,
    }))
}

/// Pre-order walk over the part tree collecting the first plain-text
/// and first HTML leaf. Iterative with an explicit stack, capped at
/// [`MAX_PART_DEPTH`].
fn extract_bodies(root: &Part) -> (Option<String>, Option<String>) {
    let mut plain: Option<String> = None;
    let mut html: Option<String> = None;

    let mut stack: Vec<(&Part, usize)> = vec![(root, 0)];
    while let Some((part, depth)) = stack.pop() {
        if !part.body.data.is_empty() {
            if part.mime_type == "text/plain" && plain.is_none() {
                plain = decode_body(&part.body.data);
            } else if part.mime_type == "text/html" && html.is_none() {
                html = decode_body(&part.body.data);
            }
        }
        if plain.is_some() && html.is_some() {
            break;
        }
        if depth < MAX_PART_DEPTH {
            for child in part.parts.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    }

    (plain, html)
}

/// Decode a base64url part body. Invalid UTF-8 is replaced rather than
/// rejected; a body that fails to decode at all is treated as absent.
fn decode_body(data: &str) -> Option<String> {
    match URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!(error = %e, "Failed to decode message part body");
            None
        }
    }
}
