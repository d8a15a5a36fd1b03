//! Runtime configuration.
//!
//! Built once in `main` from CLI flags and environment variables, then
//! passed into each component constructor. Components never read the
//! process environment directly.

use std::path::PathBuf;

use clap::Parser;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Summarize unread mail into a chat digest.
#[derive(Parser, Clone)]
#[command(name = "inbox-digest", version)]
pub struct Config {
    /// Mail account identifier passed to the mail CLI.
    #[arg(long, env = "MAIL_ACCOUNT")]
    pub account: String,

    /// Mail CLI binary used for the search / thread get / thread modify calls.
    #[arg(long, env = "MAIL_CLI", default_value = "gog")]
    pub mail_cli: String,

    /// Path of the seen-id state file.
    #[arg(
        long,
        env = "STATE_FILE",
        default_value = "/var/lib/inbox-digest/seen-ids.txt"
    )]
    pub state_file: PathBuf,

    /// Bot token for chat delivery. Required — without it the run aborts
    /// before touching any mail state.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Chat id the digest is delivered to.
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub chat_id: Option<String>,

    /// API key for the primary summarization backend (Gemini).
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Model name for the Gemini backend.
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.0-flash")]
    pub gemini_model: String,

    /// API key for the fallback summarization backend (DeepSeek).
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub deepseek_api_key: Option<String>,

    /// Mail search query for per-message runs.
    #[arg(
        long,
        env = "MAIL_SEARCH_QUERY",
        default_value = "is:unread newer_than:10m"
    )]
    pub query: String,

    /// External helper command for paywalled articles. Invoked with the
    /// URL as its only argument; expected to print article text.
    #[arg(long, env = "PAYWALL_FETCH_CMD")]
    pub paywall_fetcher: Option<String>,

    /// Maximum article links fetched per message.
    #[arg(long, env = "MAX_URLS", default_value_t = 3)]
    pub max_urls: usize,

    /// Maximum bytes of fetched article text kept per link.
    #[arg(long, env = "MAX_ARTICLE_BYTES", default_value_t = 3000)]
    pub max_article_bytes: usize,

    /// Maximum bytes of message body kept for prompt construction.
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 5000)]
    pub max_body_bytes: usize,

    /// Batch mode: summarize every unread message into a single digest
    /// delivered as one notification. Searches all unread mail
    /// (`--query` is ignored).
    #[arg(long)]
    pub all: bool,
}

/// Validated delivery credentials.
#[derive(Debug)]
pub struct DeliveryConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
}

impl Config {
    /// Extract the delivery credentials.
    ///
    /// Absence is fatal: a run without a delivery target cannot do
    /// anything useful and must not mutate any mail state.
    pub fn delivery(&self) -> Result<DeliveryConfig, ConfigError> {
        let bot_token = self
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "TELEGRAM_BOT_TOKEN".into(),
                hint: "no delivery credential; refusing to run".into(),
            })?;

        let chat_id = self
            .chat_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "TELEGRAM_CHAT_ID".into(),
                hint: "no delivery target; refusing to run".into(),
            })?;

        Ok(DeliveryConfig {
            bot_token: SecretString::from(bot_token.to_string()),
            chat_id: chat_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut full = vec!["inbox-digest"];
        full.extend_from_slice(args);
        Config::try_parse_from(full).expect("parse failed")
    }

    #[test]
    fn defaults_are_documented_values() {
        let cfg = parse(&["--account", "me@example.com", "--bot-token", "t", "--chat-id", "1"]);
        assert_eq!(cfg.mail_cli, "gog");
        assert_eq!(cfg.query, "is:unread newer_than:10m");
        assert_eq!(cfg.gemini_model, "gemini-2.0-flash");
        assert_eq!(cfg.max_urls, 3);
        assert_eq!(cfg.max_article_bytes, 3000);
        assert_eq!(cfg.max_body_bytes, 5000);
        assert!(!cfg.all);
    }

    #[test]
    fn delivery_requires_token_and_chat_id() {
        let cfg = parse(&[
            "--account",
            "me@example.com",
            "--bot-token",
            "123:ABC",
            "--chat-id",
            "42",
        ]);
        let delivery = cfg.delivery().expect("credentials present");
        assert_eq!(delivery.chat_id, "42");
    }

    #[test]
    fn empty_bot_token_is_fatal() {
        let cfg = parse(&[
            "--account",
            "me@example.com",
            "--bot-token",
            "",
            "--chat-id",
            "42",
        ]);
        let err = cfg.delivery().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn empty_chat_id_is_fatal() {
        let cfg = parse(&[
            "--account",
            "me@example.com",
            "--bot-token",
            "123:ABC",
            "--chat-id",
            "",
        ]);
        let err = cfg.delivery().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_CHAT_ID"));
    }
}
