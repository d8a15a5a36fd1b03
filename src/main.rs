use std::sync::Arc;

use clap::Parser;
use secrecy::SecretString;

use inbox_digest::article::ArticleFetcher;
use inbox_digest::config::Config;
use inbox_digest::mail::CliMailAccount;
use inbox_digest::notify::TelegramNotifier;
use inbox_digest::pipeline::{Pipeline, PipelineConfig};
use inbox_digest::state::SeenStore;
use inbox_digest::summarize::{DeepSeekBackend, GeminiBackend, Summarize, SummarizerChain};

/// Batch mode covers the whole backlog, not just the recent window.
const BATCH_QUERY: &str = "is:unread";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::parse();

    // No delivery target means no run — checked before any mail state
    // is touched.
    let delivery = config.delivery()?;

    let mut backends: Vec<Box<dyn Summarize>> = Vec::new();
    if let Some(key) = config.gemini_api_key.as_deref().filter(|k| !k.is_empty()) {
        backends.push(Box::new(GeminiBackend::new(
            SecretString::from(key.to_string()),
            config.gemini_model.clone(),
        )));
    }
    if let Some(key) = config.deepseek_api_key.as_deref().filter(|k| !k.is_empty()) {
        backends.push(Box::new(DeepSeekBackend::new(SecretString::from(
            key.to_string(),
        ))));
    }
    if backends.is_empty() {
        tracing::warn!("No summarization backend configured; digests fall back to raw snippets");
    }

    let mail = Arc::new(CliMailAccount::new(
        config.mail_cli.clone(),
        config.account.clone(),
        config.max_body_bytes,
    ));
    let articles = Arc::new(ArticleFetcher::new(
        config.paywall_fetcher.clone(),
        config.max_article_bytes,
    ));
    let notifier = Arc::new(TelegramNotifier::new(delivery.bot_token, delivery.chat_id));

    let pipeline = Pipeline::new(
        mail,
        articles,
        SummarizerChain::new(backends),
        notifier,
        PipelineConfig {
            max_urls: config.max_urls,
            ..PipelineConfig::default()
        },
    );

    let mut store = SeenStore::load(&config.state_file)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        account = %config.account,
        seen = store.len(),
        batch = config.all,
        "Starting digest run"
    );

    if config.all {
        pipeline.run_all(&mut store, BATCH_QUERY).await?;
    } else {
        pipeline.run(&mut store, &config.query).await?;
    }

    Ok(())
}
