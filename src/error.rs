//! Error types for inbox-digest.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Article fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Delivery error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },
}

/// Seen-id store errors. Fatal to the current run — without the store
/// no digest can be reliably deduplicated.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Mail CLI errors. Transient — the affected message is skipped.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to launch mail CLI: {reason}")]
    Spawn { reason: String },

    #[error("Mail CLI timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Mail CLI exited with code {code}: {stderr}")]
    CliExit { code: i32, stderr: String },

    #[error("Failed to parse mail CLI output: {0}")]
    Parse(String),
}

/// Article fetch errors. Transient — enrichment is best-effort and the
/// affected URL is dropped.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Paywall helper failed: {reason}")]
    Helper { reason: String },
}

/// Summarization provider errors. The chain advances to the next backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} request failed: {source}")]
    Request {
        provider: &'static str,
        source: reqwest::Error,
    },

    #[error("Provider {provider} returned status {status}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
    },
}

/// Chat delivery errors. Block the message's acknowledgement this run.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Delivery request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Delivery rejected with status {status}: {detail}")]
    Rejected {
        status: reqwest::StatusCode,
        detail: String,
    },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
