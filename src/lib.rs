//! inbox-digest — unread-mail digest pipeline.
//!
//! Polls a mail account for unread messages, enriches them with linked
//! article content, summarizes through an ordered chain of LLM
//! providers and delivers the digest to a chat channel. Messages are
//! marked handled only after delivery succeeds.

pub mod article;
pub mod config;
pub mod error;
pub mod mail;
pub mod notify;
pub mod pipeline;
pub mod state;
pub mod summarize;
pub mod text;
pub mod urls;
