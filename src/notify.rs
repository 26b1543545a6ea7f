//! Notification gateway.
//!
//! Notifications are best-effort: the scheduler logs delivery failures and
//! carries on.

use crate::config::NotifyConfig;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Longest error text included in a failure notification.
const MAX_ERROR_CHARS: usize = 300;

/// User-visible outcome announced by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    TaskCompleted {
        task_title: String,
        page_url: String,
        follow_up_topics: Vec<String>,
    },
    TaskFailed {
        task_title: String,
        error_message: String,
    },
    ProjectCompleted {
        project_title: String,
    },
}

impl Notification {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::ProjectCompleted { .. } => "project_completed",
        }
    }

    /// Chat message text.
    pub fn render(&self) -> String {
        match self {
            Self::TaskCompleted {
                task_title,
                page_url,
                follow_up_topics,
            } => {
                let mut lines = vec![
                    format!("\u{2705} Completed: {task_title}"),
                    format!("\u{1f517} {page_url}"),
                ];
                if !follow_up_topics.is_empty() {
                    lines.push(String::new());
                    lines.push("\u{1f4a1} Follow-up topics discovered:".to_owned());
                    lines.extend(follow_up_topics.iter().map(|t| format!("- {t}")));
                    lines.push(String::new());
                    lines.push("Use /add <topic> to research any of these.".to_owned());
                }
                lines.join("\n")
            }
            Self::TaskFailed {
                task_title,
                error_message,
            } => format!(
                "\u{274c} Research task failed: {task_title}\nError: {}",
                truncate_error(error_message)
            ),
            Self::ProjectCompleted { project_title } => {
                format!("\u{1f389} All backlog tasks are complete for \"{project_title}\".")
            }
        }
    }
}

/// Keep error text under [`MAX_ERROR_CHARS`], ending in `...` when cut.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_CHARS {
        return message.to_owned();
    }
    let mut out: String = message.chars().take(MAX_ERROR_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Delivers notifications to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        info!(kind = notification.kind(), "{}", notification.render());
        Ok(())
    }
}

/// Sends notifications through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built with `timeout`.
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building telegram HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    /// `Ok(None)` unless both the bot token and chat id are set.
    pub fn from_config(config: &NotifyConfig) -> anyhow::Result<Option<Self>> {
        let (Some(token), Some(chat)) = (
            config.telegram_bot_token.as_deref(),
            config.telegram_chat_id.as_deref(),
        ) else {
            return Ok(None);
        };
        Self::new(&config.telegram_api_base, token, chat, config.timeout()).map(Some)
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        let response = self
            .client
            .post(self.send_message_url())
            .json(&json!({
                "chat_id": self.chat_id,
                "text": notification.render(),
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, kind = notification.kind(), "telegram rejected notification");
            anyhow::bail!("telegram sendMessage returned {status}: {}", body.trim());
        }
        Ok(())
    }
}
