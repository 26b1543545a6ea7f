//! Research collaborator seam.
//!
//! The scheduler hands one task (plus its section context) to a
//! [`ResearchAgent`] and gets back markdown, sources and follow-up topics.
//! Prompting, model selection and search tooling live behind the agent.

use crate::config::ResearchConfig;
use crate::store::Task;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Most follow-up topics kept from one research run.
pub const MAX_FOLLOW_UP_TOPICS: usize = 8;

/// A cited source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Input for one research run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub project_scope: String,
    pub task: Task,
    pub section_title: String,
    pub section_description: String,
}

/// Output of a successful research run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOutput {
    pub markdown: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub follow_up_topics: Vec<String>,
}

impl ResearchOutput {
    /// Normalize follow-up topics and reject empty markdown.
    pub fn validated(mut self) -> anyhow::Result<Self> {
        if self.markdown.trim().is_empty() {
            anyhow::bail!("research returned empty markdown");
        }
        self.follow_up_topics = normalize_follow_up_topics(&self.follow_up_topics);
        Ok(self)
    }
}

/// Collapse whitespace, drop blanks and duplicates, keep at most eight.
pub fn normalize_follow_up_topics(topics: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for topic in topics {
        let normalized = topic.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() || out.contains(&normalized) {
            continue;
        }
        out.push(normalized);
        if out.len() == MAX_FOLLOW_UP_TOPICS {
            break;
        }
    }
    out
}

/// Performs research for one task.
#[async_trait]
pub trait ResearchAgent: Send + Sync {
    async fn run(&self, request: ResearchRequest) -> anyhow::Result<ResearchOutput>;
}

/// Agent that POSTs the request as JSON to an HTTP endpoint.
pub struct HttpResearchAgent {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpResearchAgent {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built with `timeout`.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building research HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// `Ok(None)` when no endpoint is configured.
    pub fn from_config(config: &ResearchConfig) -> anyhow::Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if endpoint.is_empty() {
            return Ok(None);
        }
        Self::new(
            endpoint,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
        .map(Some)
    }
}

#[async_trait]
impl ResearchAgent for HttpResearchAgent {
    async fn run(&self, request: ResearchRequest) -> anyhow::Result<ResearchOutput> {
        debug!(task_id = %request.task.id, endpoint = %self.endpoint, "requesting research");
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("research endpoint returned {status}: {}", body.trim());
        }
        let output: ResearchOutput = response.json().await?;
        output.validated()
    }
}

/// Agent used when no endpoint is configured; every run fails.
pub struct UnconfiguredResearchAgent;

#[async_trait]
impl ResearchAgent for UnconfiguredResearchAgent {
    async fn run(&self, _request: ResearchRequest) -> anyhow::Result<ResearchOutput> {
        anyhow::bail!("no research endpoint configured (research.endpoint)")
    }
}
