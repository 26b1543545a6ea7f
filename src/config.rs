//! Configuration types for the data repository, heartbeat and collaborators.

use crate::error::{NautilusError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NautilusConfig {
    /// Git data repository settings.
    pub data_repo: DataRepoConfig,
    /// Heartbeat scheduler settings.
    pub heartbeat: HeartbeatConfig,
    /// Defaults applied to newly initialized projects.
    pub project: ProjectDefaults,
    /// Research collaborator endpoint.
    pub research: ResearchConfig,
    /// Notification gateway settings.
    pub notify: NotifyConfig,
}

/// Git data repository configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataRepoConfig {
    /// `owner/name` on GitHub, a full remote URL, or a local path.
    pub remote: String,
    /// Access token embedded in https remote URLs.
    pub token: Option<String>,
    /// Tracked branch.
    pub branch: String,
    /// Local clone directory (None = `~/.nautilus/data/<repo-name>`).
    pub local_path: Option<PathBuf>,
    /// Commit author name.
    pub author_name: String,
    /// Commit author email.
    pub author_email: String,
}

impl Default for DataRepoConfig {
    fn default() -> Self {
        Self {
            remote: String::new(),
            token: None,
            branch: "main".to_owned(),
            local_path: None,
            author_name: "Nautilus Bot".to_owned(),
            author_email: "nautilus@bot.local".to_owned(),
        }
    }
}

impl DataRepoConfig {
    /// Last path component of the remote, without a `.git` suffix.
    pub fn repo_name(&self) -> String {
        let trimmed = self.remote.trim_end_matches('/');
        let last = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
        let name = last.strip_suffix(".git").unwrap_or(last);
        if name.is_empty() {
            "data".to_owned()
        } else {
            name.to_owned()
        }
    }

    /// Resolved local clone directory.
    pub fn resolved_local_path(&self) -> PathBuf {
        if let Some(path) = &self.local_path {
            return path.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".nautilus")
            .join("data")
            .join(self.repo_name())
    }
}

/// Heartbeat scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Minutes between cycles.
    pub interval_minutes: u64,
    /// Whether `run` starts the heartbeat at all.
    pub enabled: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            enabled: true,
        }
    }
}

impl HeartbeatConfig {
    /// Cycle interval as a [`std::time::Duration`].
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// Values stamped into `project.json` at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDefaults {
    /// Model identifier recorded on the project.
    pub default_model: String,
    /// Public URL of the generated site.
    pub site_url: String,
}

impl Default for ProjectDefaults {
    fn default() -> Self {
        Self {
            default_model: "gemini-2.5-flash".to_owned(),
            site_url: String::new(),
        }
    }
}

/// HTTP research endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// URL receiving research requests (None = research disabled).
    pub endpoint: Option<String>,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: 600,
        }
    }
}

/// Notification gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Telegram bot token (None = log-only notifications).
    pub telegram_bot_token: Option<String>,
    /// Chat receiving notifications.
    pub telegram_chat_id: Option<String>,
    /// Bot API base URL.
    pub telegram_api_base: String,
    /// Delivery timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: "https://api.telegram.org".to_owned(),
            timeout_secs: 15,
        }
    }
}

impl NotifyConfig {
    /// Delivery timeout as a [`std::time::Duration`].
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl NautilusConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| NautilusError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NautilusError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/nautilus/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("nautilus").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("nautilus")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/nautilus-config/config.toml")
        }
    }

    /// Overlay secrets and the remote from `NAUTILUS_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        if let Some(remote) = get("NAUTILUS_DATA_REPO") {
            self.data_repo.remote = remote;
        }
        if let Some(token) = get("NAUTILUS_GITHUB_TOKEN") {
            self.data_repo.token = Some(token);
        }
        if let Some(token) = get("NAUTILUS_TELEGRAM_BOT_TOKEN") {
            self.notify.telegram_bot_token = Some(token);
        }
        if let Some(chat) = get("NAUTILUS_TELEGRAM_CHAT_ID") {
            self.notify.telegram_chat_id = Some(chat);
        }
        if let Some(key) = get("NAUTILUS_RESEARCH_API_KEY") {
            self.research.api_key = Some(key);
        }
    }

    /// Check settings required to open the data repository.
    pub fn validate(&self) -> Result<()> {
        if self.data_repo.remote.trim().is_empty() {
            return Err(NautilusError::Config(
                "data_repo.remote is not set (or NAUTILUS_DATA_REPO)".to_owned(),
            ));
        }
        if self.data_repo.branch.trim().is_empty() {
            return Err(NautilusError::Config("data_repo.branch is empty".to_owned()));
        }
        if self.notify.telegram_bot_token.is_some() && self.notify.telegram_chat_id.is_none() {
            return Err(NautilusError::Config(
                "notify.telegram_chat_id is required with a bot token".to_owned(),
            ));
        }
        Ok(())
    }
}
