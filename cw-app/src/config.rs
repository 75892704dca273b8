//! Chatwire configuration loader.

use cw_backend::{ClaudeMdSource, PermissionMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../../config-templates/config.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatwireConfig {
    pub general: GeneralConfig,
    #[serde(default = "default_model_aliases")]
    pub models: BTreeMap<String, String>,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// May use home-relative shorthand ("~", "~/src").
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_append: Option<String>,
    #[serde(default = "default_claude_md_sources")]
    pub claude_md_sources: Vec<ClaudeMdSource>,
}

fn default_agent_name() -> String {
    "Chatwire".to_string()
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_working_dir() -> String {
    "~".to_string()
}

fn default_claude_md_sources() -> Vec<ClaudeMdSource> {
    ClaudeMdSource::ALL.to_vec()
}

fn default_model_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("sonnet".to_string(), "claude-sonnet-4-5".to_string()),
        ("opus".to_string(), "claude-opus-4-1".to_string()),
        ("haiku".to_string(), "claude-haiku-4-5".to_string()),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Sender identities allowed to interact with the agent.
    #[serde(default)]
    pub allowed_senders: Vec<String>,
    /// If true, respond to any sender. Default is false for safety: external
    /// transports require an explicit allowlist.
    #[serde(default)]
    pub allow_all_senders: bool,
    #[serde(default = "default_permission_timeout_seconds")]
    pub permission_timeout_seconds: u64,
}

fn default_permission_timeout_seconds() -> u64 {
    crate::permissions::DEFAULT_PERMISSION_TIMEOUT.as_secs()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_senders: Vec::new(),
            allow_all_senders: false,
            permission_timeout_seconds: default_permission_timeout_seconds(),
        }
    }
}

impl SecurityConfig {
    pub fn is_sender_allowed(&self, sender_id: &str) -> bool {
        self.allow_all_senders || self.allowed_senders.iter().any(|s| s == sender_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_kind")]
    pub kind: String,
    /// Sender id the console transport reports for the local operator.
    #[serde(default = "default_operator")]
    pub operator: String,
}

fn default_transport_kind() -> String {
    "console".to_string()
}

fn default_operator() -> String {
    "operator".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            operator: default_operator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: String,
}

fn default_backend_kind() -> String {
    "dev".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
        }
    }
}

impl ChatwireConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            anyhow::anyhow!(
                "read config {}: {e} (run `chatwire init` to scaffold one)",
                path.display()
            )
        })?;

        let mut cfg: ChatwireConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CHATWIRE_MODEL") {
            if !v.trim().is_empty() {
                self.general.model = v;
            }
        }
        if let Ok(v) = std::env::var("CHATWIRE_AGENT_NAME") {
            if !v.trim().is_empty() {
                self.general.agent_name = v;
            }
        }
        if let Ok(v) = std::env::var("CHATWIRE_WORKING_DIR") {
            if !v.trim().is_empty() {
                self.general.working_dir = v;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.general.agent_name.trim().is_empty() {
            return Err(anyhow::anyhow!("general.agent_name must not be empty"));
        }
        if self.model_catalog().resolve(&self.general.model).is_none() {
            return Err(anyhow::anyhow!(
                "general.model {:?} is not a known shorthand or canonical model id",
                self.general.model
            ));
        }
        if self.general.system_prompt.is_some() && self.general.system_prompt_append.is_some() {
            return Err(anyhow::anyhow!(
                "general.system_prompt and general.system_prompt_append are mutually exclusive"
            ));
        }
        if self.security.permission_timeout_seconds == 0 {
            return Err(anyhow::anyhow!(
                "security.permission_timeout_seconds must be > 0"
            ));
        }
        if self.transport.kind != "console" {
            return Err(anyhow::anyhow!(
                "unsupported transport.kind: {:?}",
                self.transport.kind
            ));
        }
        if self.backend.kind != "dev" {
            return Err(anyhow::anyhow!(
                "unsupported backend.kind: {:?}",
                self.backend.kind
            ));
        }
        Ok(())
    }

    pub fn model_catalog(&self) -> ModelCatalog {
        ModelCatalog::new(self.models.clone())
    }
}

/// Shorthand-to-canonical model resolution, fed from the `[models]` table.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    aliases: BTreeMap<String, String>,
}

impl ModelCatalog {
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Resolve a shorthand (case-insensitive) to its canonical identifier.
    /// Canonical identifiers already in the table pass through unchanged.
    pub fn resolve(&self, requested: &str) -> Option<String> {
        let requested = requested.trim();
        if requested.is_empty() {
            return None;
        }
        if let Some((_, canonical)) = self
            .aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(requested))
        {
            return Some(canonical.clone());
        }
        self.aliases
            .values()
            .find(|canonical| canonical.eq_ignore_ascii_case(requested))
            .cloned()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, canonical)| (alias.as_str(), canonical.as_str()))
    }
}

/// Per-conversation mutable configuration, seeded from the config file.
/// Owned by exactly one conversation worker; never shared across
/// conversations.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub agent_name: String,
    pub working_dir: PathBuf,
    pub permission_mode: PermissionMode,
    /// Canonical model identifier.
    pub model: String,
    pub system_prompt: Option<String>,
    pub system_prompt_append: Option<String>,
    pub claude_md_sources: Vec<ClaudeMdSource>,
}

impl RuntimeConfig {
    pub fn from_config(cfg: &ChatwireConfig) -> anyhow::Result<Self> {
        let model = cfg
            .model_catalog()
            .resolve(&cfg.general.model)
            .ok_or_else(|| anyhow::anyhow!("unknown model: {}", cfg.general.model))?;
        Ok(Self {
            agent_name: cfg.general.agent_name.clone(),
            working_dir: expand_home(&cfg.general.working_dir),
            permission_mode: cfg.general.permission_mode,
            model,
            system_prompt: cfg.general.system_prompt.clone(),
            system_prompt_append: cfg.general.system_prompt_append.clone(),
            claude_md_sources: cfg.general.claude_md_sources.clone(),
        })
    }
}

pub fn default_config_path() -> PathBuf {
    home_dir().join(".chatwire").join("config.toml")
}

/// Expand home-relative shorthand ("~", "~/src") before any validation.
pub fn expand_home(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    if trimmed == "~" {
        return home_dir();
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        return home_dir().join(rest);
    }
    PathBuf::from(trimmed)
}

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

/// Write the default config template unless the file already exists.
/// Returns true when a file was created.
pub async fn write_default_template(path: &Path) -> anyhow::Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(false),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| anyhow::anyhow!("create config dir {}: {e}", parent.display()))?;
            }
            tokio::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
                .await
                .map_err(|e| anyhow::anyhow!("write config template {}: {e}", path.display()))?;
            Ok(true)
        }
        Err(err) => Err(anyhow::anyhow!(
            "inspect config path {}: {err}",
            path.display()
        )),
    }
}
