//! Shared handle on the config file backing `/config`.

use crate::config::{ChatwireConfig, RuntimeConfig, write_default_template};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Current file-backed configuration plus the mechanics behind
/// `/config show|path|save|generate|reload`. Runtime-only state (session id,
/// fork flag) never passes through here.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    state: Arc<Mutex<ChatwireConfig>>,
}

impl ConfigStore {
    pub fn new(path: PathBuf, config: ChatwireConfig) -> Self {
        Self {
            path,
            state: Arc::new(Mutex::new(config)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> ChatwireConfig {
        self.state.lock().await.clone()
    }

    /// Re-read the file and replace the in-memory config.
    pub async fn reload(&self) -> Result<ChatwireConfig> {
        let fresh = ChatwireConfig::load(Some(self.path.clone())).await?;
        let mut state = self.state.lock().await;
        *state = fresh.clone();
        tracing::info!(path = %self.path.display(), "configuration reloaded");
        Ok(fresh)
    }

    /// Persist a conversation's runtime configuration: the saveable subset is
    /// folded into `[general]`, everything else in the file is kept.
    pub async fn save_runtime(&self, runtime: &RuntimeConfig) -> Result<()> {
        let mut state = self.state.lock().await;
        state.general.agent_name = runtime.agent_name.clone();
        state.general.model = runtime.model.clone();
        state.general.working_dir = runtime.working_dir.display().to_string();
        state.general.permission_mode = runtime.permission_mode;
        state.general.system_prompt = runtime.system_prompt.clone();
        state.general.system_prompt_append = runtime.system_prompt_append.clone();
        state.general.claude_md_sources = runtime.claude_md_sources.clone();
        state.validate()?;
        write_config_file(&self.path, &state).await?;
        tracing::info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    /// Render the current configuration as TOML (for `/config show`).
    pub async fn render(&self) -> Result<String> {
        let state = self.state.lock().await;
        Ok(toml::to_string_pretty(&*state)?)
    }

    /// Write the default template unless a config file already exists.
    /// Returns true when a file was created.
    pub async fn generate_default(&self) -> Result<bool> {
        write_default_template(&self.path).await
    }
}

async fn write_config_file(path: &Path, config: &ChatwireConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = toml::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONFIG_TEMPLATE;
    use cw_backend::PermissionMode;

    fn test_config() -> ChatwireConfig {
        toml::from_str(DEFAULT_CONFIG_TEMPLATE).expect("parse default template")
    }

    #[tokio::test]
    async fn save_runtime_persists_the_saveable_subset() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        let store = ConfigStore::new(path.clone(), test_config());

        let cfg = store.snapshot().await;
        let mut runtime = RuntimeConfig::from_config(&cfg).expect("runtime config");
        runtime.permission_mode = PermissionMode::AcceptEdits;
        runtime.model = "claude-opus-4-1".to_string();
        runtime.agent_name = "Pairbot".to_string();
        store.save_runtime(&runtime).await.expect("save runtime");

        let reloaded = ChatwireConfig::load(Some(path)).await.expect("load saved");
        assert_eq!(reloaded.general.agent_name, "Pairbot");
        assert_eq!(reloaded.general.model, "claude-opus-4-1");
        assert_eq!(
            reloaded.general.permission_mode,
            PermissionMode::AcceptEdits
        );
    }

    #[tokio::test]
    async fn generate_default_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        let store = ConfigStore::new(path.clone(), test_config());

        assert!(store.generate_default().await.expect("first generate"));
        assert!(!store.generate_default().await.expect("second generate"));
        let written = tokio::fs::read_to_string(&path).await.expect("read file");
        assert_eq!(written, DEFAULT_CONFIG_TEMPLATE);
    }

    #[tokio::test]
    async fn reload_replaces_the_in_memory_state() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            DEFAULT_CONFIG_TEMPLATE.replace("agent_name = \"Chatwire\"", "agent_name = \"Edited\""),
        )
        .await
        .expect("write edited config");

        let store = ConfigStore::new(path, test_config());
        assert_eq!(store.snapshot().await.general.agent_name, "Chatwire");
        store.reload().await.expect("reload");
        assert_eq!(store.snapshot().await.general.agent_name, "Edited");
    }
}
