//! Per-conversation state: runtime configuration, the resumable session
//! handle, and the turn history, with the invalidation coupling between
//! them.
//!
//! The session id is backend-assigned and directory-scoped. Mutations that
//! change what a resumed session would mean (directory, model, system
//! prompt) clear the session handle, and any operation that clears the
//! handle clears the history in the same call - the two never drift.

use crate::config::{ModelCatalog, RuntimeConfig, expand_home};
use crate::history::HistoryLog;
use cw_backend::{ClaudeMdSource, PermissionMode};
use std::path::PathBuf;
use thiserror::Error;

/// Expected user-input failures. Rendered directly as chat replies; none of
/// these mutate state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("no active session to fork")]
    NoActiveSession,

    #[error("agent name must not be empty")]
    EmptyAgentName,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    session_id: Option<String>,
    fork_next: bool,
}

#[derive(Debug)]
pub struct ConversationState {
    pub config: RuntimeConfig,
    session: SessionState,
    history: HistoryLog,
}

impl ConversationState {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            session: SessionState::default(),
            history: HistoryLog::new(),
        }
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryLog {
        &mut self.history
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.session_id.as_deref()
    }

    pub fn fork_pending(&self) -> bool {
        self.session.fork_next
    }

    /// Direct set (used by `/session <id>` and the backend's session-created
    /// notice, which must not disturb mid-query history). Setting to `None`
    /// is an invalidation and clears the history with it.
    pub fn set_session_id(&mut self, id: Option<String>) {
        match id {
            Some(id) => self.session.session_id = Some(id),
            None => self.invalidate_session(),
        }
    }

    /// Drop the session handle, the fork flag, and the history in one
    /// operation.
    pub fn invalidate_session(&mut self) {
        self.session = SessionState::default();
        self.history.clear();
    }

    /// `/clear`: a fresh conversation, including a fresh session handle.
    pub fn reset_conversation(&mut self) {
        self.invalidate_session();
    }

    /// Queue a fork of the current session for the next query. Requires an
    /// active session id; the flag is consumed by [`take_fork_flag`].
    ///
    /// [`take_fork_flag`]: Self::take_fork_flag
    pub fn enable_fork(&mut self) -> Result<(), StateError> {
        if self.session.session_id.is_none() {
            return Err(StateError::NoActiveSession);
        }
        self.session.fork_next = true;
        Ok(())
    }

    /// Consume the one-shot fork flag. Called once per query, before the
    /// outcome is known.
    pub fn take_fork_flag(&mut self) -> bool {
        std::mem::take(&mut self.session.fork_next)
    }

    /// Change the working directory. The target is expanded from
    /// home-relative shorthand and must be an existing directory; on success
    /// the session and history are invalidated (session ids are
    /// directory-scoped).
    pub async fn set_directory(&mut self, raw: &str) -> Result<PathBuf, StateError> {
        let path = expand_home(raw);
        let display = path.display().to_string();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| StateError::DirectoryNotFound(display.clone()))?;
        if !metadata.is_dir() {
            return Err(StateError::NotADirectory(display));
        }
        self.invalidate_session();
        self.config.working_dir = path.clone();
        Ok(path)
    }

    /// Change the model. Shorthands resolve through the catalog; an
    /// unrecognized name is rejected without mutating anything. Success
    /// invalidates session and history (a resumed session is not portable
    /// across models).
    pub fn set_model(
        &mut self,
        requested: &str,
        catalog: &ModelCatalog,
    ) -> Result<String, StateError> {
        let canonical = catalog
            .resolve(requested)
            .ok_or_else(|| StateError::UnknownModel(requested.trim().to_string()))?;
        self.invalidate_session();
        self.config.model = canonical.clone();
        Ok(canonical)
    }

    /// Replace or clear the system prompt. A non-empty value clears any
    /// append-mode prompt (the two are mutually exclusive). Always
    /// invalidates session and history.
    pub fn set_system_prompt(&mut self, value: Option<String>) {
        self.invalidate_session();
        self.config.system_prompt = normalize(value);
        if self.config.system_prompt.is_some() {
            self.config.system_prompt_append = None;
        }
    }

    /// Replace or clear the append-mode prompt; the mirror image of
    /// [`set_system_prompt`].
    ///
    /// [`set_system_prompt`]: Self::set_system_prompt
    pub fn set_system_prompt_append(&mut self, value: Option<String>) {
        self.invalidate_session();
        self.config.system_prompt_append = normalize(value);
        if self.config.system_prompt_append.is_some() {
            self.config.system_prompt = None;
        }
    }

    /// Permission mode is orthogonal to conversational context: no
    /// invalidation.
    pub fn set_mode(&mut self, mode: PermissionMode) {
        self.config.permission_mode = mode;
    }

    pub fn set_agent_name(&mut self, name: &str) -> Result<(), StateError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StateError::EmptyAgentName);
        }
        self.config.agent_name = trimmed.to_string();
        Ok(())
    }

    pub fn set_claude_md_sources(&mut self, sources: Vec<ClaudeMdSource>) {
        self.config.claude_md_sources = sources;
    }

    /// Swap in a new runtime configuration (`/config reload`). The reloaded
    /// defaults may change directory or model, so the session is invalidated.
    pub fn replace_config(&mut self, config: RuntimeConfig) {
        self.invalidate_session();
        self.config = config;
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatwireConfig, DEFAULT_CONFIG_TEMPLATE};
    use cw_backend::ConversationTurn;

    fn state() -> (ConversationState, ModelCatalog) {
        let cfg: ChatwireConfig =
            toml::from_str(DEFAULT_CONFIG_TEMPLATE).expect("parse default template");
        let runtime = RuntimeConfig::from_config(&cfg).expect("runtime config");
        (ConversationState::new(runtime), cfg.model_catalog())
    }

    fn seed_session(state: &mut ConversationState) {
        state.set_session_id(Some("sess-1".to_string()));
        state.history_mut().append(ConversationTurn::user("hi"));
        state
            .history_mut()
            .append(ConversationTurn::assistant("hello"));
    }

    #[tokio::test]
    async fn directory_change_clears_session_and_history() {
        let (mut state, _) = state();
        seed_session(&mut state);
        let dir = tempfile::tempdir().expect("temp dir");

        let applied = state
            .set_directory(&dir.path().display().to_string())
            .await
            .expect("set directory");
        assert_eq!(applied, dir.path());
        assert_eq!(state.config.working_dir, dir.path());
        assert_eq!(state.session_id(), None);
        assert!(state.history().is_empty());
    }

    #[tokio::test]
    async fn invalid_directory_is_rejected_without_mutation() {
        let (mut state, _) = state();
        seed_session(&mut state);
        let before = state.config.working_dir.clone();

        let err = state
            .set_directory("/definitely/not/a/real/path")
            .await
            .expect_err("missing directory rejected");
        assert!(matches!(err, StateError::DirectoryNotFound(_)));
        assert_eq!(state.config.working_dir, before);
        assert_eq!(state.session_id(), Some("sess-1"));
        assert_eq!(state.history().len(), 2);
    }

    #[tokio::test]
    async fn file_path_is_rejected_as_directory_target() {
        let (mut state, _) = state();
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("file.txt");
        tokio::fs::write(&file, "x").await.expect("write file");

        let err = state
            .set_directory(&file.display().to_string())
            .await
            .expect_err("file rejected");
        assert!(matches!(err, StateError::NotADirectory(_)));
    }

    #[test]
    fn model_change_clears_session_and_history() {
        let (mut state, catalog) = state();
        seed_session(&mut state);

        let canonical = state.set_model("Opus", &catalog).expect("set model");
        assert_eq!(canonical, "claude-opus-4-1");
        assert_eq!(state.config.model, "claude-opus-4-1");
        assert_eq!(state.session_id(), None);
        assert!(state.history().is_empty());
    }

    #[test]
    fn unknown_model_is_rejected_without_mutation() {
        let (mut state, catalog) = state();
        seed_session(&mut state);
        let before = state.config.model.clone();

        let err = state
            .set_model("gpt-99", &catalog)
            .expect_err("unknown model rejected");
        assert_eq!(err, StateError::UnknownModel("gpt-99".to_string()));
        assert_eq!(state.config.model, before);
        assert_eq!(state.session_id(), Some("sess-1"));
        assert_eq!(state.history().len(), 2);
    }

    #[test]
    fn prompt_setters_invalidate_and_are_mutually_exclusive() {
        let (mut state, _) = state();
        seed_session(&mut state);

        state.set_system_prompt_append(Some("extra context".to_string()));
        assert_eq!(state.session_id(), None);
        assert_eq!(
            state.config.system_prompt_append.as_deref(),
            Some("extra context")
        );

        state.set_system_prompt(Some("be terse".to_string()));
        assert_eq!(state.config.system_prompt.as_deref(), Some("be terse"));
        assert_eq!(state.config.system_prompt_append, None);

        state.set_system_prompt_append(Some("appended".to_string()));
        assert_eq!(state.config.system_prompt, None);
        assert_eq!(state.config.system_prompt_append.as_deref(), Some("appended"));

        // Clearing one side leaves the other untouched.
        state.set_system_prompt(None);
        assert_eq!(state.config.system_prompt, None);
        assert_eq!(state.config.system_prompt_append.as_deref(), Some("appended"));
    }

    #[test]
    fn mode_change_clears_nothing() {
        let (mut state, _) = state();
        seed_session(&mut state);

        state.set_mode(PermissionMode::Plan);
        assert_eq!(state.config.permission_mode, PermissionMode::Plan);
        assert_eq!(state.session_id(), Some("sess-1"));
        assert_eq!(state.history().len(), 2);
    }

    #[test]
    fn fork_requires_an_active_session_and_is_one_shot() {
        let (mut state, _) = state();
        assert_eq!(state.enable_fork(), Err(StateError::NoActiveSession));
        assert!(!state.fork_pending());

        state.set_session_id(Some("sess-1".to_string()));
        state.enable_fork().expect("fork with session");
        assert!(state.fork_pending());

        assert!(state.take_fork_flag());
        assert!(!state.fork_pending());
        assert!(!state.take_fork_flag());
    }

    #[test]
    fn clearing_the_session_id_clears_history_with_it() {
        let (mut state, _) = state();
        seed_session(&mut state);

        state.set_session_id(None);
        assert_eq!(state.session_id(), None);
        assert!(state.history().is_empty());
    }

    #[test]
    fn direct_session_set_leaves_history_alone() {
        let (mut state, _) = state();
        seed_session(&mut state);

        state.set_session_id(Some("sess-2".to_string()));
        assert_eq!(state.session_id(), Some("sess-2"));
        assert_eq!(state.history().len(), 2);
    }

    #[test]
    fn empty_agent_name_is_rejected() {
        let (mut state, _) = state();
        assert_eq!(state.set_agent_name("   "), Err(StateError::EmptyAgentName));
        state.set_agent_name(" Pairbot ").expect("set agent name");
        assert_eq!(state.config.agent_name, "Pairbot");
    }
}
