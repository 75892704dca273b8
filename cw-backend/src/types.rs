use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One turn of a conversation, in the order it happened. The ordered turn
/// sequence is the prompt context for the next query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Permission posture passed with every query and consulted for each tool
/// callback. Orthogonal to conversational context: switching modes never
/// invalidates a resumable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
    DontAsk,
}

impl PermissionMode {
    pub const ALL: [PermissionMode; 5] = [
        PermissionMode::Default,
        PermissionMode::AcceptEdits,
        PermissionMode::BypassPermissions,
        PermissionMode::Plan,
        PermissionMode::DontAsk,
    ];

    /// Case-insensitive parse with the command-surface aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "acceptedits" | "accept-edits" => Some(Self::AcceptEdits),
            "bypasspermissions" | "bypass" | "yolo" => Some(Self::BypassPermissions),
            "plan" | "readonly" => Some(Self::Plan),
            "dontask" | "noask" => Some(Self::DontAsk),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
            Self::Plan => "plan",
            Self::DontAsk => "dontAsk",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project-instruction sources the backend may load. An empty set disables
/// them entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaudeMdSource {
    User,
    Project,
    Local,
}

impl ClaudeMdSource {
    pub const ALL: [ClaudeMdSource; 3] = [
        ClaudeMdSource::User,
        ClaudeMdSource::Project,
        ClaudeMdSource::Local,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "project" => Some(Self::Project),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for ClaudeMdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-query configuration snapshot. `resume_session` carries the opaque,
/// directory-scoped handle minted by the backend; `fork_session` is the
/// consumed one-shot fork flag.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub working_dir: PathBuf,
    pub model: String,
    pub permission_mode: PermissionMode,
    pub system_prompt: Option<String>,
    pub system_prompt_append: Option<String>,
    pub claude_md_sources: Vec<ClaudeMdSource>,
    pub resume_session: Option<String>,
    pub fork_session: bool,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub prompt: String,
    /// Prior turns only; `prompt` is not included.
    pub history: Vec<ConversationTurn>,
    pub options: QueryOptions,
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub text: String,
    /// Session handle minted during this query, if any. Also delivered live
    /// via [`QueryHooks::notify_session_created`].
    pub session_id: Option<String>,
    pub tools_used: Vec<String>,
}

/// A single "may I use tool X" probe. The backend blocks on `response_tx`
/// until the bridge answers; a dropped sender reads as deny.
#[derive(Debug)]
pub struct ToolPermissionRequest {
    pub tool_name: String,
    pub input: serde_json::Value,
    pub response_tx: oneshot::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct SessionCreated {
    pub session_id: String,
}

/// Channel ends handed to the backend for the duration of one query.
#[derive(Debug, Clone)]
pub struct QueryHooks {
    permission_tx: mpsc::Sender<ToolPermissionRequest>,
    session_tx: mpsc::Sender<SessionCreated>,
}

/// Receiving ends retained by the caller of [`AssistantBackend::query`].
///
/// [`AssistantBackend::query`]: crate::AssistantBackend::query
#[derive(Debug)]
pub struct QueryHookReceivers {
    pub permission_rx: mpsc::Receiver<ToolPermissionRequest>,
    pub session_rx: mpsc::Receiver<SessionCreated>,
}

impl QueryHooks {
    pub fn channel() -> (Self, QueryHookReceivers) {
        let (permission_tx, permission_rx) = mpsc::channel(8);
        let (session_tx, session_rx) = mpsc::channel(4);
        (
            Self {
                permission_tx,
                session_tx,
            },
            QueryHookReceivers {
                permission_rx,
                session_rx,
            },
        )
    }

    /// Ask the bridge whether a tool may run, suspending until a decision
    /// arrives. Returns `false` if the bridge is gone.
    pub async fn request_permission(&self, tool_name: &str, input: serde_json::Value) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        let request = ToolPermissionRequest {
            tool_name: tool_name.to_string(),
            input,
            response_tx,
        };
        if self.permission_tx.send(request).await.is_err() {
            tracing::warn!(tool_name, "permission channel closed; denying tool use");
            return false;
        }
        response_rx.await.unwrap_or(false)
    }

    /// Report a freshly minted session handle. Sent at most once per query.
    pub async fn notify_session_created(&self, session_id: impl Into<String>) {
        let notice = SessionCreated {
            session_id: session_id.into(),
        };
        if self.session_tx.send(notice).await.is_err() {
            tracing::debug!("session channel closed; dropping session-created notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_mode_parses_aliases_case_insensitively() {
        assert_eq!(
            PermissionMode::parse("BypassPermissions"),
            Some(PermissionMode::BypassPermissions)
        );
        assert_eq!(
            PermissionMode::parse("YOLO"),
            Some(PermissionMode::BypassPermissions)
        );
        assert_eq!(PermissionMode::parse("readonly"), Some(PermissionMode::Plan));
        assert_eq!(
            PermissionMode::parse("accept-edits"),
            Some(PermissionMode::AcceptEdits)
        );
        assert_eq!(PermissionMode::parse("ask-me-maybe"), None);
    }

    #[test]
    fn permission_mode_round_trips_through_display() {
        for mode in PermissionMode::ALL {
            assert_eq!(PermissionMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn claude_md_source_parses_known_names_only() {
        assert_eq!(ClaudeMdSource::parse("Project"), Some(ClaudeMdSource::Project));
        assert_eq!(ClaudeMdSource::parse("global"), None);
    }

    #[tokio::test]
    async fn request_permission_denies_when_bridge_is_gone() {
        let (hooks, receivers) = QueryHooks::channel();
        drop(receivers);
        let allowed = hooks
            .request_permission("Bash", serde_json::json!({"command": "ls"}))
            .await;
        assert!(!allowed);
    }

    #[tokio::test]
    async fn request_permission_relays_decision() {
        let (hooks, mut receivers) = QueryHooks::channel();
        let probe = tokio::spawn(async move {
            hooks
                .request_permission("Edit", serde_json::json!({"file_path": "a.rs"}))
                .await
        });
        let request = receivers
            .permission_rx
            .recv()
            .await
            .expect("permission request");
        assert_eq!(request.tool_name, "Edit");
        request.response_tx.send(true).expect("deliver decision");
        assert!(probe.await.expect("probe task"));
    }
}
