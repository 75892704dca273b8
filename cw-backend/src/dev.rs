//! Scripted dev backend for local runs and tests.

use crate::error::{BackendError, Result};
use crate::traits::AssistantBackend;
use crate::types::{QueryHooks, QueryOutcome, QueryRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug)]
pub struct DevToolUse {
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// One scripted query outcome. Tool uses are probed through the permission
/// hook in order before the reply is returned.
#[derive(Debug)]
pub struct DevScript {
    pub reply: std::result::Result<String, BackendError>,
    pub tool_uses: Vec<DevToolUse>,
    pub mint_session: Option<String>,
}

impl DevScript {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            tool_uses: Vec::new(),
            mint_session: None,
        }
    }

    pub fn failure(error: BackendError) -> Self {
        Self {
            reply: Err(error),
            tool_uses: Vec::new(),
            mint_session: None,
        }
    }

    pub fn with_tool_use(mut self, tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        self.tool_uses.push(DevToolUse {
            tool_name: tool_name.into(),
            input,
        });
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.mint_session = Some(session_id.into());
        self
    }
}

/// In-process backend that replays scripted outcomes and records every
/// request it sees. With no script queued it echoes the prompt and mints a
/// session id for new conversations, which keeps `chatwire serve` usable
/// without a real backend wired in.
#[derive(Default)]
pub struct DevBackend {
    scripts: Mutex<VecDeque<DevScript>>,
    recorded: Mutex<Vec<QueryRequest>>,
    permission_log: Mutex<Vec<(String, bool)>>,
}

impl DevBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&self, script: DevScript) {
        self.scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(script);
    }

    /// Requests seen so far, oldest first.
    pub fn recorded(&self) -> Vec<QueryRequest> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Permission probe outcomes, in probe order.
    pub fn permission_log(&self) -> Vec<(String, bool)> {
        self.permission_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn pop_script(&self) -> Option<DevScript> {
        self.scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

#[async_trait]
impl AssistantBackend for DevBackend {
    fn backend_id(&self) -> &str {
        "dev"
    }

    async fn query(&self, request: QueryRequest, hooks: QueryHooks) -> Result<QueryOutcome> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let Some(script) = self.pop_script() else {
            let session_id = match &request.options.resume_session {
                Some(existing) => existing.clone(),
                None => {
                    let minted = format!("dev-{}", Uuid::new_v4());
                    hooks.notify_session_created(minted.clone()).await;
                    minted
                }
            };
            return Ok(QueryOutcome {
                text: format!("(dev) {}", request.prompt),
                session_id: Some(session_id),
                tools_used: Vec::new(),
            });
        };

        let mut tools_used = Vec::new();
        for tool_use in script.tool_uses {
            let allowed = hooks
                .request_permission(&tool_use.tool_name, tool_use.input)
                .await;
            self.permission_log
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push((tool_use.tool_name.clone(), allowed));
            if allowed {
                tools_used.push(tool_use.tool_name);
            }
        }

        if let Some(session_id) = &script.mint_session {
            hooks.notify_session_created(session_id.clone()).await;
        }

        let text = script.reply?;
        Ok(QueryOutcome {
            text,
            session_id: script.mint_session,
            tools_used,
        })
    }
}
