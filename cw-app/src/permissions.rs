//! Tool-permission arbitration.
//!
//! Every "may I use tool X" probe becomes a pending request that races three
//! resolution paths: an explicit decision by request id, a free-text reply
//! from the human, and a deadline that auto-denies. Whichever path removes
//! the request from the registry first wins; the others become no-ops.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Notification sent towards the transport when a request needs a human
/// decision.
#[derive(Debug, Clone)]
pub struct PermissionPrompt {
    pub id: String,
    pub tool_name: String,
    pub description: String,
}

impl PermissionPrompt {
    /// Text shown to the human operator.
    pub fn render(&self) -> String {
        format!(
            "Permission needed for {}:\n{}\nReply Y/yes/allow or N/no/deny. Request id: {}",
            self.tool_name, self.description, self.id
        )
    }
}

/// Compact one-line rendering of a tool invocation for the prompt text.
pub fn describe_tool_use(tool_name: &str, input: &Value) -> String {
    let rendered = input.to_string();
    let mut compact: String = rendered.chars().take(280).collect();
    if compact.len() < rendered.len() {
        compact.push_str("...");
    }
    format!("{tool_name} {compact}")
}

#[derive(Debug)]
struct PendingRequest {
    id: String,
    tool_name: String,
    input: Value,
    decide_tx: oneshot::Sender<bool>,
}

/// Registry of outstanding permission requests for one conversation.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct PermissionArbiter {
    pending: Arc<Mutex<Vec<PendingRequest>>>,
    prompt_tx: mpsc::Sender<PermissionPrompt>,
    timeout: Duration,
}

impl PermissionArbiter {
    pub fn new(prompt_tx: mpsc::Sender<PermissionPrompt>, timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
            prompt_tx,
            timeout,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Register a request, notify the human, and wait for a decision.
    ///
    /// Never fails: an unanswered request resolves to deny when the timeout
    /// elapses.
    pub async fn request(&self, tool_name: &str, description: &str, input: &Value) -> bool {
        let id = request_id();
        let (decide_tx, mut decide_rx) = oneshot::channel();
        self.lock().push(PendingRequest {
            id: id.clone(),
            tool_name: tool_name.to_string(),
            input: input.clone(),
            decide_tx,
        });
        tracing::info!(request_id = %id, tool_name, "permission request registered");

        let prompt = PermissionPrompt {
            id: id.clone(),
            tool_name: tool_name.to_string(),
            description: description.to_string(),
        };
        if self.prompt_tx.send(prompt).await.is_err() {
            // Nobody can answer; the timeout below turns this into a deny.
            tracing::warn!(request_id = %id, "permission prompt channel closed");
        }

        tokio::select! {
            decision = &mut decide_rx => decision.unwrap_or(false),
            _ = tokio::time::sleep(self.timeout) => {
                match self.take(&id) {
                    Some(expired) => {
                        tracing::warn!(
                            request_id = %id,
                            tool_name = %expired.tool_name,
                            input = %expired.input,
                            timeout_seconds = self.timeout.as_secs(),
                            "permission request timed out; denying"
                        );
                        false
                    }
                    // A resolver removed the entry just as the deadline hit;
                    // its decision is already in flight.
                    None => decide_rx.await.unwrap_or(false),
                }
            }
        }
    }

    /// Resolve a specific request by id. Returns false when the id is
    /// unknown or the request was already resolved.
    pub fn resolve(&self, id: &str, allowed: bool) -> bool {
        match self.take(id) {
            Some(request) => {
                tracing::info!(
                    request_id = %id,
                    tool_name = %request.tool_name,
                    allowed,
                    "permission request resolved by id"
                );
                let _ = request.decide_tx.send(allowed);
                true
            }
            None => {
                tracing::debug!(request_id = %id, "resolution for unknown or settled request ignored");
                false
            }
        }
    }

    /// Interpret a free-text reply as a permission decision.
    ///
    /// Returns `None` when the text is not a recognized decision word (the
    /// caller falls through to command/conversation routing) or when nothing
    /// is pending. On a match the most recently created pending request is
    /// resolved - newest wins, by policy.
    pub fn try_resolve_from_message(&self, text: &str) -> Option<bool> {
        let allowed = match text.trim().to_uppercase().as_str() {
            "Y" | "YES" | "ALLOW" => true,
            "N" | "NO" | "DENY" => false,
            _ => return None,
        };
        let newest = self.lock().pop()?;
        tracing::info!(
            request_id = %newest.id,
            tool_name = %newest.tool_name,
            allowed,
            "permission request resolved from reply"
        );
        let _ = newest.decide_tx.send(allowed);
        Some(allowed)
    }

    /// Deny and drain every pending request. Used on shutdown and after each
    /// query completes so no future is left unresolved.
    pub fn cancel_all(&self) {
        let drained: Vec<PendingRequest> = std::mem::take(&mut *self.lock());
        if drained.is_empty() {
            return;
        }
        tracing::info!(count = drained.len(), "cancelling pending permission requests");
        for request in drained {
            let _ = request.decide_tx.send(false);
        }
    }

    fn take(&self, id: &str) -> Option<PendingRequest> {
        let mut pending = self.lock();
        let index = pending.iter().position(|request| request.id == id)?;
        Some(pending.remove(index))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingRequest>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn request_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), &suffix[..8])
}
