//! Conversation orchestrator: every transport inbound message flows through
//! here exactly once.
//!
//! One worker task per conversation key keeps conversations isolated and
//! their messages strictly ordered. Permission replies are correlated in the
//! dispatch loop, before worker queueing, so a reply still lands while the
//! worker is suspended inside a query.

use crate::addressing;
use crate::commands;
use crate::config::{ChatwireConfig, RuntimeConfig};
use crate::config_store::ConfigStore;
use crate::permissions::{PermissionArbiter, describe_tool_use};
use crate::policy::{self, PolicyDecision};
use crate::session::ConversationState;
use anyhow::Result;
use cw_backend::{
    AssistantBackend, ConversationTurn, QueryHooks, QueryOptions, QueryRequest,
    ToolPermissionRequest,
};
use cw_transport::{ConversationKey, InboundMessage, OutboundMessage, Transport, TransportEvent};
use dashmap::DashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const CONVERSATION_QUEUE_DEPTH: usize = 32;
const OUTBOUND_QUEUE_DEPTH: usize = 64;

#[derive(Debug)]
enum Outbound {
    Text {
        to: ConversationKey,
        message: OutboundMessage,
    },
    Typing {
        to: ConversationKey,
    },
}

#[derive(Clone)]
struct ConversationHandle {
    inbound_tx: mpsc::Sender<InboundMessage>,
    arbiter: PermissionArbiter,
    /// Mirror of the worker-owned agent name, read by the dispatch loop for
    /// group targeting.
    agent_name: Arc<StdMutex<String>>,
}

pub struct Bridge {
    store: ConfigStore,
    defaults: RuntimeConfig,
    transport: Arc<dyn Transport>,
    backend: Arc<dyn AssistantBackend>,
    conversations: DashMap<ConversationKey, ConversationHandle>,
    outbound_tx: mpsc::Sender<Outbound>,
    started_at: Instant,
}

impl Bridge {
    pub fn new(
        store: ConfigStore,
        defaults: RuntimeConfig,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn AssistantBackend>,
    ) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let bridge = Arc::new(Self {
            store,
            defaults,
            transport,
            backend,
            conversations: DashMap::new(),
            outbound_tx,
            started_at: Instant::now(),
        });
        bridge.spawn_outbound_pump(outbound_rx);
        bridge
    }

    fn spawn_outbound_pump(&self, mut outbound_rx: mpsc::Receiver<Outbound>) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                match item {
                    Outbound::Text { to, message } => {
                        if let Err(e) = transport.send_text(&to, message).await {
                            tracing::warn!(%e, destination = %to, "outbound send failed");
                        }
                    }
                    Outbound::Typing { to } => {
                        if let Err(e) = transport.send_typing(&to).await {
                            tracing::debug!(%e, destination = %to, "typing update failed");
                        }
                    }
                }
            }
        });
    }

    /// Start the transport and run the inbound loop until the transport
    /// closes its channel or a shutdown signal arrives.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        self.transport.start(inbound_tx, event_tx).await?;

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    TransportEvent::Ready => tracing::info!("transport ready"),
                    TransportEvent::Disconnected { reason } => {
                        tracing::warn!(%reason, "transport disconnected");
                    }
                }
            }
        });

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                maybe = inbound_rx.recv() => {
                    let Some(inbound) = maybe else {
                        tracing::info!("inbound channel closed; stopping");
                        self.shutdown();
                        return Ok(());
                    };
                    self.handle_inbound(inbound).await;
                }
                _ = &mut ctrl_c => {
                    tracing::info!("shutdown requested");
                    self.shutdown();
                    return Ok(());
                }
            }
        }
    }

    /// Deny every outstanding permission request so no future is left
    /// unresolved past shutdown.
    pub fn shutdown(&self) {
        for entry in self.conversations.iter() {
            entry.value().arbiter.cancel_all();
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(sender_id = %inbound.sender_id))]
    async fn handle_inbound(&self, inbound: InboundMessage) {
        let cfg = self.store.snapshot().await;
        if !cfg.security.is_sender_allowed(inbound.sender_id.as_str()) {
            tracing::debug!("sender not in whitelist; ignoring");
            return;
        }

        let key = inbound.conversation_key();
        let handle = self.conversation_handle(&key, &cfg);

        let agent_name = handle
            .agent_name
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let text = if inbound.is_group {
            match addressing::strip_targeting(&inbound.text, &agent_name) {
                Some(text) => text,
                None => {
                    tracing::debug!(conversation = %key, "untargeted group message ignored");
                    return;
                }
            }
        } else {
            // Targeting is optional in direct chats but stripped when used.
            addressing::strip_targeting(&inbound.text, &agent_name)
                .unwrap_or_else(|| inbound.text.clone())
        };
        if text.trim().is_empty() {
            return;
        }

        // Pending permission requests get first claim on the message, even
        // while the worker is suspended inside a query.
        if handle.arbiter.pending_count() > 0 {
            if let Some(allowed) = handle.arbiter.try_resolve_from_message(&text) {
                tracing::info!(conversation = %key, allowed, "permission reply consumed");
                return;
            }
        }

        let mut routed = inbound;
        routed.text = text;
        match handle.inbound_tx.try_send(routed) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conversation = %key, "conversation queue full; rejecting message");
                let _ = self
                    .outbound_tx
                    .send(Outbound::Text {
                        to: key,
                        message: OutboundMessage::text(
                            "Still working through earlier messages; this one was dropped. \
                             Please resend in a moment.",
                        ),
                    })
                    .await;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(conversation = %key, "conversation worker is gone");
                self.conversations.remove(&key);
            }
        }
    }

    fn conversation_handle(&self, key: &ConversationKey, cfg: &ChatwireConfig) -> ConversationHandle {
        self.conversations
            .entry(key.clone())
            .or_insert_with(|| self.spawn_worker(key.clone(), cfg))
            .clone()
    }

    fn spawn_worker(&self, key: ConversationKey, cfg: &ChatwireConfig) -> ConversationHandle {
        let (inbound_tx, inbound_rx) = mpsc::channel(CONVERSATION_QUEUE_DEPTH);
        let (prompt_tx, mut prompt_rx) = mpsc::channel(8);
        let timeout = Duration::from_secs(cfg.security.permission_timeout_seconds);
        let arbiter = PermissionArbiter::new(prompt_tx, timeout);

        let runtime = RuntimeConfig::from_config(cfg).unwrap_or_else(|e| {
            tracing::error!(%e, "config defaults no longer resolve; using startup defaults");
            self.defaults.clone()
        });
        let agent_name = Arc::new(StdMutex::new(runtime.agent_name.clone()));

        // Permission prompts travel to the human like any other reply.
        let outbound_tx = self.outbound_tx.clone();
        let prompt_key = key.clone();
        tokio::spawn(async move {
            while let Some(prompt) = prompt_rx.recv().await {
                let item = Outbound::Text {
                    to: prompt_key.clone(),
                    message: OutboundMessage::text(prompt.render()),
                };
                if outbound_tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        tracing::info!(conversation = %key, "starting conversation worker");
        let worker = ConversationWorker {
            key,
            store: self.store.clone(),
            backend: self.backend.clone(),
            outbound_tx: self.outbound_tx.clone(),
            arbiter: arbiter.clone(),
            agent_name: agent_name.clone(),
            typing: self.transport.supports_typing(),
            started_at: self.started_at,
        };
        let state = ConversationState::new(runtime);
        tokio::spawn(worker.run(state, inbound_rx));

        ConversationHandle {
            inbound_tx,
            arbiter,
            agent_name,
        }
    }
}

struct ConversationWorker {
    key: ConversationKey,
    store: ConfigStore,
    backend: Arc<dyn AssistantBackend>,
    outbound_tx: mpsc::Sender<Outbound>,
    arbiter: PermissionArbiter,
    agent_name: Arc<StdMutex<String>>,
    typing: bool,
    started_at: Instant,
}

impl ConversationWorker {
    async fn run(self, mut state: ConversationState, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
        while let Some(inbound) = inbound_rx.recv().await {
            self.handle_message(&mut state, &inbound.text).await;
        }
        tracing::debug!(conversation = %self.key, "conversation worker stopped");
    }

    async fn handle_message(&self, state: &mut ConversationState, text: &str) {
        if let Some(parsed) = commands::parse(text) {
            tracing::info!(conversation = %self.key, command = %parsed.name, "command dispatched");
            let reply = commands::handle_command(
                state,
                &self.store,
                &self.arbiter,
                self.started_at.elapsed(),
                parsed,
            )
            .await;
            // Publish a rename before the reply so the dispatch loop targets
            // the new name for any message that arrives after it.
            self.sync_agent_name(state);
            self.send(reply).await;
            return;
        }
        self.run_query(state, text).await;
    }

    fn sync_agent_name(&self, state: &ConversationState) {
        let mut shared = self
            .agent_name
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *shared != state.config.agent_name {
            shared.clone_from(&state.config.agent_name);
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(conversation = %self.key))]
    async fn run_query(&self, state: &mut ConversationState, prompt: &str) {
        if self.typing {
            let _ = self
                .outbound_tx
                .send(Outbound::Typing {
                    to: self.key.clone(),
                })
                .await;
        }

        let history = state.history().snapshot_for_prompt();
        state.history_mut().append(ConversationTurn::user(prompt));

        // One-shot: consumed now, regardless of how the query ends.
        let fork_session = state.take_fork_flag();
        let options = QueryOptions {
            working_dir: state.config.working_dir.clone(),
            model: state.config.model.clone(),
            permission_mode: state.config.permission_mode,
            system_prompt: state.config.system_prompt.clone(),
            system_prompt_append: state.config.system_prompt_append.clone(),
            claude_md_sources: state.config.claude_md_sources.clone(),
            resume_session: state.session_id().map(str::to_string),
            fork_session,
        };
        let mode = options.permission_mode;
        let request = QueryRequest {
            prompt: prompt.to_string(),
            history,
            options,
        };
        tracing::info!(
            mode = %mode,
            model = %request.options.model,
            resumed = request.options.resume_session.is_some(),
            fork = fork_session,
            history_turns = request.history.len(),
            "assistant query started"
        );

        let started = Instant::now();
        let (hooks, mut receivers) = QueryHooks::channel();
        let query = self.backend.query(request, hooks);
        tokio::pin!(query);

        let outcome = loop {
            tokio::select! {
                result = &mut query => break result,
                Some(probe) = receivers.permission_rx.recv() => {
                    self.gate_tool_use(mode, probe);
                }
                Some(notice) = receivers.session_rx.recv() => {
                    tracing::info!(session_id = %notice.session_id, "session created");
                    state.set_session_id(Some(notice.session_id));
                }
            }
        };
        while let Ok(notice) = receivers.session_rx.try_recv() {
            state.set_session_id(Some(notice.session_id));
        }
        // A finished query has no open decisions; drop anything the backend
        // abandoned.
        self.arbiter.cancel_all();

        match outcome {
            Ok(outcome) => {
                if let Some(session_id) = outcome.session_id.clone() {
                    state.set_session_id(Some(session_id));
                }
                state
                    .history_mut()
                    .append(ConversationTurn::assistant(outcome.text.clone()));
                tracing::info!(
                    latency_ms = started.elapsed().as_millis() as u64,
                    tools_used = outcome.tools_used.len(),
                    response_len = outcome.text.len(),
                    "assistant query completed"
                );
                self.send(outcome.text).await;
            }
            Err(e) if e.is_resume_mismatch() => {
                tracing::warn!(%e, "session could not be resumed; clearing it");
                state.set_session_id(None);
                self.send(
                    "Your session could not be resumed from this working directory. \
                     It has been cleared - please resend your message.",
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(%e, "assistant query failed");
                // Failed exchanges never become prompt context.
                let _ = state.history_mut().pop_last();
                self.send(format!("Error: {e}")).await;
            }
        }
    }

    fn gate_tool_use(&self, mode: cw_backend::PermissionMode, probe: ToolPermissionRequest) {
        match policy::decide(mode, &probe.tool_name) {
            PolicyDecision::Allow => {
                tracing::debug!(tool_name = %probe.tool_name, %mode, "tool use allowed by mode");
                let _ = probe.response_tx.send(true);
            }
            PolicyDecision::Deny => {
                tracing::info!(tool_name = %probe.tool_name, %mode, "tool use denied by mode");
                let _ = probe.response_tx.send(false);
            }
            PolicyDecision::Ask => {
                // Run the ask in its own task so further tool probes (and the
                // query itself) keep making progress while the human decides.
                let arbiter = self.arbiter.clone();
                tokio::spawn(async move {
                    let description = describe_tool_use(&probe.tool_name, &probe.input);
                    let allowed = arbiter
                        .request(&probe.tool_name, &description, &probe.input)
                        .await;
                    let _ = probe.response_tx.send(allowed);
                });
            }
        }
    }

    async fn send(&self, text: impl Into<String>) {
        let item = Outbound::Text {
            to: self.key.clone(),
            message: OutboundMessage::text(text),
        };
        if self.outbound_tx.send(item).await.is_err() {
            tracing::error!(conversation = %self.key, "outbound channel closed");
        }
    }
}
