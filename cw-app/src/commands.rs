//! Chat command parser and handlers.
//!
//! A message is a command iff its first non-whitespace character is `/`.
//! Handlers reply with plain text and never fail for expected bad input -
//! an invalid argument gets a formatted rejection, not an error.

use crate::config_store::ConfigStore;
use crate::config::RuntimeConfig;
use crate::permissions::PermissionArbiter;
use crate::session::ConversationState;
use cw_backend::{ClaudeMdSource, PermissionMode};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased command name; may be empty for a bare "/".
    pub name: String,
    /// Raw trailing text with the surrounding whitespace trimmed; internal
    /// casing and whitespace are preserved.
    pub args: String,
}

pub fn parse(text: &str) -> Option<ParsedCommand> {
    let rest = text.trim_start().strip_prefix('/')?;
    let name_end = rest
        .find(char::is_whitespace)
        .unwrap_or(rest.len());
    Some(ParsedCommand {
        name: rest[..name_end].to_ascii_lowercase(),
        args: rest[name_end..].trim().to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Clear,
    Status,
    Help,
    Mode,
    SetMode(PermissionMode),
    Session,
    Fork,
    Cd,
    Model,
    Models,
    Name,
    Prompt,
    PromptAppend,
    ClaudeMd,
    Config,
}

fn canonical(name: &str) -> Option<CommandKind> {
    match name {
        "clear" | "new" => Some(CommandKind::Clear),
        "status" => Some(CommandKind::Status),
        "help" => Some(CommandKind::Help),
        "mode" => Some(CommandKind::Mode),
        "plan" | "readonly" => Some(CommandKind::SetMode(PermissionMode::Plan)),
        "default" => Some(CommandKind::SetMode(PermissionMode::Default)),
        "acceptedits" | "accept-edits" => Some(CommandKind::SetMode(PermissionMode::AcceptEdits)),
        "bypass" | "yolo" | "bypasspermissions" => {
            Some(CommandKind::SetMode(PermissionMode::BypassPermissions))
        }
        "dontask" | "noask" => Some(CommandKind::SetMode(PermissionMode::DontAsk)),
        "session" => Some(CommandKind::Session),
        "fork" => Some(CommandKind::Fork),
        "cd" => Some(CommandKind::Cd),
        "model" => Some(CommandKind::Model),
        "models" => Some(CommandKind::Models),
        "name" => Some(CommandKind::Name),
        "prompt" => Some(CommandKind::Prompt),
        "promptappend" => Some(CommandKind::PromptAppend),
        "claudemd" => Some(CommandKind::ClaudeMd),
        "config" => Some(CommandKind::Config),
        _ => None,
    }
}

const HELP_TEXT: &str = "Commands:\n\
/clear - reset conversation and session\n\
/status - show current configuration and session\n\
/mode [name] - show or set the permission mode\n\
/plan /default /acceptedits /bypass /dontask - mode shortcuts\n\
/session [id|clear] - show, resume, or clear the session\n\
/fork - branch the next message into a new session\n\
/cd [path] - show or change the working directory\n\
/model [name] - show or change the model\n\
/models - list known models\n\
/name [name] - show or change the agent name\n\
/prompt [text|clear] - replace the system prompt\n\
/promptappend [text|clear] - append to the default system prompt\n\
/claudemd [sources|clear] - project instruction sources\n\
/config [show|path|save|generate|reload] - config file operations\n\
/help - this message";

pub async fn handle_command(
    state: &mut ConversationState,
    store: &ConfigStore,
    arbiter: &PermissionArbiter,
    uptime: Duration,
    parsed: ParsedCommand,
) -> String {
    let Some(kind) = canonical(&parsed.name) else {
        return format!(
            "Unknown command /{}. Send /help for available commands.",
            parsed.name
        );
    };
    let args = parsed.args.as_str();

    match kind {
        CommandKind::Clear => {
            state.reset_conversation();
            "Conversation cleared. The next message starts a fresh session.".to_string()
        }
        CommandKind::Status => format!(
            "agent={}\nmode={}\nmodel={}\nworking_dir={}\nsession={}\nfork_queued={}\npending_permissions={}\nhistory_turns={}\nuptime_seconds={}",
            state.config.agent_name,
            state.config.permission_mode,
            state.config.model,
            state.config.working_dir.display(),
            state.session_id().unwrap_or("none"),
            state.fork_pending(),
            arbiter.pending_count(),
            state.history().len(),
            uptime.as_secs(),
        ),
        CommandKind::Help => HELP_TEXT.to_string(),
        CommandKind::Mode => {
            if args.is_empty() {
                return format!(
                    "mode={}\navailable: {}",
                    state.config.permission_mode,
                    mode_list()
                );
            }
            match PermissionMode::parse(args) {
                Some(mode) => {
                    state.set_mode(mode);
                    format!("Permission mode set to {mode}.")
                }
                None => format!("Unknown mode {args:?}. Available: {}", mode_list()),
            }
        }
        CommandKind::SetMode(mode) => {
            state.set_mode(mode);
            format!("Permission mode set to {mode}.")
        }
        CommandKind::Session => {
            if args.is_empty() {
                return match state.session_id() {
                    Some(id) => format!("session={id}"),
                    None => "session=none (the next message starts a new one)".to_string(),
                };
            }
            if args.eq_ignore_ascii_case("clear") {
                state.set_session_id(None);
                return "Session cleared (history reset with it).".to_string();
            }
            state.set_session_id(Some(args.to_string()));
            format!("Resuming session {args} on the next message.")
        }
        CommandKind::Fork => match state.enable_fork() {
            Ok(()) => "The next message forks the current session.".to_string(),
            Err(e) => format!("Cannot fork: {e}."),
        },
        CommandKind::Cd => {
            if args.is_empty() {
                return format!("working_dir={}", state.config.working_dir.display());
            }
            match state.set_directory(args).await {
                Ok(path) => format!(
                    "Working directory changed to {} (session and history reset).",
                    path.display()
                ),
                Err(e) => format!("Cannot change directory: {e}."),
            }
        }
        CommandKind::Model => {
            let catalog = store.snapshot().await.model_catalog();
            if args.is_empty() {
                return format!(
                    "model={}\navailable: {}",
                    state.config.model,
                    catalog
                        .entries()
                        .map(|(alias, _)| alias)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            match state.set_model(args, &catalog) {
                Ok(canonical) => format!("Model set to {canonical} (session and history reset)."),
                Err(e) => format!("Cannot change model: {e}."),
            }
        }
        CommandKind::Models => {
            let catalog = store.snapshot().await.model_catalog();
            let mut lines: Vec<String> = catalog
                .entries()
                .map(|(alias, canonical)| format!("{alias} -> {canonical}"))
                .collect();
            lines.sort();
            lines.join("\n")
        }
        CommandKind::Name => {
            if args.is_empty() {
                return format!("agent_name={}", state.config.agent_name);
            }
            match state.set_agent_name(args) {
                Ok(()) => format!("Agent name set to {}.", state.config.agent_name),
                Err(e) => format!("Cannot rename: {e}."),
            }
        }
        CommandKind::Prompt => {
            if args.is_empty() {
                return match &state.config.system_prompt {
                    Some(prompt) => format!("system_prompt={prompt}"),
                    None => "system_prompt is not set".to_string(),
                };
            }
            if args.eq_ignore_ascii_case("clear") {
                state.set_system_prompt(None);
                return "System prompt cleared (session and history reset).".to_string();
            }
            state.set_system_prompt(Some(args.to_string()));
            "System prompt set (session and history reset).".to_string()
        }
        CommandKind::PromptAppend => {
            if args.is_empty() {
                return match &state.config.system_prompt_append {
                    Some(prompt) => format!("system_prompt_append={prompt}"),
                    None => "system_prompt_append is not set".to_string(),
                };
            }
            if args.eq_ignore_ascii_case("clear") {
                state.set_system_prompt_append(None);
                return "System prompt append cleared (session and history reset).".to_string();
            }
            state.set_system_prompt_append(Some(args.to_string()));
            "System prompt append set (session and history reset).".to_string()
        }
        CommandKind::ClaudeMd => {
            if args.is_empty() {
                let current = &state.config.claude_md_sources;
                return if current.is_empty() {
                    "claude_md_sources=disabled".to_string()
                } else {
                    format!(
                        "claude_md_sources={}",
                        current
                            .iter()
                            .map(ClaudeMdSource::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                };
            }
            if args.eq_ignore_ascii_case("clear") || args.eq_ignore_ascii_case("off") {
                state.set_claude_md_sources(Vec::new());
                return "Project instruction sources disabled.".to_string();
            }
            let mut sources = Vec::new();
            for token in args.split(|c: char| c.is_whitespace() || c == ',') {
                if token.is_empty() {
                    continue;
                }
                match ClaudeMdSource::parse(token) {
                    Some(source) => {
                        if !sources.contains(&source) {
                            sources.push(source);
                        }
                    }
                    None => {
                        return format!(
                            "Unknown source {token:?}. Available: user, project, local, clear."
                        );
                    }
                }
            }
            let rendered = sources
                .iter()
                .map(ClaudeMdSource::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            state.set_claude_md_sources(sources);
            format!("Project instruction sources set to: {rendered}.")
        }
        CommandKind::Config => {
            let sub = args
                .split_whitespace()
                .next()
                .unwrap_or("show")
                .to_ascii_lowercase();
            match sub.as_str() {
                "show" => match store.render().await {
                    Ok(rendered) => rendered,
                    Err(e) => format!("Cannot render config: {e}."),
                },
                "path" => store.path().display().to_string(),
                "save" => match store.save_runtime(&state.config).await {
                    Ok(()) => format!("Configuration saved to {}.", store.path().display()),
                    Err(e) => format!("Cannot save config: {e}."),
                },
                "generate" => match store.generate_default().await {
                    Ok(true) => format!("Default config written to {}.", store.path().display()),
                    Ok(false) => format!(
                        "Config already exists at {}; left unchanged.",
                        store.path().display()
                    ),
                    Err(e) => format!("Cannot generate config: {e}."),
                },
                "reload" => {
                    let reloaded = match store.reload().await {
                        Ok(cfg) => cfg,
                        Err(e) => return format!("Cannot reload config: {e}."),
                    };
                    match RuntimeConfig::from_config(&reloaded) {
                        Ok(runtime) => {
                            state.replace_config(runtime);
                            "Configuration reloaded (session and history reset).".to_string()
                        }
                        Err(e) => format!("Cannot apply reloaded config: {e}."),
                    }
                }
                other => format!(
                    "Unknown config action {other:?}. Usage: /config [show|path|save|generate|reload]"
                ),
            }
        }
    }
}

fn mode_list() -> String {
    PermissionMode::ALL
        .iter()
        .map(PermissionMode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatwireConfig, DEFAULT_CONFIG_TEMPLATE};
    use crate::permissions::DEFAULT_PERMISSION_TIMEOUT;
    use tokio::sync::mpsc;

    fn fixtures() -> (ConversationState, ConfigStore, PermissionArbiter, tempfile::TempDir) {
        let cfg: ChatwireConfig =
            toml::from_str(DEFAULT_CONFIG_TEMPLATE).expect("parse default template");
        let runtime = RuntimeConfig::from_config(&cfg).expect("runtime config");
        let dir = tempfile::tempdir().expect("temp dir");
        let store = ConfigStore::new(dir.path().join("config.toml"), cfg);
        let (prompt_tx, _prompt_rx) = mpsc::channel(8);
        let arbiter = PermissionArbiter::new(prompt_tx, DEFAULT_PERMISSION_TIMEOUT);
        (ConversationState::new(runtime), store, arbiter, dir)
    }

    async fn run(
        state: &mut ConversationState,
        store: &ConfigStore,
        arbiter: &PermissionArbiter,
        text: &str,
    ) -> String {
        let parsed = parse(text).expect("text parses as a command");
        handle_command(state, store, arbiter, Duration::ZERO, parsed).await
    }

    #[test]
    fn parse_lowercases_the_name_and_preserves_argument_text() {
        let parsed = parse("/Model Opus").expect("command");
        assert_eq!(parsed.name, "model");
        assert_eq!(parsed.args, "Opus");

        let parsed = parse("  /prompt  Keep  ANSWERS  short ").expect("command");
        assert_eq!(parsed.name, "prompt");
        assert_eq!(parsed.args, "Keep  ANSWERS  short");

        assert_eq!(parse("hello /model"), None);
        assert_eq!(parse("   plain text"), None);
    }

    #[tokio::test]
    async fn model_command_is_case_insensitive_across_name_and_argument() {
        let (mut state, store, arbiter, _dir) = fixtures();
        run(&mut state, &store, &arbiter, "/Model Opus").await;
        let upper = state.config.model.clone();

        let (mut state, store, arbiter, _dir) = fixtures();
        run(&mut state, &store, &arbiter, "/model opus").await;
        assert_eq!(state.config.model, upper);
        assert_eq!(state.config.model, "claude-opus-4-1");
    }

    #[tokio::test]
    async fn unknown_command_replies_without_mutating_state() {
        let (mut state, store, arbiter, _dir) = fixtures();
        let mode_before = state.config.permission_mode;
        let model_before = state.config.model.clone();

        let reply = run(&mut state, &store, &arbiter, "/unknown foo").await;
        assert!(reply.contains("Unknown command /unknown"));
        assert!(reply.contains("/help"));
        assert_eq!(state.config.permission_mode, mode_before);
        assert_eq!(state.config.model, model_before);
        assert!(state.history().is_empty());
    }

    #[tokio::test]
    async fn mode_shortcuts_and_aliases_set_the_mode() {
        let (mut state, store, arbiter, _dir) = fixtures();
        run(&mut state, &store, &arbiter, "/plan").await;
        assert_eq!(state.config.permission_mode, PermissionMode::Plan);

        run(&mut state, &store, &arbiter, "/yolo").await;
        assert_eq!(
            state.config.permission_mode,
            PermissionMode::BypassPermissions
        );

        run(&mut state, &store, &arbiter, "/mode acceptEdits").await;
        assert_eq!(state.config.permission_mode, PermissionMode::AcceptEdits);

        let reply = run(&mut state, &store, &arbiter, "/mode sideways").await;
        assert!(reply.contains("Unknown mode"));
        assert_eq!(state.config.permission_mode, PermissionMode::AcceptEdits);
    }

    #[tokio::test]
    async fn cd_to_missing_directory_changes_nothing() {
        let (mut state, store, arbiter, _dir) = fixtures();
        let before = state.config.working_dir.clone();
        state.set_session_id(Some("sess-1".to_string()));

        let reply = run(&mut state, &store, &arbiter, "/cd /tmp/does-not-exist").await;
        assert!(reply.contains("directory not found"));
        assert_eq!(state.config.working_dir, before);
        assert_eq!(state.session_id(), Some("sess-1"));
    }

    #[tokio::test]
    async fn session_command_shows_sets_and_clears() {
        let (mut state, store, arbiter, _dir) = fixtures();
        let reply = run(&mut state, &store, &arbiter, "/session").await;
        assert!(reply.contains("session=none"));

        run(&mut state, &store, &arbiter, "/session sess-42").await;
        assert_eq!(state.session_id(), Some("sess-42"));

        run(&mut state, &store, &arbiter, "/session clear").await;
        assert_eq!(state.session_id(), None);
    }

    #[tokio::test]
    async fn fork_without_a_session_is_rejected() {
        let (mut state, store, arbiter, _dir) = fixtures();
        let reply = run(&mut state, &store, &arbiter, "/fork").await;
        assert!(reply.contains("no active session to fork"));
        assert!(!state.fork_pending());

        run(&mut state, &store, &arbiter, "/session sess-1").await;
        let reply = run(&mut state, &store, &arbiter, "/fork").await;
        assert!(reply.contains("forks"));
        assert!(state.fork_pending());
    }

    #[tokio::test]
    async fn prompt_commands_enforce_mutual_exclusivity() {
        let (mut state, store, arbiter, _dir) = fixtures();
        run(&mut state, &store, &arbiter, "/promptappend be brief").await;
        assert_eq!(state.config.system_prompt_append.as_deref(), Some("be brief"));

        run(&mut state, &store, &arbiter, "/prompt you are a reviewer").await;
        assert_eq!(
            state.config.system_prompt.as_deref(),
            Some("you are a reviewer")
        );
        assert_eq!(state.config.system_prompt_append, None);

        run(&mut state, &store, &arbiter, "/prompt clear").await;
        assert_eq!(state.config.system_prompt, None);
    }

    #[tokio::test]
    async fn empty_agent_name_is_rejected_with_a_reply() {
        let (mut state, store, arbiter, _dir) = fixtures();
        let reply = run(&mut state, &store, &arbiter, "/name   ").await;
        // No argument shows the current name instead of setting one.
        assert!(reply.contains("agent_name=Chatwire"));

        run(&mut state, &store, &arbiter, "/name Pairbot").await;
        assert_eq!(state.config.agent_name, "Pairbot");
    }

    #[tokio::test]
    async fn claudemd_parses_subsets_and_rejects_unknown_sources() {
        let (mut state, store, arbiter, _dir) = fixtures();
        run(&mut state, &store, &arbiter, "/claudemd user, project").await;
        assert_eq!(
            state.config.claude_md_sources,
            vec![ClaudeMdSource::User, ClaudeMdSource::Project]
        );

        let reply = run(&mut state, &store, &arbiter, "/claudemd global").await;
        assert!(reply.contains("Unknown source"));
        assert_eq!(state.config.claude_md_sources.len(), 2);

        run(&mut state, &store, &arbiter, "/claudemd clear").await;
        assert!(state.config.claude_md_sources.is_empty());
    }

    #[tokio::test]
    async fn clear_resets_session_and_history() {
        let (mut state, store, arbiter, _dir) = fixtures();
        state.set_session_id(Some("sess-1".to_string()));
        state
            .history_mut()
            .append(cw_backend::ConversationTurn::user("hi"));

        run(&mut state, &store, &arbiter, "/clear").await;
        assert_eq!(state.session_id(), None);
        assert!(state.history().is_empty());
    }

    #[tokio::test]
    async fn status_reports_the_current_state() {
        let (mut state, store, arbiter, _dir) = fixtures();
        state.set_session_id(Some("sess-9".to_string()));
        let reply = run(&mut state, &store, &arbiter, "/status").await;
        assert!(reply.contains("mode=default"));
        assert!(reply.contains("model=claude-sonnet-4-5"));
        assert!(reply.contains("session=sess-9"));
        assert!(reply.contains("pending_permissions=0"));
    }

    #[tokio::test]
    async fn config_save_writes_the_current_runtime_values() {
        let (mut state, store, arbiter, _dir) = fixtures();
        run(&mut state, &store, &arbiter, "/bypass").await;
        let reply = run(&mut state, &store, &arbiter, "/config save").await;
        assert!(reply.contains("saved"));

        let saved = ChatwireConfig::load(Some(store.path().to_path_buf()))
            .await
            .expect("load saved config");
        assert_eq!(
            saved.general.permission_mode,
            PermissionMode::BypassPermissions
        );
    }
}
