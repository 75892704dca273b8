//! Runtime wiring for the `chatwire` binary: serve, init, doctor.

use crate::bridge::Bridge;
use crate::config::{self, ChatwireConfig, RuntimeConfig, default_config_path};
use crate::config_store::ConfigStore;
use anyhow::Result;
use cw_backend::{AssistantBackend, DevBackend};
use cw_transport::{ConsoleTransport, Transport};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(default_config_path);
    let cfg = ChatwireConfig::load(Some(path.clone())).await?;
    if cfg.security.allowed_senders.is_empty() && !cfg.security.allow_all_senders {
        tracing::warn!("security.allowed_senders is empty; every sender will be ignored");
    }

    let defaults = RuntimeConfig::from_config(&cfg)?;
    let transport = build_transport(&cfg)?;
    let backend = build_backend(&cfg)?;
    tracing::info!(
        transport = transport.transport_id(),
        backend = backend.backend_id(),
        model = %defaults.model,
        working_dir = %defaults.working_dir.display(),
        "chatwire starting"
    );

    let store = ConfigStore::new(path, cfg);
    let bridge = Bridge::new(store, defaults, transport, backend);
    bridge.run().await
}

fn build_transport(cfg: &ChatwireConfig) -> Result<Arc<dyn Transport>> {
    match cfg.transport.kind.as_str() {
        "console" => Ok(Arc::new(ConsoleTransport::new(
            cfg.transport.operator.clone(),
        ))),
        other => Err(anyhow::anyhow!("unsupported transport kind: {other}")),
    }
}

fn build_backend(cfg: &ChatwireConfig) -> Result<Arc<dyn AssistantBackend>> {
    match cfg.backend.kind.as_str() {
        "dev" => Ok(Arc::new(DevBackend::new())),
        other => Err(anyhow::anyhow!("unsupported backend kind: {other}")),
    }
}

pub async fn init(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(default_config_path);
    let created = config::write_default_template(&path).await?;
    if created {
        println!("chatwire init: wrote {}", path.display());
        println!("next: edit the config, then run `chatwire serve`");
    } else {
        println!(
            "chatwire init: {} already exists; left unchanged",
            path.display()
        );
    }
    Ok(())
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(default_config_path);
    let cfg = ChatwireConfig::load(Some(path.clone())).await?;
    let runtime = RuntimeConfig::from_config(&cfg)?;

    let mut problems = Vec::new();
    match tokio::fs::metadata(&runtime.working_dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => problems.push(format!(
            "general.working_dir {} is not a directory",
            runtime.working_dir.display()
        )),
        Err(e) => problems.push(format!(
            "general.working_dir {}: {e}",
            runtime.working_dir.display()
        )),
    }
    if cfg.security.allowed_senders.is_empty() && !cfg.security.allow_all_senders {
        problems.push("security.allowed_senders is empty; nobody can reach the agent".to_string());
    }

    println!("config: {}", path.display());
    println!("agent_name: {}", runtime.agent_name);
    println!("model: {}", runtime.model);
    println!("working_dir: {}", runtime.working_dir.display());
    println!("permission_mode: {}", runtime.permission_mode);
    println!("transport: {}", cfg.transport.kind);
    println!("backend: {}", cfg.backend.kind);

    if problems.is_empty() {
        println!("ok");
        return Ok(());
    }
    for problem in &problems {
        println!("problem: {problem}");
    }
    Err(anyhow::anyhow!(
        "doctor found {} problem(s)",
        problems.len()
    ))
}
