//! Stdin/stdout transport for local development.
//!
//! Every line typed becomes an inbound message from a single fixed operator;
//! replies print to stdout. No groups, no typing state.

use crate::traits::Transport;
use crate::types::{
    ConversationKey, InboundMessage, MessageId, OutboundMessage, SenderId, TransportEvent,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct ConsoleTransport {
    operator: SenderId,
}

impl ConsoleTransport {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: SenderId::new(operator),
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn transport_id(&self) -> &str {
        "console"
    }

    async fn start(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<()> {
        let operator = self.operator.clone();
        let _ = events.send(TransportEvent::Ready).await;

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let text = line.trim().to_string();
                        if text.is_empty() {
                            continue;
                        }
                        let inbound = InboundMessage {
                            message_id: MessageId::new(Uuid::new_v4().to_string()),
                            sender_id: operator.clone(),
                            group_id: None,
                            is_group: false,
                            text,
                            received_at: Utc::now(),
                        };
                        if tx.send(inbound).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        let _ = events
                            .send(TransportEvent::Disconnected {
                                reason: "stdin closed".to_string(),
                            })
                            .await;
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(%e, "console transport read failed");
                        let _ = events
                            .send(TransportEvent::Disconnected {
                                reason: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
        });
        Ok(())
    }

    async fn send_text(
        &self,
        destination: &ConversationKey,
        message: OutboundMessage,
    ) -> Result<()> {
        println!("[{destination}] {}", message.text);
        Ok(())
    }
}
