use crate::types::{ConversationKey, InboundMessage, OutboundMessage, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Unique transport identifier: "console", "whatsapp".
    fn transport_id(&self) -> &str;

    /// Start receiving. Push each inbound message to `tx` and lifecycle
    /// notices to `events`.
    async fn start(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<()>;

    /// Deliver a message to a conversation on this platform.
    async fn send_text(&self, destination: &ConversationKey, message: OutboundMessage)
    -> Result<()>;

    /// Show a typing indicator where supported. Adapters without typing
    /// state keep the default.
    async fn send_typing(&self, _destination: &ConversationKey) -> Result<()> {
        Err(anyhow::anyhow!(
            "send_typing is not supported by this transport"
        ))
    }

    fn supports_typing(&self) -> bool {
        false
    }
}
