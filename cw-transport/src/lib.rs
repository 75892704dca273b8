//! Transport adapters for Chatwire.
//!
//! Adapters are pure I/O: they convert platform messages to/from Chatwire
//! `InboundMessage` / `OutboundMessage`. Connection lifecycle (pairing,
//! delivery, reconnects) stays on the adapter side of this seam.

mod console;
mod traits;
mod types;

pub use console::ConsoleTransport;
pub use traits::Transport;
pub use types::{
    ConversationKey, GroupId, InboundMessage, MessageId, OutboundMessage, SenderId,
    TransportEvent,
};
