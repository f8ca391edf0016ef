//! # Chat Transport Boundary
//!
//! The chat platform's wire protocol is external; the bridge only needs a
//! way to push rendered messages at a channel. Inbound chat traffic is the
//! command layer's concern and enters the bridge through
//! [`crate::bridge::BridgeHandle::enqueue_outbound`].

use async_trait::async_trait;
use log::info;

/// A message ready for the chat side: either a plain line or a structured
/// notice the platform may render as an embed/card.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    Text(String),
    Notice { title: String, body: String },
}

impl ChatMessage {
    /// Flatten to plain text for sinks without structured rendering.
    pub fn as_plain_text(&self) -> String {
        match self {
            ChatMessage::Text(text) => text.clone(),
            ChatMessage::Notice { title, body } => format!("{}\n{}", title, body),
        }
    }
}

/// Send primitive the bridge drains mesh→chat traffic into.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver one message to a channel. False on failure; the bridge logs
    /// and moves on, it never re-queues.
    async fn send(&self, channel_id: u64, message: &ChatMessage) -> bool;
}

/// Log-only chat sink, used when no chat backend is attached.
pub struct LogChat;

#[async_trait]
impl ChatTransport for LogChat {
    async fn send(&self, channel_id: u64, message: &ChatMessage) -> bool {
        info!(
            "[chat:{}] {}",
            channel_id,
            crate::logutil::escape_log(&message.as_plain_text())
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::ChatMessage;

    #[test]
    fn notice_flattens_to_two_lines() {
        let msg = ChatMessage::Notice {
            title: "Node is on the move".into(),
            body: "moved 150m".into(),
        };
        assert_eq!(msg.as_plain_text(), "Node is on the move\nmoved 150m");
    }
}
