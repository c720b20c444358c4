use serde_json::Value;
use uuid::Uuid;

use crate::models::{Chat, Message};

/// Events pushed by the hub to a connected client.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A new message was posted to a chat
    ReceiveMessage(Message),

    /// A message was edited
    MessageUpdated(Message),

    /// A message was deleted
    MessageDeleted(Uuid),

    /// Someone is typing in the joined chat
    UserTyping(Uuid),

    /// Full refresh of the user's chat list
    UpdateChats(Vec<Chat>),
}

impl HubEvent {
    /// Returns the chat this event is scoped to, when the payload carries one.
    /// Deletions and typing notices are only delivered to the joined room and
    /// carry no chat id.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::ReceiveMessage(m) | Self::MessageUpdated(m) => Some(m.chat_id),
            _ => None,
        }
    }
}

/// Invocations sent FROM client TO hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubCommand {
    /// Join the room of a chat so its events are delivered
    JoinChat { chat_id: Uuid },

    /// Tell the other participant we are typing
    NotifyTyping { chat_id: Uuid },

    /// Mark every message of the chat as read
    MarkChatAsRead { chat_id: Uuid },
}

impl HubCommand {
    /// Hub method name.
    pub fn target(&self) -> &'static str {
        match self {
            Self::JoinChat { .. } => "JoinChat",
            Self::NotifyTyping { .. } => "NotifyTyping",
            Self::MarkChatAsRead { .. } => "MarkChatAsRead",
        }
    }

    /// Positional hub arguments. Chat ids travel as strings.
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            Self::JoinChat { chat_id }
            | Self::NotifyTyping { chat_id }
            | Self::MarkChatAsRead { chat_id } => vec![Value::String(chat_id.to_string())],
        }
    }
}
