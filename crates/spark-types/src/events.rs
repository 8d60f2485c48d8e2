use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, Match, Message, UserId};

/// Events pushed by the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: UserId },

    /// A message was inserted into a conversation
    MessageCreate { message: Message },

    /// Two users liked each other and a conversation now exists
    MatchCreate { conversation: Match },
}

impl GatewayEvent {
    /// Returns the conversation this event is scoped to, if any.
    /// Only clients subscribed to that conversation receive it.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::MessageCreate { message } => Some(&message.conversation_id),
            _ => None,
        }
    }

    /// Whether a user-scoped event should reach `user_id`.
    /// Events without a user scope are delivered to everyone.
    pub fn is_visible_to(&self, user_id: &UserId) -> bool {
        match self {
            Self::MatchCreate { conversation } => conversation.pair.contains(user_id),
            Self::Ready { user_id: target } => target == user_id,
            Self::MessageCreate { .. } => true,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving message inserts for these conversations.
    Subscribe { conversation_ids: Vec<ConversationId> },

    /// Stop receiving message inserts for these conversations.
    Unsubscribe { conversation_ids: Vec<ConversationId> },
}
