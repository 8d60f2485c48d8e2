use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh server-assigned id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Opaque user id, as issued by the auth provider.
    UserId
);
string_id!(
    /// Id of a conversation. A conversation is a match row, so this is also the match id.
    ConversationId
);
string_id!(MessageId);
string_id!(LikeId);

/// A chat message. Immutable once the store has assigned `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Unordered pair of distinct users, stored smaller id first.
///
/// Every code path that writes or looks up a match goes through
/// [`UserPair::new`], so `(user_a, user_b)` is a unique key for the pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserPair {
    user_a: UserId,
    user_b: UserId,
}

impl UserPair {
    /// Returns `None` when both ids are the same user.
    pub fn new(first: &UserId, second: &UserId) -> Option<Self> {
        match first.cmp(second) {
            std::cmp::Ordering::Less => Some(Self {
                user_a: first.clone(),
                user_b: second.clone(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                user_a: second.clone(),
                user_b: first.clone(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn user_a(&self) -> &UserId {
        &self.user_a
    }

    pub fn user_b(&self) -> &UserId {
        &self.user_b
    }

    pub fn contains(&self, user: &UserId) -> bool {
        &self.user_a == user || &self.user_b == user
    }

    /// The member of the pair that is not `user`.
    pub fn other(&self, user: &UserId) -> Option<&UserId> {
        if &self.user_a == user {
            Some(&self.user_b)
        } else if &self.user_b == user {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

/// A match between two users. Doubles as the conversation they chat in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: ConversationId,
    pub pair: UserPair,
    pub created_at: DateTime<Utc>,
}

/// Directed "liker is interested in liked" edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: LikeId,
    pub liker_id: UserId,
    pub liked_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// One window of a conversation's history, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// Result of recording a like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub matched: bool,
    pub already_existed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Match>,
}

impl LikeOutcome {
    pub fn not_matched() -> Self {
        Self {
            matched: false,
            already_existed: false,
            conversation: None,
        }
    }

    pub fn matched(conversation: Match, already_existed: bool) -> Self {
        Self {
            matched: true,
            already_existed,
            conversation: Some(conversation),
        }
    }
}

/// Inbox row for one conversation, derived from its latest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub conversation_id: ConversationId,
    pub other_user_id: UserId,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_unread: bool,
}
