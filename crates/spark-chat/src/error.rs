use spark_db::DbError;
use thiserror::Error;

/// Failures reported by a store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The row already exists. Distinguishable so engines can treat it as success.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(what) => Self::Duplicate(what),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Transport-level problems with a realtime subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("subscription rejected: {0}")]
    Rejected(String),
    #[error("realtime channel closed")]
    ChannelClosed,
    #[error("missed {0} realtime events")]
    Lagged(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Bad input, rejected before any I/O.
    #[error("invalid input: {0}")]
    Validation(String),
    /// No signed-in user.
    #[error("not signed in")]
    Auth,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// The feed is not in a state that accepts this operation.
    #[error("conversation is not ready")]
    NotReady,
    /// Another send is still in flight on this feed.
    #[error("a message is already being sent")]
    SendInFlight,
    /// The conversation was closed or replaced while the call was suspended.
    #[error("superseded by a newer open or close")]
    Superseded,
}

impl ChatError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_duplicate())
    }
}

impl From<DbError> for ChatError {
    fn from(err: DbError) -> Self {
        Self::Store(err.into())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// Trim message content, rejecting empty and whitespace-only text.
pub fn validate_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("message cannot be empty".into()));
    }
    Ok(trimmed.to_string())
}
