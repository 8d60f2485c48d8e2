//! Collaborator seams consumed by the engines.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use spark_types::models::{
    ConversationId, Like, LikeId, Match, Message, MessagePage, UserId, UserPair,
};

use crate::error::Result;

/// Who is signed in right now.
pub trait AuthProvider: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
}

/// An [`AuthProvider`] with a fixed answer. Used per request by the API and in tests.
#[derive(Debug, Clone, Default)]
pub struct FixedUser(Option<UserId>);

impl FixedUser {
    pub fn new(user_id: UserId) -> Self {
        Self(Some(user_id))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

impl AuthProvider for FixedUser {
    fn current_user_id(&self) -> Option<UserId> {
        self.0.clone()
    }
}

/// Message persistence for conversations.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Messages `[page * page_size, page * page_size + page_size)`, oldest first.
    /// `has_more` reports whether anything exists past the window.
    async fn fetch_page(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage>;

    /// Insert a message. The store assigns id and timestamp.
    async fn insert(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message>;

    /// Newest message per conversation; conversations without messages are absent.
    async fn latest_messages(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<HashMap<ConversationId, Message>>;
}

/// Like edges and matches.
///
/// Inserts must report an existing row as [`crate::StoreError::Duplicate`];
/// the match engine relies on that signal instead of locking.
#[async_trait]
pub trait MatchStore: Send + Sync + 'static {
    async fn insert_like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<Like>;

    async fn find_like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<Option<Like>>;

    /// Returns `false` if there was nothing to delete.
    async fn delete_like(&self, like_id: &LikeId) -> Result<bool>;

    /// Likes received by `user_id` from users it has not matched with.
    async fn incoming_likes(&self, user_id: &UserId) -> Result<Vec<Like>>;

    async fn find_match(&self, pair: &UserPair) -> Result<Option<Match>>;

    async fn insert_match(&self, pair: &UserPair) -> Result<Match>;

    /// All matches of `user_id`, newest first.
    async fn matches_for(&self, user_id: &UserId) -> Result<Vec<Match>>;
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn fetch_page(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage> {
        (**self).fetch_page(conversation_id, page, page_size).await
    }

    async fn insert(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message> {
        (**self).insert(conversation_id, sender_id, content).await
    }

    async fn latest_messages(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<HashMap<ConversationId, Message>> {
        (**self).latest_messages(conversation_ids).await
    }
}

#[async_trait]
impl<T: MatchStore + ?Sized> MatchStore for Arc<T> {
    async fn insert_like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<Like> {
        (**self).insert_like(liker_id, liked_id).await
    }

    async fn find_like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<Option<Like>> {
        (**self).find_like(liker_id, liked_id).await
    }

    async fn delete_like(&self, like_id: &LikeId) -> Result<bool> {
        (**self).delete_like(like_id).await
    }

    async fn incoming_likes(&self, user_id: &UserId) -> Result<Vec<Like>> {
        (**self).incoming_likes(user_id).await
    }

    async fn find_match(&self, pair: &UserPair) -> Result<Option<Match>> {
        (**self).find_match(pair).await
    }

    async fn insert_match(&self, pair: &UserPair) -> Result<Match> {
        (**self).insert_match(pair).await
    }

    async fn matches_for(&self, user_id: &UserId) -> Result<Vec<Match>> {
        (**self).matches_for(user_id).await
    }
}
