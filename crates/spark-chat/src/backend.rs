//! SQLite + in-process dispatcher implementation of the collaborator traits.
//!
//! Every successful insert is published on the [`Dispatcher`], which is
//! what realtime subscriptions and WebSocket clients listen to.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, warn};

use spark_db::Database;
use spark_db::models::{LikeRow, MatchRow, MessageRow, now_timestamp};
use spark_gateway::connection::ConversationAccess;
use spark_gateway::dispatcher::Dispatcher;
use spark_types::events::GatewayEvent;
use spark_types::models::{
    ConversationId, Like, LikeId, Match, Message, MessageId, MessagePage, UserId, UserPair,
};

use crate::error::{ChatError, Result, StoreError, SubscriptionError, validate_content};
use crate::realtime::{DeliverySender, EventSource, Subscription, subscription_channel};
use crate::store::{MatchStore, MessageStore};

#[derive(Clone)]
pub struct LocalBackend {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl LocalBackend {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run `f` against the database on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ChatError::Store(StoreError::Backend(e.to_string()))
            })?
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("bad timestamp {raw:?}: {e}")).into())
}

fn message_from_row(row: MessageRow) -> Result<Message> {
    Ok(Message {
        created_at: parse_timestamp(&row.created_at)?,
        id: MessageId::from(row.id),
        conversation_id: ConversationId::from(row.conversation_id),
        sender_id: UserId::from(row.sender_id),
        content: row.content,
    })
}

fn like_from_row(row: LikeRow) -> Result<Like> {
    Ok(Like {
        created_at: parse_timestamp(&row.created_at)?,
        id: LikeId::from(row.id),
        liker_id: UserId::from(row.liker_id),
        liked_id: UserId::from(row.liked_id),
    })
}

fn match_from_row(row: MatchRow) -> Result<Match> {
    let pair = UserPair::new(&UserId::from(row.user_a), &UserId::from(row.user_b))
        .ok_or_else(|| StoreError::Backend(format!("match {} pairs a user with itself", row.id)))?;
    Ok(Match {
        created_at: parse_timestamp(&row.created_at)?,
        id: ConversationId::from(row.id),
        pair,
    })
}

#[async_trait]
impl MessageStore for LocalBackend {
    async fn fetch_page(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage> {
        if page_size == 0 {
            return Err(ChatError::Validation("page size must be positive".into()));
        }

        let cid = conversation_id.to_string();
        let size = u64::from(page_size);
        let offset = u64::from(page) * size;
        // One extra row tells whether another page exists.
        let mut rows = self
            .blocking(move |db| Ok(db.get_messages_page(&cid, offset, size + 1)?))
            .await?;

        let has_more = rows.len() > page_size as usize;
        rows.truncate(page_size as usize);
        let messages = rows
            .into_iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(MessagePage { messages, has_more })
    }

    async fn insert(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message> {
        let content = validate_content(content)?;
        if sender_id.is_blank() {
            return Err(ChatError::Auth);
        }
        if conversation_id.is_blank() {
            return Err(ChatError::Validation("conversation id is required".into()));
        }

        let row = MessageRow {
            id: MessageId::generate().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content,
            created_at: now_timestamp(),
        };

        let row = self
            .blocking(move |db| {
                let Some(conversation) = db.get_match(&row.conversation_id)? else {
                    return Err(StoreError::NotFound(format!(
                        "conversation {}",
                        row.conversation_id
                    ))
                    .into());
                };
                if conversation.user_a != row.sender_id && conversation.user_b != row.sender_id {
                    return Err(StoreError::Forbidden(format!(
                        "{} is not part of conversation {}",
                        row.sender_id, row.conversation_id
                    ))
                    .into());
                }
                db.insert_message(&row)?;
                Ok(row)
            })
            .await?;

        let message = message_from_row(row)?;
        let delivered = self.dispatcher.broadcast(GatewayEvent::MessageCreate {
            message: message.clone(),
        });
        debug!(
            "Message {} stored in {}, pushed to {} receivers",
            message.id, message.conversation_id, delivered
        );
        Ok(message)
    }

    async fn latest_messages(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<HashMap<ConversationId, Message>> {
        let ids: Vec<String> = conversation_ids.iter().map(|id| id.to_string()).collect();
        let rows = self
            .blocking(move |db| Ok(db.get_latest_messages(&ids)?))
            .await?;

        rows.into_iter()
            .map(|row| {
                let message = message_from_row(row)?;
                Ok((message.conversation_id.clone(), message))
            })
            .collect()
    }
}

#[async_trait]
impl MatchStore for LocalBackend {
    async fn insert_like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<Like> {
        let row = LikeRow {
            id: LikeId::generate().to_string(),
            liker_id: liker_id.to_string(),
            liked_id: liked_id.to_string(),
            created_at: now_timestamp(),
        };
        let row = self
            .blocking(move |db| {
                db.insert_like(&row)?;
                Ok(row)
            })
            .await?;
        like_from_row(row)
    }

    async fn find_like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<Option<Like>> {
        let (liker, liked) = (liker_id.to_string(), liked_id.to_string());
        self.blocking(move |db| Ok(db.find_like(&liker, &liked)?))
            .await?
            .map(like_from_row)
            .transpose()
    }

    async fn delete_like(&self, like_id: &LikeId) -> Result<bool> {
        let id = like_id.to_string();
        self.blocking(move |db| Ok(db.delete_like(&id)?)).await
    }

    async fn incoming_likes(&self, user_id: &UserId) -> Result<Vec<Like>> {
        let uid = user_id.to_string();
        self.blocking(move |db| Ok(db.get_incoming_likes(&uid)?))
            .await?
            .into_iter()
            .map(like_from_row)
            .collect()
    }

    async fn find_match(&self, pair: &UserPair) -> Result<Option<Match>> {
        let (a, b) = (pair.user_a().to_string(), pair.user_b().to_string());
        self.blocking(move |db| Ok(db.find_match_by_pair(&a, &b)?))
            .await?
            .map(match_from_row)
            .transpose()
    }

    async fn insert_match(&self, pair: &UserPair) -> Result<Match> {
        let row = MatchRow {
            id: ConversationId::generate().to_string(),
            user_a: pair.user_a().to_string(),
            user_b: pair.user_b().to_string(),
            created_at: now_timestamp(),
        };
        let row = self
            .blocking(move |db| {
                db.insert_match(&row)?;
                Ok(row)
            })
            .await?;

        let created = match_from_row(row)?;
        self.dispatcher.broadcast(GatewayEvent::MatchCreate {
            conversation: created.clone(),
        });
        Ok(created)
    }

    async fn matches_for(&self, user_id: &UserId) -> Result<Vec<Match>> {
        let uid = user_id.to_string();
        self.blocking(move |db| Ok(db.get_matches_for_user(&uid)?))
            .await?
            .into_iter()
            .map(match_from_row)
            .collect()
    }
}

#[async_trait]
impl EventSource for LocalBackend {
    async fn subscribe(
        &self,
        conversation_id: &ConversationId,
    ) -> std::result::Result<Subscription, SubscriptionError> {
        if conversation_id.is_blank() {
            return Err(SubscriptionError::Rejected("conversation id is required".into()));
        }
        Ok(self.spawn_forwarder(Some(conversation_id.clone())))
    }

    async fn subscribe_all(&self) -> std::result::Result<Subscription, SubscriptionError> {
        Ok(self.spawn_forwarder(None))
    }
}

impl LocalBackend {
    fn spawn_forwarder(&self, filter: Option<ConversationId>) -> Subscription {
        // Receiver is created before returning so no later insert is missed.
        let rx = self.dispatcher.subscribe();
        let (tx, subscription) = subscription_channel();
        tokio::spawn(forward_inserts(rx, tx, filter));
        subscription
    }
}

/// Relay `MessageCreate` events into one subscription until it goes away.
async fn forward_inserts(
    mut rx: broadcast::Receiver<GatewayEvent>,
    tx: DeliverySender,
    filter: Option<ConversationId>,
) {
    loop {
        let event = tokio::select! {
            _ = tx.closed() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(GatewayEvent::MessageCreate { message }) => {
                if filter
                    .as_ref()
                    .is_some_and(|id| id != &message.conversation_id)
                {
                    continue;
                }
                if !tx.message(message) {
                    break;
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                warn!("Realtime subscriber lagged by {} events", n);
                if !tx.error(SubscriptionError::Lagged(n)) {
                    break;
                }
            }
            Err(RecvError::Closed) => {
                tx.error(SubscriptionError::ChannelClosed);
                break;
            }
        }
    }
    debug!("Realtime forwarder for {:?} stopped", filter);
}

#[async_trait]
impl ConversationAccess for LocalBackend {
    async fn is_member(&self, user_id: &UserId, conversation_id: &ConversationId) -> bool {
        let (uid, cid) = (user_id.to_string(), conversation_id.to_string());
        let row = self.blocking(move |db| Ok(db.get_match(&cid)?)).await;
        match row {
            Ok(Some(row)) => row.user_a == uid || row.user_b == uid,
            Ok(None) => false,
            Err(e) => {
                warn!("Membership lookup for {} failed: {}", conversation_id, e);
                false
            }
        }
    }
}
