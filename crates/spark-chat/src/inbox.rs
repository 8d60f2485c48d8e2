//! Inbox: one summary per conversation, newest activity first.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use spark_types::models::{ChatSummary, ConversationId, Match, Message, UserId};

use crate::error::{ChatError, Result};
use crate::realtime::{Delivery, EventSource, SubscriptionHandle};
use crate::store::{AuthProvider, MatchStore, MessageStore};

/// Build the inbox of `current_user_id`.
///
/// A conversation is unread when its newest message came from the other
/// participant. Conversations without messages sort last, in input order.
/// Conversations the user is not part of are skipped.
pub fn compute_inbox(
    conversations: &[Match],
    latest: &HashMap<ConversationId, Message>,
    current_user_id: &UserId,
) -> Vec<ChatSummary> {
    let mut summaries: Vec<ChatSummary> = conversations
        .iter()
        .filter_map(|conversation| {
            let other_user_id = conversation.pair.other(current_user_id)?.clone();
            let last = latest.get(&conversation.id);
            Some(ChatSummary {
                conversation_id: conversation.id.clone(),
                other_user_id,
                last_message: last.map(|m| m.content.clone()),
                last_message_at: last.map(|m| m.created_at),
                is_unread: last.is_some_and(|m| &m.sender_id != current_user_id),
            })
        })
        .collect();

    // None < Some, so reversing the comparison puts empty conversations last.
    summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    summaries
}

pub fn unread_count(summaries: &[ChatSummary]) -> usize {
    summaries.iter().filter(|s| s.is_unread).count()
}

/// Live inbox of the signed-in user.
pub struct Inbox<S, E> {
    inner: Arc<InboxInner<S, E>>,
}

impl<S, E> Clone for Inbox<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct InboxInner<S, E> {
    store: S,
    events: E,
    auth: Arc<dyn AuthProvider>,
    summaries: watch::Sender<Vec<ChatSummary>>,
}

impl<S, E> Inbox<S, E>
where
    S: MessageStore + MatchStore,
    E: EventSource,
{
    pub fn new(store: S, events: E, auth: Arc<dyn AuthProvider>) -> Self {
        let (summaries, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(InboxInner {
                store,
                events,
                auth,
                summaries,
            }),
        }
    }

    /// Receiver for the latest computed inbox.
    pub fn summaries(&self) -> watch::Receiver<Vec<ChatSummary>> {
        self.inner.summaries.subscribe()
    }

    pub fn current(&self) -> Vec<ChatSummary> {
        self.inner.summaries.borrow().clone()
    }

    /// Reload matches and their newest messages and publish the result.
    pub async fn refresh(&self) -> Result<Vec<ChatSummary>> {
        let user_id = self.inner.auth.current_user_id().ok_or(ChatError::Auth)?;

        let conversations = self.inner.store.matches_for(&user_id).await?;
        let ids: Vec<ConversationId> = conversations.iter().map(|m| m.id.clone()).collect();
        let latest = if ids.is_empty() {
            HashMap::new()
        } else {
            self.inner.store.latest_messages(&ids).await?
        };

        let summaries = compute_inbox(&conversations, &latest, &user_id);
        debug!(
            "Inbox of {}: {} conversations, {} unread",
            user_id,
            summaries.len(),
            unread_count(&summaries)
        );
        self.inner.summaries.send_replace(summaries.clone());
        Ok(summaries)
    }

    /// Keep the inbox current: refresh now and again after every message
    /// insert, until the returned watcher is stopped or dropped.
    pub async fn watch(&self) -> Result<InboxWatcher> {
        let mut subscription = self.inner.events.subscribe_all().await?;
        self.refresh().await?;

        let handle = subscription.handle();
        let inbox = self.clone();
        let task = tokio::spawn(async move {
            while let Some(delivery) = subscription.recv().await {
                match delivery {
                    Delivery::Message(message) => {
                        debug!("Refreshing inbox after message {}", message.id);
                        if let Err(e) = inbox.refresh().await {
                            warn!("Inbox refresh failed: {}", e);
                        }
                    }
                    Delivery::Error(e) => warn!("Inbox subscription error: {}", e),
                }
            }
            debug!("Inbox watcher stopped");
        });
        info!("Watching inbox");

        Ok(InboxWatcher { handle, task })
    }
}

/// Running inbox refresh loop. Stops on [`InboxWatcher::stop`] or drop.
pub struct InboxWatcher {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl InboxWatcher {
    pub fn stop(&self) {
        self.handle.unsubscribe();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for InboxWatcher {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}
