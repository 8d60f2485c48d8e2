//! Scriptable collaborators for engine tests.
//!
//! Fetches and inserts can be held open with gates so a test decides the
//! order in which concurrent operations complete.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

use spark_chat::realtime::{DeliverySender, EventSource, Subscription, subscription_channel};
use spark_chat::store::MessageStore;
use spark_chat::{ChatError, Result, StoreError, SubscriptionError};
use spark_types::models::{ConversationId, Message, MessageId, MessagePage, UserId};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn msg(id: &str, conversation: &str, secs: i64) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: ConversationId::from(conversation),
        sender_id: UserId::from("them"),
        content: format!("text {id}"),
        created_at: at(secs),
    }
}

/// `count` messages `{prefix}-0..` one second apart.
pub fn history(conversation: &str, prefix: &str, count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| msg(&format!("{prefix}-{i}"), conversation, i as i64))
        .collect()
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Default)]
struct StoreState {
    messages: HashMap<ConversationId, Vec<Message>>,
    fail_fetches: bool,
    fail_inserts: bool,
    in_flight: Option<Message>,
    inserted: u64,
}

pub struct FakeStore {
    state: Mutex<StoreState>,
    held_fetches: watch::Sender<HashSet<ConversationId>>,
    inserts_held: watch::Sender<bool>,
    fetch_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        let (held_fetches, _) = watch::channel(HashSet::new());
        let (inserts_held, _) = watch::channel(false);
        Self {
            state: Mutex::new(StoreState::default()),
            held_fetches,
            inserts_held,
            fetch_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_history(messages: Vec<Message>) -> Self {
        let store = Self::new();
        store.seed(messages);
        store
    }

    pub fn seed(&self, messages: Vec<Message>) {
        let mut state = self.state.lock().unwrap();
        for m in messages {
            state
                .messages
                .entry(m.conversation_id.clone())
                .or_default()
                .push(m);
        }
    }

    pub fn hold_fetches(&self, conversation: &str) {
        self.held_fetches.send_modify(|held| {
            held.insert(ConversationId::from(conversation));
        });
    }

    pub fn release_fetches(&self, conversation: &str) {
        self.held_fetches.send_modify(|held| {
            held.remove(&ConversationId::from(conversation));
        });
    }

    pub fn hold_inserts(&self) {
        self.inserts_held.send_replace(true);
    }

    pub fn release_inserts(&self) {
        self.inserts_held.send_replace(false);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetches = fail;
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.state.lock().unwrap().fail_inserts = fail;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// The message an insert currently held at the gate will return.
    pub fn in_flight(&self) -> Option<Message> {
        self.state.lock().unwrap().in_flight.clone()
    }
}

#[async_trait]
impl MessageStore for FakeStore {
    async fn fetch_page(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held_fetches.subscribe();
        let _ = held.wait_for(|held| !held.contains(conversation_id)).await;

        let state = self.state.lock().unwrap();
        if state.fail_fetches {
            return Err(StoreError::Backend("fetch failed".into()).into());
        }
        let mut all = state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        all.sort_by_key(|m| m.created_at);

        let start = (page as usize * page_size as usize).min(all.len());
        let end = (start + page_size as usize).min(all.len());
        Ok(MessagePage {
            messages: all[start..end].to_vec(),
            has_more: all.len() > end,
        })
    }

    async fn insert(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            state.inserted += 1;
            let n = state.inserted;
            state.in_flight = Some(Message {
                id: MessageId::from(format!("sent-{n}")),
                conversation_id: conversation_id.clone(),
                sender_id: sender_id.clone(),
                content: content.to_string(),
                created_at: at(10_000 + n as i64),
            });
        }

        let mut held = self.inserts_held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        let mut state = self.state.lock().unwrap();
        let Some(message) = state.in_flight.take() else {
            return Err(ChatError::Store(StoreError::Backend("no insert in flight".into())));
        };
        if state.fail_inserts {
            return Err(StoreError::Backend("insert failed".into()).into());
        }
        state
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn latest_messages(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<HashMap<ConversationId, Message>> {
        let state = self.state.lock().unwrap();
        Ok(conversation_ids
            .iter()
            .filter_map(|id| {
                let newest = state.messages.get(id)?.iter().max_by_key(|m| m.created_at)?;
                Some((id.clone(), newest.clone()))
            })
            .collect())
    }
}

/// Event source whose pushes are driven by the test.
#[derive(Default)]
pub struct FakeEvents {
    senders: Mutex<Vec<(Option<ConversationId>, DeliverySender)>>,
    reject_next: Mutex<Option<SubscriptionError>>,
    subscribe_calls: AtomicUsize,
}

impl FakeEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message` to every live subscription that wants it.
    pub fn push(&self, message: Message) {
        for (filter, tx) in self.senders.lock().unwrap().iter() {
            if filter.as_ref().is_none_or(|id| id == &message.conversation_id) {
                tx.message(message.clone());
            }
        }
    }

    pub fn fail(&self, error: SubscriptionError) {
        for (_, tx) in self.senders.lock().unwrap().iter() {
            tx.error(error.clone());
        }
    }

    pub fn reject_next(&self, error: SubscriptionError) {
        *self.reject_next.lock().unwrap() = Some(error);
    }

    pub fn active(&self) -> usize {
        self.senders
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, tx)| tx.is_active())
            .count()
    }

    pub fn is_subscribed_to(&self, conversation: &str) -> bool {
        let conversation = ConversationId::from(conversation);
        self.senders
            .lock()
            .unwrap()
            .iter()
            .any(|(filter, tx)| filter.as_ref() == Some(&conversation) && tx.is_active())
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    fn register(
        &self,
        filter: Option<ConversationId>,
    ) -> std::result::Result<Subscription, SubscriptionError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.reject_next.lock().unwrap().take() {
            return Err(err);
        }
        let (tx, subscription) = subscription_channel();
        self.senders.lock().unwrap().push((filter, tx));
        Ok(subscription)
    }
}

#[async_trait]
impl EventSource for FakeEvents {
    async fn subscribe(
        &self,
        conversation_id: &ConversationId,
    ) -> std::result::Result<Subscription, SubscriptionError> {
        self.register(Some(conversation_id.clone()))
    }

    async fn subscribe_all(&self) -> std::result::Result<Subscription, SubscriptionError> {
        self.register(None)
    }
}
