//! Conversation feed engine.
//!
//! One [`FeedEngine`] shows one conversation at a time. Its state sits behind
//! a single mutex that is never held across an `.await`, so page loads,
//! pushes and sends are applied one at a time while the I/O they wait on
//! runs concurrently.
//!
//! Every `open`/`close` bumps a generation counter. Asynchronous results
//! carry the generation they were started under and are dropped if it is no
//! longer current, so a late page from a previous conversation can never
//! land in the current one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use spark_types::models::{ConversationId, Message};

use crate::error::{ChatError, Result, SubscriptionError, validate_content};
use crate::realtime::{Delivery, EventSource, Subscription, SubscriptionHandle};
use crate::sequence::MessageSequence;
use crate::store::{AuthProvider, MessageStore};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub page_size: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    /// Nothing opened yet.
    Idle,
    /// Waiting for page 0.
    Loading,
    Ready,
    /// Waiting for an older page.
    LoadingMore,
    /// Torn down by `close`.
    Closed,
}

/// Point-in-time copy of a feed, for rendering.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub conversation_id: Option<ConversationId>,
    pub phase: FeedPhase,
    pub messages: Vec<Message>,
    pub current_page: u32,
    pub has_more: bool,
    pub sending: bool,
    /// Last realtime failure. While set, the feed may be missing pushes
    /// until the conversation is reopened.
    pub subscription_error: Option<SubscriptionError>,
}

struct FeedState {
    conversation_id: Option<ConversationId>,
    generation: u64,
    phase: FeedPhase,
    sequence: MessageSequence,
    current_page: u32,
    has_more: bool,
    sending: bool,
    subscription: Option<SubscriptionHandle>,
    subscription_error: Option<SubscriptionError>,
}

impl FeedState {
    fn new() -> Self {
        Self {
            conversation_id: None,
            generation: 0,
            phase: FeedPhase::Idle,
            sequence: MessageSequence::new(),
            current_page: 0,
            has_more: false,
            sending: false,
            subscription: None,
            subscription_error: None,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Drop everything belonging to the open conversation and invalidate
    /// in-flight work.
    fn teardown(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.unsubscribe();
        }
        self.generation += 1;
        self.conversation_id = None;
        self.phase = FeedPhase::Closed;
        self.sequence.clear();
        self.current_page = 0;
        self.has_more = false;
        self.sending = false;
        self.subscription_error = None;
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            conversation_id: self.conversation_id.clone(),
            phase: self.phase,
            messages: self.sequence.messages().to_vec(),
            current_page: self.current_page,
            has_more: self.has_more,
            sending: self.sending,
            subscription_error: self.subscription_error.clone(),
        }
    }
}

pub struct FeedEngine<S, E> {
    inner: Arc<FeedInner<S, E>>,
}

impl<S, E> Clone for FeedEngine<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct FeedInner<S, E> {
    store: S,
    events: E,
    auth: Arc<dyn AuthProvider>,
    config: FeedConfig,
    state: Mutex<FeedState>,
    changes: watch::Sender<u64>,
}

impl<S, E> FeedInner<S, E> {
    fn lock_state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}

impl<S, E> Drop for FeedInner<S, E> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.subscription.take() {
            handle.unsubscribe();
        }
    }
}

impl<S: MessageStore, E: EventSource> FeedEngine<S, E> {
    pub fn new(store: S, events: E, auth: Arc<dyn AuthProvider>, config: FeedConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(FeedInner {
                store,
                events,
                auth,
                config,
                state: Mutex::new(FeedState::new()),
                changes,
            }),
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.lock_state().snapshot()
    }

    /// Bumped after every visible state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Show `conversation_id`, replacing whatever was open.
    ///
    /// Subscribes to pushes and loads page 0 concurrently. Pushes are merged
    /// as soon as the subscription is up, including before page 0 lands.
    /// Returns once page 0 resolved; a failed load still leaves the feed
    /// `Ready` (history empty or partial) and returns the error.
    /// Returns [`ChatError::Superseded`] if another `open` or `close` won the race.
    pub async fn open(&self, conversation_id: ConversationId) -> Result<()> {
        if conversation_id.is_blank() {
            return Err(ChatError::Validation("conversation id is required".into()));
        }

        let generation = {
            let mut state = self.inner.lock_state();
            state.teardown();
            state.conversation_id = Some(conversation_id.clone());
            state.phase = FeedPhase::Loading;
            state.generation
        };
        self.inner.notify();
        info!("Opening conversation {} (generation {})", conversation_id, generation);

        let subscribe = async {
            let subscribed = self.inner.events.subscribe(&conversation_id).await;
            self.attach_subscription(generation, &conversation_id, subscribed)
        };
        let fetch = self
            .inner
            .store
            .fetch_page(&conversation_id, 0, self.inner.config.page_size);
        let (attached, page) = tokio::join!(subscribe, fetch);
        attached?;

        let outcome = {
            let mut state = self.inner.lock_state();
            if !state.is_current(generation) {
                debug!("Discarding stale first page of {}", conversation_id);
                return Err(ChatError::Superseded);
            }
            state.phase = FeedPhase::Ready;
            match page {
                Ok(page) => {
                    let added = state.sequence.merge_all(page.messages);
                    state.current_page = 0;
                    state.has_more = page.has_more;
                    debug!("Loaded page 0 of {}: {} new messages", conversation_id, added);
                    Ok(())
                }
                Err(e) => {
                    warn!("Initial load of {} failed: {}", conversation_id, e);
                    state.has_more = false;
                    Err(e)
                }
            }
        };
        self.inner.notify();
        outcome
    }

    fn attach_subscription(
        &self,
        generation: u64,
        conversation_id: &ConversationId,
        subscribed: std::result::Result<Subscription, SubscriptionError>,
    ) -> Result<()> {
        let mut state = self.inner.lock_state();
        if !state.is_current(generation) {
            // Dropping the subscription unsubscribes it.
            return Err(ChatError::Superseded);
        }

        match subscribed {
            Ok(subscription) => {
                state.subscription = Some(subscription.handle());
                tokio::spawn(pump_deliveries(
                    Arc::downgrade(&self.inner),
                    generation,
                    subscription,
                ));
            }
            Err(e) => {
                warn!(
                    "Realtime subscription for {} failed, history only: {}",
                    conversation_id, e
                );
                state.subscription_error = Some(e);
            }
        }
        Ok(())
    }

    /// Load the next older page. No-op unless the feed is `Ready` with more
    /// history. On failure the cursor, `has_more` and messages are unchanged.
    pub async fn load_more(&self) -> Result<()> {
        let (generation, conversation_id, next_page) = {
            let mut state = self.inner.lock_state();
            if state.phase != FeedPhase::Ready || !state.has_more {
                return Ok(());
            }
            let Some(conversation_id) = state.conversation_id.clone() else {
                return Ok(());
            };
            state.phase = FeedPhase::LoadingMore;
            (state.generation, conversation_id, state.current_page + 1)
        };
        self.inner.notify();

        let page = self
            .inner
            .store
            .fetch_page(&conversation_id, next_page, self.inner.config.page_size)
            .await;

        let outcome = {
            let mut state = self.inner.lock_state();
            if !state.is_current(generation) {
                debug!("Discarding stale page {} of {}", next_page, conversation_id);
                return Err(ChatError::Superseded);
            }
            state.phase = FeedPhase::Ready;
            match page {
                Ok(page) => {
                    let added = state.sequence.merge_all(page.messages);
                    state.current_page = next_page;
                    state.has_more = page.has_more;
                    debug!(
                        "Loaded page {} of {}: {} new messages",
                        next_page, conversation_id, added
                    );
                    Ok(())
                }
                Err(e) => {
                    warn!("Loading page {} of {} failed: {}", next_page, conversation_id, e);
                    Err(e)
                }
            }
        };
        self.inner.notify();
        outcome
    }

    /// Send `content` to the open conversation.
    ///
    /// The stored message is merged as soon as the insert returns; its push
    /// echo is then a duplicate and ignored. A second call while one is in
    /// flight fails with [`ChatError::SendInFlight`]. On any failure the
    /// visible messages are untouched.
    pub async fn send(&self, content: &str) -> Result<Message> {
        let content = validate_content(content)?;
        let sender_id = self.inner.auth.current_user_id().ok_or(ChatError::Auth)?;

        let (generation, conversation_id) = {
            let mut state = self.inner.lock_state();
            if !matches!(state.phase, FeedPhase::Ready | FeedPhase::LoadingMore) {
                return Err(ChatError::NotReady);
            }
            if state.sending {
                return Err(ChatError::SendInFlight);
            }
            let Some(conversation_id) = state.conversation_id.clone() else {
                return Err(ChatError::NotReady);
            };
            state.sending = true;
            (state.generation, conversation_id)
        };
        self.inner.notify();

        let inserted = self
            .inner
            .store
            .insert(&conversation_id, &sender_id, &content)
            .await;

        {
            let mut state = self.inner.lock_state();
            if !state.is_current(generation) {
                // Conversation changed meanwhile; the message is stored but not shown here.
                return inserted;
            }
            state.sending = false;
            match &inserted {
                Ok(message) => {
                    state.sequence.merge(message.clone());
                }
                Err(e) => warn!("Send to {} failed: {}", conversation_id, e),
            }
        }
        self.inner.notify();
        inserted
    }

    /// Tear down the open conversation: unsubscribe, forget messages, and
    /// invalidate anything still in flight.
    pub fn close(&self) {
        let closed = {
            let mut state = self.inner.lock_state();
            let closed = state.conversation_id.take();
            state.teardown();
            closed
        };
        if let Some(conversation_id) = closed {
            info!("Closed conversation {}", conversation_id);
        }
        self.inner.notify();
    }
}

/// Forward realtime deliveries into the feed until unsubscribed, the engine
/// is dropped, or the generation moves on.
async fn pump_deliveries<S, E>(
    inner: Weak<FeedInner<S, E>>,
    generation: u64,
    mut subscription: Subscription,
) {
    while let Some(delivery) = subscription.recv().await {
        let Some(engine) = inner.upgrade() else {
            break;
        };

        {
            let mut state = engine.lock_state();
            if !state.is_current(generation) {
                break;
            }
            match delivery {
                Delivery::Message(message) => {
                    if state.conversation_id.as_ref() != Some(&message.conversation_id) {
                        warn!(
                            "Ignoring push for {} on feed of {:?}",
                            message.conversation_id, state.conversation_id
                        );
                        continue;
                    }
                    if !state.sequence.merge(message) {
                        continue;
                    }
                }
                Delivery::Error(e) => {
                    warn!("Realtime error on {:?}: {}", state.conversation_id, e);
                    state.subscription_error = Some(e);
                }
            }
        }
        engine.notify();
    }
    debug!("Delivery pump for generation {} stopped", generation);
}
