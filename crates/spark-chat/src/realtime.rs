//! Push delivery of newly inserted messages.
//!
//! A [`Subscription`] is the consumer end: it yields [`Delivery`] values
//! until it is unsubscribed. Sources feed it through the paired
//! [`DeliverySender`] and stop producing once [`DeliverySender::closed`]
//! resolves. Delivery is at-least-once; consumers dedup by message id.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use spark_types::models::{ConversationId, Message};

use crate::error::SubscriptionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message(Message),
    /// Transport trouble. The subscription stays usable unless the source
    /// also closes it; nothing is retried automatically.
    Error(SubscriptionError),
}

/// Server-side filtered push stream of inserts.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Inserts into one conversation, in emission order.
    async fn subscribe(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription, SubscriptionError>;

    /// Every insert, unfiltered.
    async fn subscribe_all(&self) -> Result<Subscription, SubscriptionError>;
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for std::sync::Arc<T> {
    async fn subscribe(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription, SubscriptionError> {
        (**self).subscribe(conversation_id).await
    }

    async fn subscribe_all(&self) -> Result<Subscription, SubscriptionError> {
        (**self).subscribe_all().await
    }
}

/// Create a connected sender/subscription pair.
pub fn subscription_channel() -> (DeliverySender, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    (
        DeliverySender {
            tx,
            token: token.clone(),
        },
        Subscription {
            deliveries: rx,
            handle: SubscriptionHandle { token },
        },
    )
}

/// Cloneable remote control for a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    token: CancellationToken,
}

impl SubscriptionHandle {
    /// Stop delivery and let the source release its resources. Idempotent.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

pub struct Subscription {
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Next delivery, or `None` once unsubscribed or the source is gone.
    /// Anything still buffered at unsubscribe time is dropped.
    pub async fn recv(&mut self) -> Option<Delivery> {
        if self.handle.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.handle.token.cancelled() => None,
            delivery = self.deliveries.recv() => delivery,
        }
    }

    pub fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

/// Producer end of a subscription.
#[derive(Debug, Clone)]
pub struct DeliverySender {
    tx: mpsc::UnboundedSender<Delivery>,
    token: CancellationToken,
}

impl DeliverySender {
    /// Queue a message. Returns `false` once the subscriber is gone.
    pub fn message(&self, message: Message) -> bool {
        self.deliver(Delivery::Message(message))
    }

    /// Queue a transport error. Returns `false` once the subscriber is gone.
    pub fn error(&self, error: SubscriptionError) -> bool {
        self.deliver(Delivery::Error(error))
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.tx.is_closed()
    }

    /// Resolves when the subscriber unsubscribes or drops its end.
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }

    fn deliver(&self, delivery: Delivery) -> bool {
        self.is_active() && self.tx.send(delivery).is_ok()
    }
}
