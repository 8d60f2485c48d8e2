use std::collections::HashSet;

use spark_types::models::{Message, MessageId};

/// Ordered, deduplicated message list for one conversation.
///
/// Every origin of a message (history page, push, own send) goes through
/// [`MessageSequence::merge`]. Order is ascending `created_at`; messages with
/// equal timestamps keep the order in which they were merged.
#[derive(Debug, Default, Clone)]
pub struct MessageSequence {
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
}

impl MessageSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `message` unless its id was seen before. Returns whether it was added.
    pub fn merge(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(pos, message);
        true
    }

    /// Merge a batch; returns how many were new.
    pub fn merge_all(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        messages
            .into_iter()
            .map(|m| self.merge(m))
            .filter(|added| *added)
            .count()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen.clear();
    }
}
