//! Like edges and the mutual-like → match transition.
//!
//! The engine keeps no state of its own. Uniqueness of like edges and of
//! matches is enforced by the store; a duplicate-key failure from the store
//! means another writer got there first and is reported as success. This
//! holds across any number of engine instances and processes.

use tracing::{debug, info};

use spark_types::models::{Like, LikeId, LikeOutcome, Match, UserId, UserPair};

use crate::error::{ChatError, Result, StoreError};
use crate::store::MatchStore;

pub struct MatchEngine<S> {
    store: S,
}

impl<S: MatchStore> MatchEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record that `liker_id` likes `liked_id`, promoting the pair to a match
    /// when the like is mutual. Idempotent.
    pub async fn like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<LikeOutcome> {
        if liker_id.is_blank() || liked_id.is_blank() {
            return Err(ChatError::Validation("user ids are required".into()));
        }
        let pair = UserPair::new(liker_id, liked_id)
            .ok_or_else(|| ChatError::Validation("cannot like yourself".into()))?;

        match self.store.insert_like(liker_id, liked_id).await {
            Ok(like) => debug!("{} liked {} ({})", liker_id, liked_id, like.id),
            Err(e) if e.is_duplicate() => debug!("{} already likes {}", liker_id, liked_id),
            Err(e) => return Err(e),
        }

        if self.store.find_like(liked_id, liker_id).await?.is_none() {
            return Ok(LikeOutcome::not_matched());
        }

        if let Some(existing) = self.store.find_match(&pair).await? {
            return Ok(LikeOutcome::matched(existing, true));
        }

        match self.store.insert_match(&pair).await {
            Ok(created) => {
                info!(
                    "New match {} between {} and {}",
                    created.id,
                    pair.user_a(),
                    pair.user_b()
                );
                Ok(LikeOutcome::matched(created, false))
            }
            Err(e) if e.is_duplicate() => {
                // Lost the race against the other side's promotion.
                let existing = self.store.find_match(&pair).await?.ok_or_else(|| {
                    ChatError::Store(StoreError::NotFound(format!(
                        "match {} / {} reported duplicate but is missing",
                        pair.user_a(),
                        pair.user_b()
                    )))
                })?;
                debug!("Match {} was created concurrently", existing.id);
                Ok(LikeOutcome::matched(existing, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Reject an incoming like by deleting its edge. Deleting an edge that is
    /// already gone is not an error.
    pub async fn pass(&self, like_id: &LikeId) -> Result<()> {
        if like_id.is_blank() {
            return Err(ChatError::Validation("like id is required".into()));
        }
        if !self.store.delete_like(like_id).await? {
            debug!("Like {} was already gone", like_id);
        }
        Ok(())
    }

    /// Pending likes for `user_id`: received, not yet matched.
    pub async fn incoming_likes(&self, user_id: &UserId) -> Result<Vec<Like>> {
        if user_id.is_blank() {
            return Err(ChatError::Validation("user id is required".into()));
        }
        self.store.incoming_likes(user_id).await
    }

    pub async fn matches_for(&self, user_id: &UserId) -> Result<Vec<Match>> {
        if user_id.is_blank() {
            return Err(ChatError::Validation("user id is required".into()));
        }
        self.store.matches_for(user_id).await
    }
}
