//! Match promotion when another writer wins the race.

use std::sync::Arc;

use async_trait::async_trait;
use spark_chat::backend::LocalBackend;
use spark_chat::matching::MatchEngine;
use spark_chat::store::MatchStore;
use spark_chat::{ChatError, Result, StoreError};
use spark_db::Database;
use spark_gateway::dispatcher::Dispatcher;
use spark_types::models::{Like, LikeId, Match, UserId, UserPair};

/// Creates the match through the real store, then reports the insert as a
/// duplicate, as if a concurrent promotion had committed first.
struct LosesRace {
    inner: LocalBackend,
    fail_lookups: bool,
}

#[async_trait]
impl MatchStore for LosesRace {
    async fn insert_like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<Like> {
        self.inner.insert_like(liker_id, liked_id).await
    }

    async fn find_like(&self, liker_id: &UserId, liked_id: &UserId) -> Result<Option<Like>> {
        self.inner.find_like(liker_id, liked_id).await
    }

    async fn delete_like(&self, like_id: &LikeId) -> Result<bool> {
        self.inner.delete_like(like_id).await
    }

    async fn incoming_likes(&self, user_id: &UserId) -> Result<Vec<Like>> {
        self.inner.incoming_likes(user_id).await
    }

    async fn find_match(&self, pair: &UserPair) -> Result<Option<Match>> {
        if self.fail_lookups {
            return Ok(None);
        }
        self.inner.find_match(pair).await
    }

    async fn insert_match(&self, pair: &UserPair) -> Result<Match> {
        self.inner.insert_match(pair).await?;
        Err(StoreError::Duplicate("match".into()).into())
    }

    async fn matches_for(&self, user_id: &UserId) -> Result<Vec<Match>> {
        self.inner.matches_for(user_id).await
    }
}

fn store(fail_lookups: bool) -> LosesRace {
    LosesRace {
        inner: LocalBackend::new(
            Arc::new(Database::open_in_memory().unwrap()),
            Dispatcher::new(),
        ),
        fail_lookups,
    }
}

#[tokio::test]
async fn lost_promotion_race_reports_existing_match() {
    let store = store(false);
    let db = store.inner.database().clone();
    let engine = MatchEngine::new(store);
    let (alice, bob) = (UserId::from("alice"), UserId::from("bob"));

    engine.like(&alice, &bob).await.unwrap();
    let outcome = engine.like(&bob, &alice).await.unwrap();

    assert!(outcome.matched);
    assert!(outcome.already_existed);
    assert!(outcome.conversation.is_some());
    assert_eq!(db.count_matches().unwrap(), 1);
}

#[tokio::test]
async fn duplicate_without_a_visible_match_is_an_error() {
    let engine = MatchEngine::new(store(true));
    let (alice, bob) = (UserId::from("alice"), UserId::from("bob"));

    engine.like(&alice, &bob).await.unwrap();
    let result = engine.like(&bob, &alice).await;

    assert!(matches!(
        result,
        Err(ChatError::Store(StoreError::NotFound(_)))
    ));
}
