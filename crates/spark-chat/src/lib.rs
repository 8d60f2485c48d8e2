//! Realtime chat delivery and match formation.
//!
//! - [`feed::FeedEngine`] keeps one conversation's messages ordered and
//!   deduplicated across paginated history and live pushes.
//! - [`matching::MatchEngine`] records likes and promotes mutual likes to a
//!   match, at most once per pair.
//! - [`inbox`] derives the per-conversation summary list and unread flags.
//!
//! The engines talk to their collaborators through the traits in [`store`]
//! and [`realtime`]; [`backend::LocalBackend`] implements them on top of
//! SQLite and the in-process dispatcher.

pub mod backend;
pub mod error;
pub mod feed;
pub mod inbox;
pub mod matching;
pub mod realtime;
pub mod sequence;
pub mod store;

pub use error::{ChatError, Result, StoreError, SubscriptionError};
