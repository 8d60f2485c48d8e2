//! HTTP surface over the chat and match engines.

pub mod error;
pub mod inbox;
pub mod likes;
pub mod messages;
pub mod middleware;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

pub use state::{AppState, AppStateInner};

/// Authenticated REST routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/matches", get(likes::list_matches))
        .route("/matches/{conversation_id}/messages", get(messages::get_messages))
        .route("/matches/{conversation_id}/messages", post(messages::send_message))
        .route("/likes", post(likes::like))
        .route("/likes/incoming", get(likes::incoming))
        .route("/likes/{like_id}", delete(likes::pass))
        .route("/inbox", get(inbox::get_inbox))
        .route("/inbox/unread", get(inbox::get_unread))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}
