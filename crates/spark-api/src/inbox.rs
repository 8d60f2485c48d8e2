use std::sync::Arc;

use axum::{Extension, Json, extract::State};

use spark_chat::inbox::{Inbox, unread_count};
use spark_chat::store::FixedUser;
use spark_types::api::{Claims, UnreadResponse};
use spark_types::models::ChatSummary;

use crate::error::ApiError;
use crate::state::AppState;

async fn summaries(state: &AppState, claims: Claims) -> Result<Vec<ChatSummary>, ApiError> {
    let inbox = Inbox::new(
        state.backend.clone(),
        state.backend.clone(),
        Arc::new(FixedUser::new(claims.sub)),
    );
    Ok(inbox.refresh().await?)
}

pub async fn get_inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    Ok(Json(summaries(&state, claims).await?))
}

pub async fn get_unread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadResponse>, ApiError> {
    let summaries = summaries(&state, claims).await?;
    Ok(Json(UnreadResponse {
        unread: unread_count(&summaries),
    }))
}
