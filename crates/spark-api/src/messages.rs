use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::warn;

use spark_chat::store::MessageStore;
use spark_gateway::connection::ConversationAccess;
use spark_types::api::{Claims, PageQuery, SendMessageRequest};
use spark_types::models::{ConversationId, Message, MessagePage};

use crate::error::ApiError;
use crate::state::AppState;

/// One page of a conversation, oldest first. Only participants may read it.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    if !state.backend.is_member(&claims.sub, &conversation_id).await {
        warn!("{} tried to read {}", claims.sub, conversation_id);
        return Err(ApiError::not_found("conversation"));
    }

    let page_size = state.page_size(query.page_size);
    let page = state
        .backend
        .fetch_page(&conversation_id, query.page, page_size)
        .await?;
    Ok(Json(page))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .backend
        .insert(&conversation_id, &claims.sub, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
