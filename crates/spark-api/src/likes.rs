use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use spark_types::api::{Claims, LikeRequest};
use spark_types::models::{Like, LikeId, LikeOutcome, Match};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<LikeRequest>,
) -> Result<Json<LikeOutcome>, ApiError> {
    let outcome = state.matches.like(&claims.sub, &req.liked_id).await?;
    Ok(Json(outcome))
}

/// Reject a like received by the caller. Likes sent by the caller, or
/// already turned into a match, are not theirs to pass on.
pub async fn pass(
    State(state): State<AppState>,
    Path(like_id): Path<LikeId>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let incoming = state.matches.incoming_likes(&claims.sub).await?;
    if !incoming.iter().any(|like| like.id == like_id) {
        return Err(ApiError::not_found("like"));
    }

    state.matches.pass(&like_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn incoming(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Like>>, ApiError> {
    Ok(Json(state.matches.incoming_likes(&claims.sub).await?))
}

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Match>>, ApiError> {
    Ok(Json(state.matches.matches_for(&claims.sub).await?))
}
