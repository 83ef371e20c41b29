use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult, middleware::RequestId, models::RecommendationResponse, state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<usize>,
}

/// Handler for the per-user recommendations endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<RecommendationQuery>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<RecommendationResponse>> {
    tracing::debug!(
        request_id = %request_id,
        user_id,
        limit = ?query.limit,
        "Recommendations requested"
    );

    let response = state.recommendations.recommend(user_id, query.limit).await?;
    Ok(Json(response))
}
