use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::middleware::auth_extractor::OptionalAuthUser;
use homefinder_shared::types::auth::AuthUser;
use homefinder_shared::types::ApiResponse;

use crate::models::AiConversation;
use crate::services::assistant::ChatReply;
use crate::services::matching::{
    BuyerFilters, PotentialBuyersResult, RecommendationResult, SuggestionsResult,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub description: String,
}

/// POST /api/ai/chat - open to anonymous visitors; signed-in callers get
/// the exchange saved to their history.
pub async fn chat(
    OptionalAuthUser(auth_user): OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> AppResult<Json<ApiResponse<ChatReply>>> {
    if req.message.trim().is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "message must not be empty"));
    }

    let reply = state
        .assistant
        .chat(auth_user.map(|u| u.id), req.message.trim())
        .await?;
    Ok(Json(ApiResponse::ok(reply)))
}

/// GET /api/ai/questions - conversation starters for the chat widget.
pub async fn suggested_questions(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<&'static str>>> {
    Json(ApiResponse::ok(state.assistant.suggested_questions()))
}

/// POST /api/ai/analyze - free text in, structured search criteria out.
pub async fn analyze_needs(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    if req.description.trim().is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "description must not be empty"));
    }

    let criteria = state
        .assistant
        .analyze_needs(auth_user.id, req.description.trim())
        .await?;
    Ok(Json(ApiResponse::ok(criteria)))
}

/// GET /api/ai/history
pub async fn history(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<AiConversation>>>> {
    let rows = state.assistant.history(auth_user.id)?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// GET /api/ai/recommendations - scored listings for the caller, explicit
/// query filters overriding inferred preferences.
pub async fn recommendations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(filters): Query<BuyerFilters>,
) -> AppResult<Json<ApiResponse<RecommendationResult>>> {
    let result = state.matching.recommend_for_buyer(auth_user.id, &filters)?;
    Ok(Json(ApiResponse::ok(result)))
}

/// GET /api/ai/potential-buyers/:property_id - owner only.
pub async fn potential_buyers(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PotentialBuyersResult>>> {
    let result = state.matching.find_potential_buyers(auth_user.id, property_id)?;
    Ok(Json(ApiResponse::ok(result)))
}

/// GET /api/ai/suggestions - activity-driven discovery feed.
pub async fn suggestions(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<SuggestionsResult>>> {
    let result = state.matching.smart_suggestions(auth_user.id)?;
    Ok(Json(ApiResponse::ok(result)))
}
