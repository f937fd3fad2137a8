use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    error::AppError,
    utils::{ApiJson, Claims, HandlerResult, created},
};

use super::model::{Vote, VoteRequest, VoteTarget};

#[axum::debug_handler]
pub async fn vote_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> HandlerResult<Vote> {
    let vote_type = req.validate()?;
    created(Vote::cast(&state.pool, VoteTarget::Question, id, claims.user_id()?, vote_type).await?)
}

#[axum::debug_handler]
pub async fn unvote_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    Vote::retract(&state.pool, VoteTarget::Question, id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn vote_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> HandlerResult<Vote> {
    let vote_type = req.validate()?;
    created(Vote::cast(&state.pool, VoteTarget::Answer, id, claims.user_id()?, vote_type).await?)
}

#[axum::debug_handler]
pub async fn unvote_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    Vote::retract(&state.pool, VoteTarget::Answer, id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}
