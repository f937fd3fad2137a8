use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    error::AppError,
    routes::question::model::Question,
    utils::{ApiJson, Claims, HandlerResult, created, ok},
};

use super::model::{Answer, AnswerRequest};

#[axum::debug_handler]
pub async fn create_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
    ApiJson(req): ApiJson<AnswerRequest>,
) -> HandlerResult<Answer> {
    let content = req.validate()?;
    let answer = Answer::create(&state.pool, question_id, claims.user_id()?, content).await?;
    created(answer)
}

#[axum::debug_handler]
pub async fn question_answers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
) -> HandlerResult<Vec<Answer>> {
    let question = Question::find_visible(&state.pool, question_id, claims.user_id()?).await?;
    ok(Answer::list_for_question(&state.pool, question.id).await?)
}

#[axum::debug_handler]
pub async fn list_answers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<Vec<Answer>> {
    ok(Answer::list_for_user(&state.pool, claims.user_id()?).await?)
}

#[axum::debug_handler]
pub async fn get_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> HandlerResult<Answer> {
    let answer = Answer::find_owned(&state.pool, id, claims.user_id()?)
        .await?
        .ok_or(AppError::NotFound)?;
    ok(answer)
}

#[axum::debug_handler]
pub async fn update_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<AnswerRequest>,
) -> HandlerResult<Answer> {
    let content = req.validate()?;
    ok(Answer::update_owned(&state.pool, id, claims.user_id()?, content).await?)
}

#[axum::debug_handler]
pub async fn delete_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    Answer::delete_owned(&state.pool, id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}
