use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    routes::classroom::model::Classroom,
    utils::{ApiJson, Claims, HandlerResult, created, ok},
};

use super::model::{CreateQuestionRequest, Question, QuestionView, UpdateQuestionRequest};

fn views(questions: Vec<Question>, viewer_id: i64) -> Vec<QuestionView> {
    questions
        .into_iter()
        .map(|q| QuestionView::for_viewer(q, viewer_id))
        .collect()
}

#[axum::debug_handler]
pub async fn create_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateQuestionRequest>,
) -> HandlerResult<QuestionView> {
    let new = req.validate()?;
    let user_id = claims.user_id()?;
    let question = Question::create(&state.pool, user_id, new).await?;
    created(QuestionView::for_viewer(question, user_id))
}

#[axum::debug_handler]
pub async fn list_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<Vec<QuestionView>> {
    let user_id = claims.user_id()?;
    let questions = Question::list_for_user(&state.pool, user_id).await?;
    ok(views(questions, user_id))
}

#[axum::debug_handler]
pub async fn get_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> HandlerResult<QuestionView> {
    let user_id = claims.user_id()?;
    let question = Question::find_owned(&state.pool, id, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    ok(QuestionView::for_viewer(question, user_id))
}

#[axum::debug_handler]
pub async fn update_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdateQuestionRequest>,
) -> HandlerResult<QuestionView> {
    let changes = req.validate()?;
    let user_id = claims.user_id()?;
    let question = Question::update_owned(&state.pool, id, user_id, changes).await?;
    ok(QuestionView::for_viewer(question, user_id))
}

#[axum::debug_handler]
pub async fn delete_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    Question::delete_owned(&state.pool, id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Classroom feed for the owner and enrolled members.
#[axum::debug_handler]
pub async fn classroom_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<Uuid>,
) -> HandlerResult<Vec<QuestionView>> {
    let user_id = claims.user_id()?;
    if !Classroom::is_participant(&state.pool, class_id, user_id).await? {
        return Err(AppError::NotFound);
    }
    let questions = Question::list_for_classroom(&state.pool, class_id).await?;
    ok(views(questions, user_id))
}

#[axum::debug_handler]
pub async fn counter_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> HandlerResult<Vec<QuestionView>> {
    let user_id = claims.user_id()?;
    let original = Question::find_visible(&state.pool, id, user_id).await?;
    let questions = Question::counter_questions(&state.pool, original.id).await?;
    ok(views(questions, user_id))
}
