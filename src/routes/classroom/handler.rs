use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    ledger::UserClassroomStats,
    utils::{ApiJson, Claims, HandlerResult, created, ok},
};

use super::model::{Classroom, ClassroomDetail, ClassroomRequest, ClassroomSummary, Member};

#[axum::debug_handler]
pub async fn list_classrooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<Vec<ClassroomSummary>> {
    let classrooms = Classroom::list_for_owner(&state.pool, claims.user_id()?).await?;
    ok(classrooms.into_iter().map(ClassroomSummary::from).collect())
}

#[axum::debug_handler]
pub async fn create_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ClassroomRequest>,
) -> HandlerResult<ClassroomDetail> {
    let fields = req.validate(false)?;
    let classroom = Classroom::create(&state.pool, claims.user_id()?, fields).await?;
    created(ClassroomDetail::from(classroom))
}

#[axum::debug_handler]
pub async fn get_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<Uuid>,
) -> HandlerResult<ClassroomDetail> {
    let classroom = Classroom::find_owned(&state.pool, class_id, claims.user_id()?)
        .await?
        .ok_or(AppError::NotFound)?;
    ok(ClassroomDetail::from(classroom))
}

#[axum::debug_handler]
pub async fn replace_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<Uuid>,
    ApiJson(req): ApiJson<ClassroomRequest>,
) -> HandlerResult<ClassroomDetail> {
    let fields = req.validate(false)?;
    let classroom = Classroom::update_owned(&state.pool, class_id, claims.user_id()?, fields).await?;
    ok(ClassroomDetail::from(classroom))
}

#[axum::debug_handler]
pub async fn update_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<Uuid>,
    ApiJson(req): ApiJson<ClassroomRequest>,
) -> HandlerResult<ClassroomDetail> {
    let fields = req.validate(true)?;
    let classroom = Classroom::update_owned(&state.pool, class_id, claims.user_id()?, fields).await?;
    ok(ClassroomDetail::from(classroom))
}

#[axum::debug_handler]
pub async fn delete_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    Classroom::delete_owned(&state.pool, class_id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn join_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    Classroom::join(&state.pool, class_id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn leave_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    Classroom::leave(&state.pool, class_id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Membership lists are readable by any signed-in user.
#[axum::debug_handler]
pub async fn list_members(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
) -> HandlerResult<Vec<Member>> {
    if Classroom::find(&state.pool, class_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    ok(Classroom::members(&state.pool, class_id).await?)
}

/// The caller's own score and balance in one classroom.
#[axum::debug_handler]
pub async fn my_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<Uuid>,
) -> HandlerResult<UserClassroomStats> {
    let stats = UserClassroomStats::find(&state.pool, claims.user_id()?, class_id)
        .await?
        .ok_or(AppError::NotFound)?;
    ok(stats)
}
