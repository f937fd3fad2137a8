use axum::extract::{Extension, Path, State};

use crate::{
    AppState,
    error::AppError,
    utils::{ApiJson, Claims, HandlerResult, created, ok},
};

use super::model::{CreateReportRequest, Report};

#[axum::debug_handler]
pub async fn create_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateReportRequest>,
) -> HandlerResult<Report> {
    let target = req.validate()?;
    created(Report::create(&state.pool, claims.user_id()?, target).await?)
}

#[axum::debug_handler]
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<Vec<Report>> {
    ok(Report::list_for_reporter(&state.pool, claims.user_id()?).await?)
}

#[axum::debug_handler]
pub async fn get_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> HandlerResult<Report> {
    let report = Report::find_owned(&state.pool, id, claims.user_id()?)
        .await?
        .ok_or(AppError::NotFound)?;
    ok(report)
}
