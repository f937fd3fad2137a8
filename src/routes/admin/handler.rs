use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    AppState,
    error::{AppError, ValidationErrors},
    routes::{
        classroom::model::{Classroom, ClassroomDetail},
        question::model::{Question, QuestionView},
        report::model::{Report, ReportEntry, ReportStatus, ReviewReportRequest},
        shop::model::{RewardShopItem, ShopItemRequest},
        user::model::{AdminUserChanges, User},
    },
    utils::{ApiJson, HandlerResult, created, ok},
};

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

impl SearchQuery {
    fn term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub status: Option<String>,
}

#[axum::debug_handler]
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> HandlerResult<Vec<User>> {
    ok(User::search(&state.pool, query.term()).await?)
}

#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(changes): ApiJson<AdminUserChanges>,
) -> HandlerResult<User> {
    let mut errors = ValidationErrors::new();
    for (field, value) in [("q_score", changes.q_score), ("q_coins", changes.q_coins)] {
        if value.is_some_and(|v| v < 0) {
            errors.add(field, "Ensure this value is greater than or equal to 0.");
        }
    }
    let changes = errors.finish(changes)?;

    ok(User::admin_update(&state.pool, id, changes).await?)
}

#[axum::debug_handler]
pub async fn search_classrooms(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> HandlerResult<Vec<ClassroomDetail>> {
    let classes = Classroom::search(&state.pool, query.term()).await?;
    ok(classes.into_iter().map(ClassroomDetail::from).collect())
}

#[axum::debug_handler]
pub async fn search_questions(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> HandlerResult<Vec<QuestionView>> {
    let questions = Question::search(&state.pool, query.term()).await?;
    ok(questions.into_iter().map(QuestionView::unmasked).collect())
}

#[axum::debug_handler]
pub async fn list_reports(
    State(state): State<AppState>,
    Query(filter): Query<ReportFilter>,
) -> HandlerResult<Vec<ReportEntry>> {
    let status = filter
        .status
        .as_deref()
        .map(str::parse::<ReportStatus>)
        .transpose()
        .map_err(|e| AppError::field("status", e.to_string()))?;
    ok(Report::list_all(&state.pool, status).await?)
}

#[axum::debug_handler]
pub async fn review_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ReviewReportRequest>,
) -> HandlerResult<Report> {
    let review = req.validate()?;
    ok(Report::review(&state.pool, id, review).await?)
}

#[axum::debug_handler]
pub async fn create_shop_item(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ShopItemRequest>,
) -> HandlerResult<RewardShopItem> {
    let fields = req.validate(false)?;
    created(RewardShopItem::create(&state.pool, fields).await?)
}

#[axum::debug_handler]
pub async fn update_shop_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ShopItemRequest>,
) -> HandlerResult<RewardShopItem> {
    let fields = req.validate(true)?;
    ok(RewardShopItem::update(&state.pool, id, fields).await?)
}

#[axum::debug_handler]
pub async fn delete_shop_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    RewardShopItem::delete(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
