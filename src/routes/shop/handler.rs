use axum::extract::{Extension, State};

use crate::{
    AppState,
    utils::{ApiJson, Claims, HandlerResult, created, ok},
};

use super::model::{PurchaseRequest, Receipt, RewardShopItem, Transaction};

#[axum::debug_handler]
pub async fn list_items(State(state): State<AppState>) -> HandlerResult<Vec<RewardShopItem>> {
    ok(RewardShopItem::list(&state.pool).await?)
}

#[axum::debug_handler]
pub async fn purchase(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<PurchaseRequest>,
) -> HandlerResult<Receipt> {
    created(Transaction::purchase(&state.pool, claims.user_id()?, req.item_id).await?)
}

#[axum::debug_handler]
pub async fn my_transactions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<Vec<Transaction>> {
    ok(Transaction::list_for_user(&state.pool, claims.user_id()?).await?)
}
