use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::{AppState, error::AppError, routes::user::model::User, utils::Claims, utils::verify_token};

/// Decodes the bearer token and stores its `Claims` on the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_token(bearer.token(), &state.config).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::Unauthorized
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Operator-only routes. Both the token's `is_staff` claim and the stored
/// account must allow access: revoked rights apply on the next request,
/// newly granted ones once the operator obtains a fresh token.
pub async fn staff_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or(AppError::Unauthorized)?;

    if !claims.is_staff {
        return Err(AppError::Forbidden);
    }

    let user = User::find_by_id(&state.pool, claims.user_id()?)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !(user.is_active && user.is_staff) {
        tracing::warn!("Staff route denied for user {}", user.id);
        return Err(AppError::Forbidden);
    }

    Ok(next.run(req).await)
}
